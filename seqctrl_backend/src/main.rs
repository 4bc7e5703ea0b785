use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use seqcompiler_backend::*;
use seqctrl_backend::*;

/// Compiles a demonstration sequence for the channels of a setup and runs it.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Settings file with the clock, synthesizer link and channel tables
    settings: PathBuf,

    /// Inspect the compiled buffers instead of driving hardware
    #[arg(long)]
    simulate: bool,

    /// NI device whose four 8-line ports carry the output word
    #[arg(long, default_value = "Dev1")]
    device: String,

    /// Number of steps in the demonstration sequence
    #[arg(long, default_value_t = 10)]
    steps: usize,
}

/// Ramps the first analog channel, toggles the first digital line and steps the first
/// synthesizer channel, one update per millisecond.
fn demo_sequence(seq: &mut Sequencer, steps: usize) -> Result<()> {
    let first = |kind: ChannelKind| {
        seq.channels()
            .of_kind(kind)
            .next()
            .map(|ch| ch.name().to_string())
    };
    let analog = first(ChannelKind::Analog);
    let digital = first(ChannelKind::Digital);
    let synth = first(ChannelKind::Synth);

    for i in 0..steps {
        let fraction = i as f64 / steps.max(1) as f64;
        let mut update = Update::new(1e-3);
        if let Some(name) = &analog {
            update = update.analog(name, -5. + 10. * fraction);
        }
        if let Some(name) = &digital {
            update = update.digital(name, i % 2 == 0);
        }
        if let Some(name) = &synth {
            update = update.synth(name, 80. + fraction);
        }
        seq.apply(&update).with_context(|| format!("demo update {i}"))?;
    }
    Ok(())
}

#[cfg(feature = "nidaqmx")]
fn hardware_backend(settings: &Settings, args: &Args) -> Result<Box<dyn ExecutionBackend>> {
    let output = NiOutput::new(&args.device);
    output.reset()?;
    let sink: HardwareSink<NiOutput, TtyLink> = match settings.novatech_serial() {
        Some(serial) => {
            let serial = serial.to_string();
            HardwareSink::with_synth(output, move || TtyLink::open(&serial))
        }
        None => HardwareSink::new(output),
    };
    Ok(Box::new(sink))
}

#[cfg(not(feature = "nidaqmx"))]
fn hardware_backend(_settings: &Settings, args: &Args) -> Result<Box<dyn ExecutionBackend>> {
    bail!(
        "built without the nidaqmx feature, cannot drive {}; use --simulate",
        args.device
    )
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = Settings::from_file(&args.settings)?;
    let channels = Arc::new(settings.channel_map()?);
    if channels.is_empty() {
        bail!("{} defines no channels", args.settings.display());
    }

    let mut timer = TickTimer::new();
    let mut seq = Sequencer::new(channels, settings.sequencer_config())?;
    demo_sequence(&mut seq, args.steps)?;
    let program = seq.finish();
    timer.tick_log("Compilation");

    let mut backend: Box<dyn ExecutionBackend> = if args.simulate {
        Box::new(SimulationSink::new())
    } else {
        hardware_backend(&settings, &args)?
    };
    backend.execute(program)?;
    println!("Done");
    Ok(())
}
