use assert_approx_eq::assert_approx_eq;
use std::sync::Arc;

use seqcompiler_backend::*;
use seqctrl_backend::*;

const SETUP: &str = r#"
[novatech]
serial = "scripted"

[ao_ch]
coil_sum = 0

[do_ch]
shutter = 5

[dds_ch]
cooling_freq = 0
repump_freq = 1
"#;

fn compile() -> CompiledProgram {
    let settings = Settings::from_toml_str(SETUP).unwrap();
    let mut seq = Sequencer::new(
        Arc::new(settings.channel_map().unwrap()),
        settings.sequencer_config(),
    )
    .unwrap();
    let updates = [
        Update::new(5e-3)
            .analog("coil_sum", 1.)
            .digital("shutter", true)
            .synth("cooling_freq", 80.)
            .synth("repump_freq", 100.),
        Update::new(2e-3).synth("cooling_freq", 82.),
        Update::new(2e-3).analog("coil_sum", -1.),
        Update::new(1e-3)
            .digital("shutter", false)
            .synth("repump_freq", 101.),
    ];
    for update in updates.iter() {
        seq.apply(update).unwrap();
    }
    seq.finish()
}

/// Captures what the clocked output was asked to play.
#[derive(Default)]
struct CapturingOutput {
    samples: Vec<Word>,
    clock_rate: f64,
    timeout: f64,
}

impl ClockedOutput for CapturingOutput {
    fn play(&mut self, samples: &[Word], clock_rate: f64, timeout: f64) -> Result<(), BackendError> {
        self.samples = samples.to_vec();
        self.clock_rate = clock_rate;
        self.timeout = timeout;
        Ok(())
    }
}

fn rising_edges(samples: &[Word], flag: Word) -> usize {
    let mut previous = false;
    let mut edges = 0;
    for &word in samples {
        let high = word & flag != 0;
        if high && !previous {
            edges += 1;
        }
        previous = high;
    }
    edges
}

#[test]
fn simulation_sees_filled_buffers() {
    let mut sim = SimulationSink::new();
    sim.execute(compile()).unwrap();
    let waveform = sim.waveform().unwrap();
    assert_eq!(waveform.len(), 10100);
    let table = sim.synth_table().unwrap();
    assert_eq!(table.shape(), &[3, 4]);
    assert_eq!(table.row(2).to_vec(), vec![82., 101., 0., 0.]);
}

#[test]
fn one_trigger_edge_per_table_row() {
    let program = compile();
    let rows = program.row_count();
    let transcript = Transcript::default();
    let link_transcript = transcript.clone();
    let mut sink = HardwareSink::with_synth(CapturingOutput::default(), move || {
        Ok(ScriptedLink::with_transcript(
            |_| Some("OK".to_string()),
            link_transcript.clone(),
        ))
    });
    sink.execute(program).unwrap();

    let output = sink.output();
    assert_eq!(output.samples.len(), 10100);
    assert_eq!(output.clock_rate, 1e6);
    assert_approx_eq!(output.timeout, 1.1);
    assert_eq!(rising_edges(&output.samples, SYNTH_TRIGGER), rows);
    assert_eq!(rising_edges(&output.samples, EPOCH_TRIGGER), 4);

    // Every row on all four channels plus the terminal copy
    let lines = transcript.borrow();
    let entries: Vec<&String> = lines.iter().filter(|l| l.starts_with('t')).collect();
    assert_eq!(entries.len(), 4 * (rows + 1));
    assert_eq!(entries[4].as_str(), "t0 0001 30e03500,0000,03ff,ff");
    assert!(entries.iter().rev().take(4).all(|l| l.ends_with(",00")));
    assert_eq!(lines.last().map(String::as_str), Some("<closed>"));
}

#[test]
fn rejected_reply_stops_before_playback() {
    let mut sink = HardwareSink::with_synth(CapturingOutput::default(), || {
        Ok(ScriptedLink::new(|cmd| {
            Some(if cmd == "I a" { "?0" } else { "OK" }.to_string())
        }))
    });
    let err = sink.execute(compile()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Synthesizer programming failed: Erroneous reply from device: ?0, Unrecognized Command"
    );
    assert!(sink.output().samples.is_empty());
}

#[test]
fn unreachable_synthesizer_is_reported() {
    let mut sink: HardwareSink<CapturingOutput, ScriptedLink> =
        HardwareSink::with_synth(CapturingOutput::default(), || {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such device",
            ))
        });
    assert!(matches!(
        sink.execute(compile()),
        Err(BackendError::Synth(NovatechError::Io(_)))
    ));
    assert!(sink.output().samples.is_empty());
}
