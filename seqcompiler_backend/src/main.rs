use std::sync::Arc;

use seqcompiler_backend::*;

fn main() -> Result<(), CompileError> {
    env_logger::init();

    let mut channels = ChannelMap::new();
    channels.add_analog("mot_cooling", 0)?;
    channels.add_analog("coil_sum", 9)?;
    channels.add_digital("mot_cooling_shutter", 0)?;
    channels.add_digital("slower_coil", 17)?;
    channels.add_synth("cooling_freq", 0)?;
    channels.add_synth("repump_freq", 1)?;

    let mut seq = Sequencer::new(Arc::new(channels), SequencerConfig::with_clock_rate(1e6))?;
    seq.update(
        2.,
        &[("mot_cooling", 5.), ("coil_sum", 2.5)],
        &[("mot_cooling_shutter", true), ("slower_coil", true)],
        &[("cooling_freq", 80.), ("repump_freq", 120.)],
    )?;
    seq.update(1e-3, &[], &[("slower_coil", false)], &[])?;
    seq.update(20e-3, &[("mot_cooling", 1.)], &[("mot_cooling_shutter", true)], &[("cooling_freq", 78.)])?;

    let program = seq.finish();
    println!(
        "{} samples at {} Hz ({} s), {} synthesizer rows:\n{:?}",
        program.sample_count(),
        program.clock_rate(),
        program.runtime(),
        program.row_count(),
        program.synth_rows()
    );
    Ok(())
}
