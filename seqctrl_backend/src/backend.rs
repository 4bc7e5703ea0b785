//! Execution backends: the consumers of a [`CompiledProgram`].
//!
//! A backend receives the program by value, so each compiled buffer is played at most once.
//!
//! - [`SimulationSink`] keeps the last program for inspection and performs no I/O.
//! - [`HardwareSink`] programs the synthesizer table over its serial link, then plays the
//!   timeline on a [`ClockedOutput`]. The synthesizer is always fully programmed before the
//!   clocked stream is armed, since the stream carries the synthesizer's trigger pulses.

use ndarray::{Array1, Array2, ArrayView2};
use std::io;

use seqcompiler_backend::{CompiledProgram, TickTimer, Word, SYNTH_CHANNELS};

use crate::error::BackendError;
use crate::link::SerialLink;
use crate::novatech::{Novatech409B, TableEntry, FULL_AMPLITUDE};

pub trait ExecutionBackend {
    fn execute(&mut self, program: CompiledProgram) -> Result<(), BackendError>;
}

/// A device that plays a flat sequence of output words at a fixed sample clock.
pub trait ClockedOutput {
    /// Writes `samples`, plays them at `clock_rate` Hz and blocks until done.
    ///
    /// Fails with [`BackendError::Timeout`] if playback does not finish within `timeout` seconds.
    fn play(&mut self, samples: &[Word], clock_rate: f64, timeout: f64)
        -> Result<(), BackendError>;
}

/// Upper bound on playback time: the programmed runtime rounded up to a whole second, plus
/// 100 ms for arming.
pub fn playback_timeout(runtime: f64) -> f64 {
    runtime.ceil() + 0.1
}

#[derive(Default)]
pub struct SimulationSink {
    waveform: Option<Array1<Word>>,
    synth_table: Option<Array2<f64>>,
    executions: usize,
}

impl SimulationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeline of the last executed program.
    pub fn waveform(&self) -> Option<&Array1<Word>> {
        self.waveform.as_ref()
    }

    /// Synthesizer rows of the last executed program.
    pub fn synth_table(&self) -> Option<&Array2<f64>> {
        self.synth_table.as_ref()
    }

    pub fn executions(&self) -> usize {
        self.executions
    }
}

impl ExecutionBackend for SimulationSink {
    fn execute(&mut self, program: CompiledProgram) -> Result<(), BackendError> {
        let runtime = program.runtime();
        let (words, rows) = program.into_parts();
        log::info!(
            "Simulated run of {runtime} s: waveform {:?}, synthesizer table {:?}",
            words.shape(),
            rows.shape()
        );
        self.waveform = Some(words);
        self.synth_table = Some(rows);
        self.executions += 1;
        Ok(())
    }
}

type Connect<L> = Box<dyn FnMut() -> io::Result<L>>;

/// Loads `rows` into the device table on every channel, followed by a terminal copy of the last
/// row, and arms the table.
pub fn program_synth_table<L: SerialLink>(
    dds: &mut Novatech409B<L>,
    rows: ArrayView2<f64>,
) -> Result<(), BackendError> {
    dds.setup()?;
    dds.table_mode_define()?;
    let mut timer = TickTimer::new();
    let entry = |channel, index, mhz, terminal| TableEntry {
        channel,
        index,
        mhz,
        phase: 0,
        amplitude: FULL_AMPLITUDE,
        terminal,
    };
    for (index, row) in rows.outer_iter().enumerate() {
        for (channel, &mhz) in row.iter().enumerate().take(SYNTH_CHANNELS) {
            dds.program_table_entry(&entry(channel, index, mhz, false))?;
        }
    }
    // Repeat the last row as a terminal entry so the table stops there
    if let Some(last) = rows.outer_iter().last() {
        for (channel, &mhz) in last.iter().enumerate().take(SYNTH_CHANNELS) {
            dds.program_table_entry(&entry(channel, rows.nrows(), mhz, true))?;
        }
    }
    dds.table_mode_run()?;
    timer.tick_log(&format!("Programmed {} synthesizer rows", rows.nrows()));
    Ok(())
}

/// Plays programs on real hardware.
///
/// `O` is the clocked output. The synthesizer link, if any, is opened anew for each program and
/// closed again before playback, whether or not programming succeeded.
pub struct HardwareSink<O: ClockedOutput, L: SerialLink> {
    output: O,
    connect: Option<Connect<L>>,
}

impl<O: ClockedOutput, L: SerialLink> HardwareSink<O, L> {
    /// A sink without synthesizer; synthesizer rows are not programmed.
    pub fn new(output: O) -> Self {
        Self {
            output,
            connect: None,
        }
    }

    /// A sink that opens the synthesizer link with `connect` before each playback.
    pub fn with_synth<F>(output: O, connect: F) -> Self
    where
        F: FnMut() -> io::Result<L> + 'static,
    {
        Self {
            output,
            connect: Some(Box::new(connect)),
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    fn program_synth(&mut self, rows: ArrayView2<f64>) -> Result<(), BackendError> {
        let connect = match self.connect.as_mut() {
            Some(connect) => connect,
            None => {
                if rows.nrows() > 0 {
                    log::warn!(
                        "No synthesizer link configured, {} rows are not programmed",
                        rows.nrows()
                    );
                }
                return Ok(());
            }
        };
        if rows.nrows() == 0 {
            log::info!("No synthesizer rows to program");
            return Ok(());
        }
        let link = connect().map_err(crate::error::NovatechError::from)?;
        let mut dds = Novatech409B::new(link);
        let result = program_synth_table(&mut dds, rows);
        // Close the link before reporting
        drop(dds.close());
        if let Err(err) = &result {
            log::error!("{err}");
        }
        result
    }
}

impl<O: ClockedOutput, L: SerialLink> ExecutionBackend for HardwareSink<O, L> {
    fn execute(&mut self, program: CompiledProgram) -> Result<(), BackendError> {
        let clock_rate = program.clock_rate();
        let timeout = playback_timeout(program.runtime());
        let (words, rows) = program.into_parts();

        self.program_synth(rows.view())?;
        drop(rows);

        let samples = words.into_raw_vec();
        log::info!(
            "Playing {} samples at {clock_rate} Hz, timeout {timeout} s",
            samples.len()
        );
        let mut timer = TickTimer::new();
        self.output.play(&samples, clock_rate, timeout)?;
        timer.tick_log("Playback");
        Ok(())
    }
}
