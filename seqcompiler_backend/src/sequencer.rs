//! The sequencer compiles a list of timed channel updates into one static output program.
//!
//! ## Overview
//!
//! A [`Sequencer`] owns a [`TimelineBuffer`] and a [`SynthTableBuilder`] and a virtual-time
//! cursor, `runtime`. Each call to [`Sequencer::update`] (or [`Sequencer::apply`]) describes what
//! changes at the current cursor and how long the new state holds:
//!
//! 1. The boundary step is `floor(runtime * clock_rate)`, counted in clock ticks (see below).
//! 2. The latch words of the update are written immediately *before* the boundary: the six
//!    digital words (if any digital channel is named) occupy `[step - 6, step)`, and the analog
//!    pairs are stacked below them, two words per channel, in the order the channels were given.
//! 3. The word at the boundary gets the epoch trigger bit.
//! 4. The cursor advances by the update's duration.
//! 5. If any synthesizer channel is named, a new table row is appended and the synthesizer
//!    trigger bit is raised over `[step - trigger_width, step)`.
//!
//! ## Contract
//!
//! The buffer is only ever written once per word. An update whose latch words would land on a
//! word written by an earlier update is a [`CompileError::WriteCollision`]: the earlier latch
//! pulse would be lost before it is ever played. An update must also span at least one clock
//! tick. Every check runs before the first word is written, so a rejected update leaves the
//! sequencer exactly as it was.
//!
//! ## Tick counting
//!
//! Besides `runtime` in seconds, the sequencer keeps the cursor position in clock ticks and
//! advances it by `duration * clock_rate` per update. A tick count within [`TICK_TOLERANCE`] of
//! a whole number is snapped to it before flooring, so decimal durations such as `100e-6` s at
//! 1 MHz land on exact steps however many updates precede them. Fractional tick counts still
//! accumulate, so a run of 1.5-tick updates advances 1, 3, 4, 6, ...
//!
//! ## Lifetime
//!
//! Once the sequence is complete, [`Sequencer::finish`] consumes the sequencer and hands out a
//! [`CompiledProgram`]. A program is played by value and cannot be cloned, so a stale buffer is
//! never played twice; a new run starts from a new sequencer.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::collections::HashSet;
use std::sync::Arc;

use crate::channel::{ChannelKind, ChannelMap};
use crate::encoder::*;
use crate::error::CompileError;
use crate::synth::{SynthTableBuilder, SynthUpdate, SYNTH_CHANNELS, SYNTH_TABLE_CAPACITY};
use crate::timeline::TimelineBuffer;

/// Relative tolerance within which a tick count is taken as a whole number.
pub const TICK_TOLERANCE: f64 = 1e-9;

/// Snaps `ticks` to the nearest whole number when it is within [`TICK_TOLERANCE`] of it.
///
/// ```
/// # use seqcompiler_backend::*;
/// assert_eq!(snap_ticks(100e-6 * 1e6), 100.);
/// assert_eq!(snap_ticks(1.5), 1.5);
/// ```
pub fn snap_ticks(ticks: f64) -> f64 {
    let nearest = ticks.round();
    if (ticks - nearest).abs() <= TICK_TOLERANCE * nearest.abs().max(1.) {
        nearest
    } else {
        ticks
    }
}

/// Timing parameters of one compiled run.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerConfig {
    /// Output sample clock in Hz.
    pub clock_rate: f64,
    /// Longest program the timeline can hold, in seconds.
    pub max_duration: f64,
    /// Initial value of the cursor, in seconds. Leaves room for the first update's latch
    /// words and the first synthesizer trigger window.
    pub start_offset: f64,
    /// Minimum width of a synthesizer trigger pulse, in seconds.
    pub min_trigger_width: f64,
    /// Number of rows available in the synthesizer table.
    pub synth_capacity: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            clock_rate: 1e6,
            max_duration: 100.,
            start_offset: 100e-6,
            min_trigger_width: 100e-6,
            synth_capacity: SYNTH_TABLE_CAPACITY,
        }
    }
}

impl SequencerConfig {
    pub fn with_clock_rate(clock_rate: f64) -> Self {
        Self {
            clock_rate,
            ..Default::default()
        }
    }

    /// Timeline length in words.
    pub fn capacity(&self) -> usize {
        (self.max_duration * self.clock_rate).ceil() as usize
    }

    /// Synthesizer trigger width in clock steps.
    pub fn trigger_width(&self) -> usize {
        (self.min_trigger_width * self.clock_rate).ceil() as usize
    }

    fn validate(&self) -> Result<(), CompileError> {
        if !self.clock_rate.is_finite() || self.clock_rate <= 0. {
            return Err(CompileError::InvalidClockRate(self.clock_rate));
        }
        Ok(())
    }
}

/// A set of named channel changes that take effect together and hold for `duration` seconds.
///
/// # Example
/// ```
/// use seqcompiler_backend::*;
///
/// let update = Update::new(20e-3)
///     .analog("coil_sum", 2.5)
///     .digital("shutter", true)
///     .synth("cooling_freq", 80.0);
/// assert_eq!(update.duration(), 20e-3);
/// assert_eq!(update.analog_values().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    duration: f64,
    analog: Vec<(String, f64)>,
    digital: Vec<(String, bool)>,
    synth: Vec<(String, f64)>,
}

impl Update {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    pub fn analog(mut self, name: &str, value: f64) -> Self {
        self.analog.push((name.to_string(), value));
        self
    }

    pub fn digital(mut self, name: &str, high: bool) -> Self {
        self.digital.push((name.to_string(), high));
        self
    }

    pub fn synth(mut self, name: &str, value: f64) -> Self {
        self.synth.push((name.to_string(), value));
        self
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }
    pub fn analog_values(&self) -> &[(String, f64)] {
        &self.analog
    }
    pub fn digital_values(&self) -> &[(String, bool)] {
        &self.digital
    }
    pub fn synth_values(&self) -> &[(String, f64)] {
        &self.synth
    }
}

/// An update with names resolved and payloads encoded, ready to be placed.
struct ResolvedUpdate {
    analog: Vec<[Word; 2]>,
    digital: Option<[Word; DIGITAL_WORDS]>,
    synth: Option<SynthUpdate>,
}

impl ResolvedUpdate {
    fn latch_len(&self) -> usize {
        let digital_len = match self.digital {
            Some(_) => DIGITAL_WORDS,
            None => 0,
        };
        ANALOG_WORDS * self.analog.len() + digital_len
    }
}

fn check_unique(seen: &mut HashSet<String>, name: &str) -> Result<(), CompileError> {
    if !seen.insert(name.to_string()) {
        return Err(CompileError::DuplicateChannel(name.to_string()));
    }
    Ok(())
}

/// Resolves channel names against `channels` and encodes the payload words.
fn resolve(channels: &ChannelMap, update: &Update) -> Result<ResolvedUpdate, CompileError> {
    let mut seen = HashSet::new();

    let mut analog = Vec::with_capacity(update.analog.len());
    for (name, value) in update.analog.iter() {
        check_unique(&mut seen, name)?;
        let address = channels.resolve(name, ChannelKind::Analog)?;
        let pair = encode_analog(address, *value).map_err(|err| match err {
            CompileError::AnalogOutOfRange {
                value, min, max, ..
            } => CompileError::AnalogOutOfRange {
                channel: name.clone(),
                value,
                min,
                max,
            },
            other => other,
        })?;
        analog.push(pair);
    }

    let mut lines = Vec::with_capacity(update.digital.len());
    for (name, high) in update.digital.iter() {
        check_unique(&mut seen, name)?;
        lines.push((channels.resolve(name, ChannelKind::Digital)?, *high));
    }
    // Emptiness of the set decides, not the line values: an all-low update still writes
    let digital = match lines.len() {
        0 => None,
        _ => Some(encode_digital(lines)),
    };

    let mut synth_values: SynthUpdate = [None; SYNTH_CHANNELS];
    for (name, value) in update.synth.iter() {
        check_unique(&mut seen, name)?;
        let index = channels.resolve(name, ChannelKind::Synth)?;
        if synth_values[index].is_some() {
            return Err(CompileError::DuplicateChannel(name.clone()));
        }
        synth_values[index] = Some(*value);
    }
    let synth = match update.synth.len() {
        0 => None,
        _ => Some(synth_values),
    };

    Ok(ResolvedUpdate {
        analog,
        digital,
        synth,
    })
}

/// Compiles updates into a [`TimelineBuffer`] and a synthesizer table.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use seqcompiler_backend::*;
///
/// let mut channels = ChannelMap::new();
/// channels.add_analog("x", 0).unwrap();
/// channels.add_analog("y", 1).unwrap();
/// let mut seq = Sequencer::new(Arc::new(channels), SequencerConfig::with_clock_rate(1e6)).unwrap();
///
/// // The cursor starts 100 us in, so the first boundary is step 100
/// assert_eq!(seq.update(1e-3, &[("x", 5.0)], &[], &[]).unwrap(), 100);
/// assert_eq!(seq.update(1e-3, &[("y", -5.0)], &[], &[]).unwrap(), 1100);
///
/// let program = seq.finish();
/// assert_eq!(program.sample_count(), 2100);
/// assert_eq!(decode_analog(program.words()[98]).unwrap().0, 0);
/// assert_eq!(decode_analog(program.words()[1098]).unwrap().0, 1);
/// assert_eq!(program.words()[1100], EPOCH_TRIGGER);
/// ```
///
/// An update shorter than one clock tick is rejected:
/// ```
/// # use std::sync::Arc;
/// # use seqcompiler_backend::*;
/// let mut seq = Sequencer::new(Arc::new(ChannelMap::new()), SequencerConfig::default()).unwrap();
/// assert!(matches!(
///     seq.update(1e-7, &[], &[], &[]),
///     Err(CompileError::DurationTooShort { .. })
/// ));
/// ```
pub struct Sequencer {
    channels: Arc<ChannelMap>,
    config: SequencerConfig,
    runtime: f64,
    /// Cursor in clock ticks, possibly fractional.
    ticks: f64,
    buffer: TimelineBuffer,
    synth: SynthTableBuilder,
    update_count: usize,
}

impl Sequencer {
    /// Allocates the timeline and synthesizer table for one run.
    pub fn new(channels: Arc<ChannelMap>, config: SequencerConfig) -> Result<Self, CompileError> {
        config.validate()?;
        let buffer = TimelineBuffer::new(config.capacity());
        let synth = SynthTableBuilder::new(config.synth_capacity, config.trigger_width());
        log::debug!(
            "Allocated timeline of {} words at {} Hz, synthesizer trigger width {} steps",
            buffer.capacity(),
            config.clock_rate,
            synth.trigger_width()
        );
        Ok(Self {
            channels,
            runtime: config.start_offset,
            ticks: snap_ticks(config.start_offset * config.clock_rate),
            config,
            buffer,
            synth,
            update_count: 0,
        })
    }

    pub fn channels(&self) -> &ChannelMap {
        &self.channels
    }
    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }
    pub fn clock_rate(&self) -> f64 {
        self.config.clock_rate
    }
    /// Virtual time of the cursor, in seconds.
    pub fn runtime(&self) -> f64 {
        self.runtime
    }
    /// Buffer index of the cursor.
    pub fn step(&self) -> usize {
        self.ticks.floor() as usize
    }
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
    pub fn update_count(&self) -> usize {
        self.update_count
    }
    pub fn row_count(&self) -> usize {
        self.synth.row_count()
    }
    /// Filled portion of the timeline, `[0, step)`.
    pub fn words(&self) -> ArrayView1<Word> {
        self.buffer.view(self.step())
    }
    /// Filled portion of the synthesizer table.
    pub fn synth_rows(&self) -> ArrayView2<f64> {
        self.synth.rows()
    }

    /// Issues one update from name/value slices.
    ///
    /// Returns the boundary step at which the update takes effect. See [`Sequencer::apply`].
    pub fn update(
        &mut self,
        duration: f64,
        analog: &[(&str, f64)],
        digital: &[(&str, bool)],
        synth: &[(&str, f64)],
    ) -> Result<usize, CompileError> {
        let mut update = Update::new(duration);
        for (name, value) in analog {
            update = update.analog(name, *value);
        }
        for (name, high) in digital {
            update = update.digital(name, *high);
        }
        for (name, value) in synth {
            update = update.synth(name, *value);
        }
        self.apply(&update)
    }

    /// Places one update at the cursor and advances the cursor by its duration.
    ///
    /// Returns the boundary step at which the update takes effect.
    ///
    /// # Errors
    ///
    /// All errors are contract violations; the sequencer is left unchanged.
    /// - [`CompileError::DurationTooShort`] if the duration spans less than one clock tick.
    /// - [`CompileError::UnknownChannel`], [`CompileError::ChannelKindMismatch`],
    ///   [`CompileError::DuplicateChannel`], [`CompileError::AnalogOutOfRange`] for bad
    ///   channel values.
    /// - [`CompileError::WriteCollision`] if a latch word would overwrite an earlier one.
    /// - [`CompileError::SynthTriggerCollision`] if the synthesizer trigger window overlaps
    ///   the previous one.
    /// - [`CompileError::RegionUnderflow`], [`CompileError::BufferOverflow`],
    ///   [`CompileError::SynthTableFull`] when the program does not fit.
    pub fn apply(&mut self, update: &Update) -> Result<usize, CompileError> {
        let duration = update.duration();
        let clock_rate = self.config.clock_rate;
        let advance = snap_ticks(duration * clock_rate);
        let ticks = advance.floor();
        if !ticks.is_finite() || ticks < 1. {
            return Err(CompileError::DurationTooShort {
                duration,
                clock_rate,
                ticks,
            });
        }
        let resolved = resolve(&self.channels, update)?;

        let step = self.step();
        let end_ticks = snap_ticks(self.ticks + advance);
        let end_step = end_ticks.floor();
        if step >= self.buffer.capacity() || end_step > self.buffer.capacity() as f64 {
            return Err(CompileError::BufferOverflow {
                step: end_step as usize,
                capacity: self.buffer.capacity(),
            });
        }
        let (start, _) = self.buffer.region_before(step, resolved.latch_len())?;
        self.buffer.assert_unwritten(start, step)?;
        let window = match resolved.synth {
            Some(_) => Some(self.synth.check(&self.buffer, step)?),
            None => None,
        };

        // All checks passed: write
        let mut offset = step;
        if let Some(words) = resolved.digital {
            offset -= DIGITAL_WORDS;
            self.buffer.write(offset, &words);
        }
        for pair in resolved.analog.iter() {
            offset -= ANALOG_WORDS;
            self.buffer.write(offset, pair);
        }
        self.buffer.set_flag(step, step + 1, EPOCH_TRIGGER);
        self.runtime += duration;
        self.ticks = end_ticks;
        if let (Some(values), Some(window)) = (resolved.synth, window) {
            self.synth.push(&mut self.buffer, window, &values);
        }
        self.update_count += 1;

        log::debug!(
            "Update {} at step {step}: {} analog, {} digital, {} synth channels, {} ticks",
            self.update_count,
            resolved.analog.len(),
            update.digital_values().len(),
            update.synth_values().len(),
            ticks
        );
        Ok(step)
    }

    /// Ends compilation and hands the buffers over for a single playback.
    pub fn finish(self) -> CompiledProgram {
        let sample_count = self.step().min(self.buffer.capacity());
        let clock_rate = self.config.clock_rate;
        let runtime = self.runtime;
        let words = self
            .buffer
            .into_inner()
            .slice(ndarray::s![..sample_count])
            .to_owned();
        let synth_rows = self.synth.into_rows();
        log::info!(
            "Compiled {} updates: {} samples ({runtime} s), {} synthesizer rows",
            self.update_count,
            sample_count,
            synth_rows.nrows()
        );
        CompiledProgram {
            words,
            synth_rows,
            clock_rate,
            runtime,
        }
    }
}

/// The output of a finished [`Sequencer`]: the filled timeline and synthesizer table.
///
/// Not `Clone`: a program is handed to exactly one execution backend.
#[derive(Debug)]
pub struct CompiledProgram {
    words: Array1<Word>,
    synth_rows: Array2<f64>,
    clock_rate: f64,
    runtime: f64,
}

impl CompiledProgram {
    pub fn words(&self) -> ArrayView1<Word> {
        self.words.view()
    }
    pub fn synth_rows(&self) -> ArrayView2<f64> {
        self.synth_rows.view()
    }
    pub fn clock_rate(&self) -> f64 {
        self.clock_rate
    }
    /// Total programmed time in seconds, including the initial offset.
    pub fn runtime(&self) -> f64 {
        self.runtime
    }
    pub fn sample_count(&self) -> usize {
        self.words.len()
    }
    pub fn row_count(&self) -> usize {
        self.synth_rows.nrows()
    }
    pub fn into_parts(self) -> (Array1<Word>, Array2<f64>) {
        (self.words, self.synth_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn channels() -> Arc<ChannelMap> {
        let mut map = ChannelMap::new();
        map.add_analog("x", 0).unwrap();
        map.add_analog("y", 1).unwrap();
        map.add_analog("z", 12).unwrap();
        map.add_digital("shutter", 0).unwrap();
        map.add_digital("trig", 17).unwrap();
        map.add_synth("cooling", 0).unwrap();
        map.add_synth("repump", 1).unwrap();
        Arc::new(map)
    }

    fn sequencer() -> Sequencer {
        Sequencer::new(channels(), SequencerConfig::with_clock_rate(1e6)).unwrap()
    }

    #[test]
    fn duration_must_span_one_tick() {
        let mut seq = sequencer();
        for duration in [1e-7, 0., -1e-3, f64::NAN] {
            assert!(matches!(
                seq.update(duration, &[("x", 1.)], &[("shutter", true)], &[]),
                Err(CompileError::DurationTooShort { .. })
            ));
        }
        assert_eq!(seq.update_count(), 0);
        assert!(seq.update(2e-6, &[], &[], &[]).is_ok());
    }

    #[test]
    fn analog_pairs_stack_below_digital_block() {
        let mut seq = sequencer();
        let step = seq
            .update(1e-3, &[("x", 5.), ("z", -2.)], &[("shutter", true)], &[])
            .unwrap();
        assert_eq!(step, 100);
        let words = seq.words();
        // Digital block right before the boundary
        assert_eq!(decode_digital(&words.as_slice().unwrap()[94..100]), vec![0]);
        // First analog channel nearest the digital block
        let (addr, v) = decode_analog(words[92]).unwrap();
        assert_eq!(addr, 0);
        assert_approx_eq!(v, 5., ANALOG_STEP);
        assert_eq!(words[93], payload(words[92]));
        let (addr, v) = decode_analog(words[90]).unwrap();
        assert_eq!(addr, 12);
        assert_approx_eq!(v, -2., ANALOG_STEP);
        assert_eq!(words[89], 0);
        assert_eq!(seq.step(), 1100);
    }

    #[test]
    fn boundary_word_carries_epoch_trigger() {
        let mut seq = sequencer();
        seq.update(10e-6, &[("x", 0.)], &[], &[]).unwrap();
        seq.update(10e-6, &[], &[], &[]).unwrap();
        let program = seq.finish();
        assert_eq!(program.sample_count(), 120);
        assert_eq!(program.words()[100], EPOCH_TRIGGER);
        assert_eq!(program.words()[110], EPOCH_TRIGGER);
        assert_eq!(program.words()[101], 0);
    }

    #[test]
    fn overlapping_updates_collide() {
        let mut seq = sequencer();
        seq.update(1e-6, &[("x", 1.)], &[], &[]).unwrap();
        // Next boundary is 101: [99, 101) holds x's plain word and the epoch trigger
        let err = seq.update(1e-6, &[("y", 1.)], &[], &[]).unwrap_err();
        assert_eq!(
            err,
            CompileError::WriteCollision {
                step: 101,
                start: 99,
                end: 101
            }
        );
        // The rejected update left no trace
        assert_eq!(seq.update_count(), 1);
        assert_eq!(seq.step(), 101);
        assert_eq!(seq.words()[100], EPOCH_TRIGGER);
    }

    #[test]
    fn spaced_updates_do_not_collide() {
        let mut seq = sequencer();
        seq.update(3e-6, &[("x", 1.)], &[], &[]).unwrap();
        // Boundary 103: [101, 103) is free
        assert_eq!(seq.update(1e-3, &[("y", 1.)], &[], &[]), Ok(103));
        // A digital update needs six free words
        let mut seq = sequencer();
        seq.update(3e-6, &[("x", 1.)], &[], &[]).unwrap();
        assert!(matches!(
            seq.update(1e-3, &[], &[("shutter", true)], &[]),
            Err(CompileError::WriteCollision { .. })
        ));
    }

    #[test]
    fn emptiness_not_truthiness_decides_presence() {
        let mut seq = sequencer();
        // A digital set whose only value is low still writes the six words
        seq.update(1e-3, &[], &[("shutter", false)], &[]).unwrap();
        let words = seq.words();
        assert_eq!(words.slice(ndarray::s![94..100]).iter().filter(|&&w| w != 0).count(), 6);
        assert!(decode_digital(&words.as_slice().unwrap()[94..100]).is_empty());
        // An explicit zero frequency is a synthesizer update
        seq.update(1e-3, &[], &[], &[("cooling", 0.)]).unwrap();
        assert_eq!(seq.row_count(), 1);
        // Nothing named: no latch words, no row
        seq.update(1e-3, &[], &[], &[]).unwrap();
        assert_eq!(seq.row_count(), 1);
        assert_eq!(seq.words()[2098], 0);
    }

    #[test]
    fn synth_rows_carry_forward() {
        let mut seq = sequencer();
        seq.update(1e-3, &[], &[], &[("cooling", 1e6), ("repump", 2e6)])
            .unwrap();
        seq.update(1e-3, &[], &[], &[("cooling", 3e6)]).unwrap();
        let rows = seq.synth_rows();
        assert_eq!(rows.row(0).to_vec(), vec![1e6, 2e6, 0., 0.]);
        assert_eq!(rows.row(1).to_vec(), vec![3e6, 2e6, 0., 0.]);
    }

    #[test]
    fn synth_trigger_spacing() {
        // Width 100 steps; first row at step 100
        let mut seq = sequencer();
        seq.update(99e-6, &[], &[], &[("cooling", 1.)]).unwrap();
        assert!(matches!(
            seq.update(1e-3, &[], &[], &[("cooling", 2.)]),
            Err(CompileError::SynthTriggerCollision { start: 99, end: 199 })
        ));
        assert_eq!(seq.row_count(), 1);

        let mut seq = sequencer();
        seq.update(100e-6, &[], &[], &[("cooling", 1.)]).unwrap();
        assert_eq!(seq.update(1e-3, &[], &[], &[("cooling", 2.)]), Ok(200));
        assert_eq!(seq.row_count(), 2);
        let words = seq.words();
        assert!(words.iter().take(200).all(|&w| w & SYNTH_TRIGGER != 0));
    }

    #[test]
    fn fractional_ticks_accumulate() {
        let mut seq = sequencer();
        let steps: Vec<usize> = (0..4)
            .map(|_| seq.update(1.5e-6, &[], &[], &[]).unwrap())
            .collect();
        assert_eq!(steps, vec![100, 101, 103, 104]);
        assert_eq!(seq.step(), 106);
    }

    #[test]
    fn exact_spacing_holds_after_many_updates() {
        let mut seq = sequencer();
        for _ in 0..500 {
            seq.update(1e-3, &[], &[], &[]).unwrap();
        }
        assert_eq!(seq.step(), 500_100);
        assert_eq!(
            seq.update(100e-6, &[], &[], &[("cooling", 1.)]),
            Ok(500_100)
        );
        assert_eq!(
            seq.update(100e-6, &[], &[], &[("cooling", 2.)]),
            Ok(500_200)
        );
        assert_eq!(seq.step(), 500_300);
    }

    #[test]
    fn synth_window_keeps_latch_payload() {
        let mut seq = sequencer();
        seq.update(1e-3, &[("x", 5.)], &[], &[("repump", 7.)]).unwrap();
        let words = seq.words();
        assert_eq!(words[98] & SYNTH_TRIGGER, SYNTH_TRIGGER);
        assert!(is_strobed(words[98]));
        assert_approx_eq!(decode_analog(words[99]).unwrap().1, 5., ANALOG_STEP);
        assert_eq!(words[100], EPOCH_TRIGGER);
    }

    #[test]
    fn synth_window_before_start_is_rejected() {
        let config = SequencerConfig {
            start_offset: 50e-6,
            ..SequencerConfig::with_clock_rate(1e6)
        };
        let mut seq = Sequencer::new(channels(), config).unwrap();
        assert_eq!(
            seq.update(1e-3, &[], &[], &[("cooling", 1.)]),
            Err(CompileError::RegionUnderflow { step: 50, len: 100 })
        );
        assert_eq!(seq.update(1e-3, &[("x", 1.)], &[], &[]), Ok(50));
    }

    #[test]
    fn resolution_errors() {
        let mut seq = sequencer();
        assert!(matches!(
            seq.update(1e-3, &[("nope", 1.)], &[], &[]),
            Err(CompileError::UnknownChannel { .. })
        ));
        assert!(matches!(
            seq.update(1e-3, &[("shutter", 1.)], &[], &[]),
            Err(CompileError::ChannelKindMismatch { .. })
        ));
        assert_eq!(
            seq.update(1e-3, &[("x", 1.), ("x", 2.)], &[], &[]),
            Err(CompileError::DuplicateChannel("x".into()))
        );
        assert_eq!(
            seq.update(1e-3, &[("y", 11.)], &[], &[]),
            Err(CompileError::AnalogOutOfRange {
                channel: "y".into(),
                value: 11.,
                min: ANALOG_MIN,
                max: ANALOG_MAX
            })
        );
        assert_eq!(seq.update_count(), 0);
        assert_eq!(seq.words().iter().filter(|&&w| w != 0).count(), 0);
    }

    #[test]
    fn program_must_fit_timeline() {
        let config = SequencerConfig {
            max_duration: 1e-3,
            ..SequencerConfig::with_clock_rate(1e6)
        };
        let mut seq = Sequencer::new(channels(), config).unwrap();
        assert_eq!(seq.capacity(), 1000);
        assert!(matches!(
            seq.update(1e-3, &[("x", 1.)], &[], &[]),
            Err(CompileError::BufferOverflow { capacity: 1000, .. })
        ));
        assert_eq!(seq.update(900e-6, &[("x", 1.)], &[], &[]), Ok(100));
    }

    #[test]
    fn invalid_clock_rate() {
        assert!(matches!(
            Sequencer::new(channels(), SequencerConfig::with_clock_rate(0.)),
            Err(CompileError::InvalidClockRate(_))
        ));
    }

    #[test]
    fn finished_program_holds_filled_portion() {
        let mut seq = sequencer();
        seq.update(1e-3, &[("x", 5.)], &[], &[("cooling", 80.)]).unwrap();
        seq.update(1e-3, &[("y", -5.)], &[], &[]).unwrap();
        let program = seq.finish();
        assert_eq!(program.sample_count(), 2100);
        assert_eq!(program.row_count(), 1);
        assert_approx_eq!(program.runtime(), 2.1e-3);
        let (words, rows) = program.into_parts();
        assert_eq!(words.len(), 2100);
        assert_eq!(rows.shape(), &[1, 4]);
    }
}
