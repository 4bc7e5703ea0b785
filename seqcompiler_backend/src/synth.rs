//! Programming table for the four-channel frequency synthesizer.
//!
//! The synthesizer is loaded with a table of rows before playback and steps to the next row on
//! every rising edge of its trigger input. [`SynthTableBuilder`] grows that table in lock-step
//! with the [`Sequencer`]: each update that touches a synthesizer channel appends one row and
//! raises the synthesizer trigger bit for the minimum pulse width right before the update's
//! boundary step.
//!
//! ## Carry-forward
//!
//! A row holds a value for every channel. Channels not named by the update take the value of the
//! same channel in the previous row; the first row has no previous row and defaults them to `0`.
//! An explicit value, including `0.0`, always wins over the carried value.
//!
//! [`Sequencer`]: crate::sequencer::Sequencer

use ndarray::{s, Array1, Array2, ArrayView2};

use crate::encoder::SYNTH_TRIGGER;
use crate::error::CompileError;
use crate::timeline::TimelineBuffer;

pub const SYNTH_CHANNELS: usize = 4;
/// Rows available to the sequencer. The device table has one more entry, used on playback to
/// terminate the table.
pub const SYNTH_TABLE_CAPACITY: usize = 32767;

/// Requested values for one row; `None` means "carry forward".
pub type SynthUpdate = [Option<f64>; SYNTH_CHANNELS];

pub struct SynthTableBuilder {
    rows: Array2<f64>,
    row_count: usize,
    trigger_width: usize,
}

impl SynthTableBuilder {
    /// Allocates a table of `capacity` rows. `trigger_width` is the minimum trigger pulse width
    /// in clock steps.
    pub fn new(capacity: usize, trigger_width: usize) -> Self {
        Self {
            rows: Array2::zeros((capacity, SYNTH_CHANNELS)),
            row_count: 0,
            trigger_width,
        }
    }

    pub fn capacity(&self) -> usize {
        self.rows.nrows()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn trigger_width(&self) -> usize {
        self.trigger_width
    }

    /// Filled rows, shape `(row_count, 4)`.
    pub fn rows(&self) -> ArrayView2<f64> {
        self.rows.slice(s![..self.row_count, ..])
    }

    pub fn row(&self, index: usize) -> Option<[f64; SYNTH_CHANNELS]> {
        if index >= self.row_count {
            return None;
        }
        let mut row = [0.; SYNTH_CHANNELS];
        row.iter_mut()
            .zip(self.rows.row(index).iter())
            .for_each(|(dst, src)| *dst = *src);
        Some(row)
    }

    /// Applies the carry-forward rule to `update` against the last row.
    pub fn merge(&self, update: &SynthUpdate) -> [f64; SYNTH_CHANNELS] {
        let previous = match self.row_count {
            0 => [0.; SYNTH_CHANNELS],
            n => self.row(n - 1).unwrap_or([0.; SYNTH_CHANNELS]),
        };
        let mut row = previous;
        for (value, requested) in row.iter_mut().zip(update.iter()) {
            if let Some(requested) = requested {
                *value = *requested;
            }
        }
        row
    }

    /// Validates a new row whose trigger ends at `step` without touching any state.
    ///
    /// Returns the trigger window `[step - trigger_width, step)`. The window must not already
    /// carry a synthesizer trigger: the device cannot latch two rows faster than one pulse width.
    pub fn check(
        &self,
        buffer: &TimelineBuffer,
        step: usize,
    ) -> Result<(usize, usize), CompileError> {
        if self.row_count >= self.capacity() {
            return Err(CompileError::SynthTableFull {
                capacity: self.capacity(),
            });
        }
        let (start, end) = buffer.region_before(step, self.trigger_width)?;
        if buffer.any_flagged(start, end, SYNTH_TRIGGER) {
            return Err(CompileError::SynthTriggerCollision { start, end });
        }
        Ok((start, end))
    }

    /// Appends the merged row and raises the trigger bit over its window.
    ///
    /// Must be preceded by a successful [`SynthTableBuilder::check`] for the same `step`.
    pub fn push(
        &mut self,
        buffer: &mut TimelineBuffer,
        window: (usize, usize),
        update: &SynthUpdate,
    ) -> usize {
        let row = self.merge(update);
        let index = self.row_count;
        self.rows.row_mut(index).assign(&Array1::from(row.to_vec()));
        self.row_count += 1;
        buffer.set_flag(window.0, window.1, SYNTH_TRIGGER);
        log::debug!(
            "Synthesizer row {index} = {row:?}, trigger window [{}, {})",
            window.0,
            window.1
        );
        index
    }

    pub(crate) fn into_rows(self) -> Array2<f64> {
        self.rows.slice(s![..self.row_count, ..]).to_owned()
    }
}
