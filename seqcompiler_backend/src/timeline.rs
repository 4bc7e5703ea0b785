//! The Timeline Buffer: a pre-sized array of output words indexed by clock step.
//!
//! The buffer is zeroed at allocation and a zero word means "unwritten". Once a region has been
//! written it is never written again, except that trigger flags may be OR-ed on top of an
//! existing payload. The checks for both rules live here; the [`Sequencer`] decides which
//! regions to check and write.
//!
//! [`Sequencer`]: crate::sequencer::Sequencer

use ndarray::{s, Array1, ArrayView1};

use crate::encoder::Word;
use crate::error::CompileError;

pub struct TimelineBuffer {
    words: Array1<Word>,
}

impl TimelineBuffer {
    /// Allocates `capacity` unwritten words.
    pub fn new(capacity: usize) -> Self {
        Self {
            words: Array1::zeros(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    pub fn word(&self, step: usize) -> Word {
        self.words[step]
    }

    /// Read-only view of `[0, end)`.
    pub fn view(&self, end: usize) -> ArrayView1<Word> {
        self.words.slice(s![..end.min(self.capacity())])
    }

    /// Returns the region of `len` words ending right before `end`, checking its bounds.
    pub fn region_before(&self, end: usize, len: usize) -> Result<(usize, usize), CompileError> {
        if end > self.capacity() {
            return Err(CompileError::BufferOverflow {
                step: end,
                capacity: self.capacity(),
            });
        }
        if len > end {
            return Err(CompileError::RegionUnderflow { step: end, len });
        }
        Ok((end - len, end))
    }

    /// Fails with `WriteCollision` if any word of `[start, end)` has been written.
    pub fn assert_unwritten(&self, start: usize, end: usize) -> Result<(), CompileError> {
        if self.words.slice(s![start..end]).iter().any(|&w| w != 0) {
            return Err(CompileError::WriteCollision {
                step: end,
                start,
                end,
            });
        }
        Ok(())
    }

    /// True if any word of `[start, end)` carries one of the bits in `flag`.
    pub fn any_flagged(&self, start: usize, end: usize, flag: Word) -> bool {
        self.words
            .slice(s![start..end])
            .iter()
            .any(|&w| w & flag != 0)
    }

    /// Overwrites the words starting at `start` with `data`.
    pub fn write(&mut self, start: usize, data: &[Word]) {
        self.words
            .slice_mut(s![start..start + data.len()])
            .assign(&ArrayView1::from(data));
    }

    /// ORs `flag` onto every word of `[start, end)`, keeping their payload.
    pub fn set_flag(&mut self, start: usize, end: usize, flag: Word) {
        self.words
            .slice_mut(s![start..end])
            .map_inplace(|w| *w |= flag);
    }

    pub(crate) fn into_inner(self) -> Array1<Word> {
        self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EPOCH_TRIGGER, SYNTH_TRIGGER};

    #[test]
    fn regions_are_bounds_checked() {
        let buf = TimelineBuffer::new(10);
        assert_eq!(buf.region_before(10, 4), Ok((6, 10)));
        assert_eq!(buf.region_before(3, 3), Ok((0, 3)));
        assert_eq!(
            buf.region_before(3, 4),
            Err(CompileError::RegionUnderflow { step: 3, len: 4 })
        );
        assert_eq!(
            buf.region_before(11, 1),
            Err(CompileError::BufferOverflow {
                step: 11,
                capacity: 10
            })
        );
    }

    #[test]
    fn written_words_collide() {
        let mut buf = TimelineBuffer::new(10);
        buf.write(4, &[7, 8]);
        assert!(buf.assert_unwritten(0, 4).is_ok());
        assert!(buf.assert_unwritten(6, 10).is_ok());
        assert_eq!(
            buf.assert_unwritten(5, 7),
            Err(CompileError::WriteCollision {
                step: 7,
                start: 5,
                end: 7
            })
        );
        // Empty regions never collide
        assert!(buf.assert_unwritten(5, 5).is_ok());
    }

    #[test]
    fn flags_keep_payload() {
        let mut buf = TimelineBuffer::new(8);
        buf.write(2, &[0x1234, 0x5678]);
        buf.set_flag(1, 4, SYNTH_TRIGGER);
        assert_eq!(buf.word(1), SYNTH_TRIGGER);
        assert_eq!(buf.word(2), 0x1234 | SYNTH_TRIGGER);
        assert_eq!(buf.word(3), 0x5678 | SYNTH_TRIGGER);
        assert_eq!(buf.word(4), 0);
        assert!(buf.any_flagged(0, 2, SYNTH_TRIGGER));
        assert!(!buf.any_flagged(0, 8, EPOCH_TRIGGER));
        assert_eq!(buf.view(3).to_vec(), vec![0, SYNTH_TRIGGER, 0x1234 | SYNTH_TRIGGER]);
    }
}
