//! Pure mapping from (address, value) pairs to 32-bit output codewords.
//!
//! ## Word layout
//!
//! | bits  | meaning |
//! |-------|---------|
//! | 31    | strobe: the output boards latch the payload while it is set |
//! | 30    | epoch trigger, set on the boundary word of every update |
//! | 28    | synthesizer trigger, held high for the minimum pulse width before a new table row |
//! | 20-23 | analog board select (jumper setting of the DAC board) |
//! | 16-18 | analog channel within the board |
//! | 16-17 | digital board identifier |
//! | 0-15  | analog value, or digital line states |
//!
//! Every update is written as a strobed word immediately followed by the same payload with the
//! strobe cleared, which produces one latch pulse on the bus. Digital updates always rewrite all
//! three line boards, so they produce three such pairs.
//!
//! The trigger bits are never produced here. They are OR-ed onto buffer words by the
//! [`Sequencer`](crate::sequencer::Sequencer) independently of the payload.

use crate::error::CompileError;
use crate::channel::ChannelKind;

/// One clock step of the output program.
pub type Word = u32;

pub const STROBE: Word = 1 << 31;
pub const EPOCH_TRIGGER: Word = 1 << 30;
pub const SYNTH_TRIGGER: Word = 1 << 28;
/// Bits that are not part of a channel payload.
pub const FLAG_MASK: Word = STROBE | EPOCH_TRIGGER | SYNTH_TRIGGER;

pub const ANALOG_MIN: f64 = -10.0;
pub const ANALOG_MAX: f64 = 10.0;
const ANALOG_FULL_SCALE: f64 = 65535.0;
/// Quantization step of the analog value field.
pub const ANALOG_STEP: f64 = (ANALOG_MAX - ANALOG_MIN) / ANALOG_FULL_SCALE;

const ANALOG_VALUE_MASK: Word = 0xFFFF;
const ANALOG_CHANNEL_SHIFT: u32 = 16;
const ANALOG_CHANNEL_MASK: Word = 0x7 << ANALOG_CHANNEL_SHIFT;
const ANALOG_BOARD_MASK: Word = 0xF << 20;
/// Board select bits for each DAC board, indexed by `address / 8`.
pub const ANALOG_BOARD_SELECT: [Word; 4] = [0x90_0000, 0x10_0000, 0xE0_0000, 0x60_0000];
pub const ANALOG_CHANNELS_PER_BOARD: usize = 8;
pub const ANALOG_CHANNELS: usize = ANALOG_BOARD_SELECT.len() * ANALOG_CHANNELS_PER_BOARD;
/// Number of buffer words written per analog channel update.
pub const ANALOG_WORDS: usize = 2;

/// Identifier bits for each line board, indexed by `address / 16`.
pub const DIGITAL_BOARD_ID: [Word; 3] = [3 << 16, 2 << 16, 1 << 16];
const DIGITAL_BOARD_MASK: Word = 0x3 << 16;
pub const DIGITAL_BOARDS: usize = DIGITAL_BOARD_ID.len();
pub const DIGITAL_LINES_PER_BOARD: usize = 16;
/// Number of buffer words written per digital update, whatever the number of lines.
pub const DIGITAL_WORDS: usize = 2 * DIGITAL_BOARDS;

/// Encodes a voltage for one analog channel as a `[strobed, plain]` word pair.
///
/// The voltage is scaled linearly from `[-10, 10]` onto the 16-bit value field (truncating
/// towards zero). Out-of-range or non-finite voltages are rejected rather than clamped.
///
/// # Example
/// ```
/// use seqcompiler_backend::encoder::*;
///
/// let [strobed, plain] = encode_analog(9, 5.0).unwrap();
/// assert_eq!(strobed, plain | STROBE);
/// // Board 1, channel 1, value floor(15 * 65535 / 20)
/// assert_eq!(plain, 0x10_0000 | (1 << 16) | 49151);
/// assert!(encode_analog(0, 10.5).is_err());
/// ```
pub fn encode_analog(address: usize, value: f64) -> Result<[Word; 2], CompileError> {
    if address >= ANALOG_CHANNELS {
        return Err(CompileError::InvalidAddress {
            name: format!("#{address}"),
            kind: ChannelKind::Analog,
            address,
            limit: ANALOG_CHANNELS,
        });
    }
    if !value.is_finite() || value < ANALOG_MIN || value > ANALOG_MAX {
        return Err(CompileError::AnalogOutOfRange {
            channel: format!("#{address}"),
            value,
            min: ANALOG_MIN,
            max: ANALOG_MAX,
        });
    }
    let code = ((value - ANALOG_MIN) * ANALOG_FULL_SCALE / (ANALOG_MAX - ANALOG_MIN)) as Word;
    let data = (code & ANALOG_VALUE_MASK)
        + ANALOG_BOARD_SELECT[address / ANALOG_CHANNELS_PER_BOARD]
        + ((address % ANALOG_CHANNELS_PER_BOARD) as Word) * (1 << ANALOG_CHANNEL_SHIFT);
    Ok([data | STROBE, data])
}

/// Encodes the complete state of the three line boards as six words.
///
/// Lines not listed (or listed as `false`) are low. Lines on a fourth or later board are
/// ignored. The output does not depend on the iteration order of `lines`.
///
/// # Example
/// ```
/// use seqcompiler_backend::encoder::*;
///
/// let words = encode_digital([(0, true), (17, true), (5, false)]);
/// assert_eq!(words[1], 3 << 16 | 0b1);
/// assert_eq!(words[3], 2 << 16 | 0b10);
/// assert_eq!(words[5], 1 << 16);
/// assert_eq!(words[0], words[1] | STROBE);
/// ```
pub fn encode_digital<I>(lines: I) -> [Word; DIGITAL_WORDS]
where
    I: IntoIterator<Item = (usize, bool)>,
{
    let mut boards = DIGITAL_BOARD_ID;
    for (address, high) in lines {
        let board = address / DIGITAL_LINES_PER_BOARD;
        if board >= DIGITAL_BOARDS {
            continue;
        }
        if high {
            boards[board] |= 1 << (address % DIGITAL_LINES_PER_BOARD);
        }
    }
    let mut words = [0; DIGITAL_WORDS];
    for (i, board) in boards.iter().enumerate() {
        words[2 * i] = board | STROBE;
        words[2 * i + 1] = *board;
    }
    words
}

/// Recovers `(address, voltage)` from an analog word, ignoring strobe and trigger bits.
///
/// Returns `None` if the board select bits do not belong to any DAC board.
pub fn decode_analog(word: Word) -> Option<(usize, f64)> {
    let board = ANALOG_BOARD_SELECT
        .iter()
        .position(|&select| select == word & ANALOG_BOARD_MASK)?;
    let channel = ((word & ANALOG_CHANNEL_MASK) >> ANALOG_CHANNEL_SHIFT) as usize;
    let value = (word & ANALOG_VALUE_MASK) as f64 * ANALOG_STEP + ANALOG_MIN;
    Some((board * ANALOG_CHANNELS_PER_BOARD + channel, value))
}

/// Recovers the sorted list of high line addresses from the words of a digital update.
///
/// Words are matched to boards by their identifier bits, so the slice may contain the
/// strobed copies as well.
pub fn decode_digital(words: &[Word]) -> Vec<usize> {
    let mut high = std::collections::BTreeSet::new();
    for &word in words {
        let Some(board) = DIGITAL_BOARD_ID
            .iter()
            .position(|&id| id == word & DIGITAL_BOARD_MASK)
        else {
            continue;
        };
        for line in 0..DIGITAL_LINES_PER_BOARD {
            if word & (1 << line) != 0 {
                high.insert(board * DIGITAL_LINES_PER_BOARD + line);
            }
        }
    }
    high.into_iter().collect()
}

pub fn is_strobed(word: Word) -> bool {
    word & STROBE != 0
}

/// Channel payload of a word with all flag bits cleared.
pub fn payload(word: Word) -> Word {
    word & !FLAG_MASK
}
