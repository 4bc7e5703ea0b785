//! Error types for the compile phase.
//!
//! Every variant of [`CompileError`] is a contract violation by the caller: the sequence being
//! compiled is wrong, so compilation of the current run stops and nothing is retried.
//! [`ConfigError`] covers loading the settings document that the channel map and the sequencer
//! are built from.

use thiserror::Error;

use crate::channel::ChannelKind;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("Update duration {duration} s spans {ticks} ticks at {clock_rate} Hz, at least 1 is required")]
    DurationTooShort {
        duration: f64,
        clock_rate: f64,
        ticks: f64,
    },

    #[error("Update at step {step} would overwrite already written words in [{start}, {end})")]
    WriteCollision { step: usize, start: usize, end: usize },

    #[error("Synthesizer trigger window [{start}, {end}) already carries a trigger from a previous row")]
    SynthTriggerCollision { start: usize, end: usize },

    #[error("Value {value} for analog channel {channel} is outside [{min}, {max}]")]
    AnalogOutOfRange {
        channel: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Region of {len} words ending at step {step} starts before the beginning of the timeline")]
    RegionUnderflow { step: usize, len: usize },

    #[error("Step {step} lies beyond the timeline capacity of {capacity} words")]
    BufferOverflow { step: usize, capacity: usize },

    #[error("Synthesizer table is full ({capacity} rows)")]
    SynthTableFull { capacity: usize },

    #[error("Channel {name} is not registered. Registered channels are {registered:?}")]
    UnknownChannel {
        name: String,
        registered: Vec<String>,
    },

    #[error("Channel {name} is a {actual} channel, not a {expected} channel")]
    ChannelKindMismatch {
        name: String,
        expected: ChannelKind,
        actual: ChannelKind,
    },

    #[error("Channel {0} appears more than once in the same update")]
    DuplicateChannel(String),

    #[error("Channel name {0:?} is not a valid identifier")]
    InvalidChannelName(String),

    #[error("Channel {name} already registered")]
    ChannelAlreadyRegistered { name: String },

    #[error("Cannot register {kind} channel {name} at address {address}, already taken by {owner}")]
    AddressAlreadyRegistered {
        name: String,
        kind: ChannelKind,
        address: usize,
        owner: String,
    },

    #[error("Address {address} is invalid for {kind} channel {name} (expected < {limit})")]
    InvalidAddress {
        name: String,
        kind: ChannelKind,
        address: usize,
        limit: usize,
    },

    #[error("Clock rate {0} Hz must be finite and positive")]
    InvalidClockRate(f64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error(transparent)]
    Channel(#[from] CompileError),
}
