//! Static lookup from channel names to hardware addresses.
//!
//! A [`ChannelMap`] is built once from configuration (see [`crate::config::Settings::channel_map`])
//! and is immutable afterwards. Channel names are resolved here, at the boundary, so that the
//! [`encoder`] and the [`Sequencer`] only ever see integer addresses.
//!
//! ## Address conventions
//!
//! - [`ChannelKind::Analog`]: `address / 8` selects one of four DAC boards, `address % 8` the
//!   channel within the board. Valid addresses are `0..32`.
//! - [`ChannelKind::Digital`]: `address / 16` selects one of three line boards, `address % 16`
//!   the line. Addresses on a fourth board are accepted but never reach the hardware.
//! - [`ChannelKind::Synth`]: one of the four synthesizer output channels, `0..4`.
//!
//! [`encoder`]: crate::encoder
//! [`Sequencer`]: crate::sequencer::Sequencer

use indexmap::IndexMap;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::encoder::{ANALOG_CHANNELS, DIGITAL_LINES_PER_BOARD, DIGITAL_BOARDS};
use crate::error::CompileError;
use crate::synth::SYNTH_CHANNELS;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Kind of output a channel drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Analog,
    Digital,
    Synth,
}
impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ChannelKind::Analog => "analog",
                ChannelKind::Digital => "digital",
                ChannelKind::Synth => "synthesizer",
            }
        )
    }
}

/// A named output channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    name: String,
    kind: ChannelKind,
    address: usize,
}

impl Channel {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }
    pub fn address(&self) -> usize {
        self.address
    }
    /// Board index of the channel, `None` for synthesizer channels.
    pub fn board(&self) -> Option<usize> {
        match self.kind {
            ChannelKind::Analog => Some(self.address / 8),
            ChannelKind::Digital => Some(self.address / DIGITAL_LINES_PER_BOARD),
            ChannelKind::Synth => None,
        }
    }
}
impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} @ {})", self.name, self.kind, self.address)
    }
}

/// Name-to-address table for every channel of the setup.
///
/// Channels keep the order in which they were registered.
///
/// # Example
/// ```
/// use seqcompiler_backend::*;
///
/// let mut channels = ChannelMap::new();
/// channels.add_analog("coil_sum", 0).unwrap();
/// channels.add_digital("shutter", 3).unwrap();
/// channels.add_synth("cooling_freq", 0).unwrap();
///
/// assert_eq!(channels.resolve("shutter", ChannelKind::Digital).unwrap(), 3);
/// assert!(channels.resolve("shutter", ChannelKind::Analog).is_err());
/// assert!(channels.resolve("missing", ChannelKind::Analog).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    channels: IndexMap<String, Channel>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self {
            channels: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// Iterates over the channels of one kind in registration order.
    pub fn of_kind(&self, kind: ChannelKind) -> impl Iterator<Item = &Channel> {
        self.channels.values().filter(move |chan| chan.kind == kind)
    }

    pub fn add_analog(&mut self, name: &str, address: usize) -> Result<(), CompileError> {
        self.add_channel(name, ChannelKind::Analog, address)
    }

    pub fn add_digital(&mut self, name: &str, address: usize) -> Result<(), CompileError> {
        self.add_channel(name, ChannelKind::Digital, address)
    }

    pub fn add_synth(&mut self, name: &str, address: usize) -> Result<(), CompileError> {
        self.add_channel(name, ChannelKind::Synth, address)
    }

    /// Registers a channel after checking its name and address.
    ///
    /// Names follow the identifier convention of the settings file (`[A-Za-z_][A-Za-z0-9_]*`).
    /// Each address of a kind belongs to at most one name.
    pub fn add_channel(
        &mut self,
        name: &str,
        kind: ChannelKind,
        address: usize,
    ) -> Result<(), CompileError> {
        if !name_pattern().is_match(name) {
            return Err(CompileError::InvalidChannelName(name.to_string()));
        }
        if self.channels.contains_key(name) {
            return Err(CompileError::ChannelAlreadyRegistered {
                name: name.to_string(),
            });
        }
        let limit = match kind {
            ChannelKind::Analog => Some(ANALOG_CHANNELS),
            ChannelKind::Synth => Some(SYNTH_CHANNELS),
            ChannelKind::Digital => None,
        };
        if let Some(limit) = limit {
            if address >= limit {
                return Err(CompileError::InvalidAddress {
                    name: name.to_string(),
                    kind,
                    address,
                    limit,
                });
            }
        }
        if let Some(owner) = self
            .channels
            .values()
            .find(|chan| chan.kind == kind && chan.address == address)
        {
            return Err(CompileError::AddressAlreadyRegistered {
                name: name.to_string(),
                kind,
                address,
                owner: owner.name.clone(),
            });
        }
        if kind == ChannelKind::Digital && address >= DIGITAL_BOARDS * DIGITAL_LINES_PER_BOARD {
            log::warn!(
                "Digital channel {name} at address {address} is not on any of the {DIGITAL_BOARDS} boards and will never be output"
            );
        }
        self.channels.insert(
            name.to_string(),
            Channel {
                name: name.to_string(),
                kind,
                address,
            },
        );
        Ok(())
    }

    /// Looks up a channel by name and checks that it is of the expected kind.
    pub fn channel(&self, name: &str, kind: ChannelKind) -> Result<&Channel, CompileError> {
        let chan = self
            .channels
            .get(name)
            .ok_or_else(|| CompileError::UnknownChannel {
                name: name.to_string(),
                registered: self.names(),
            })?;
        if chan.kind != kind {
            return Err(CompileError::ChannelKindMismatch {
                name: name.to_string(),
                expected: kind,
                actual: chan.kind,
            });
        }
        Ok(chan)
    }

    /// Shortcut for `channel(name, kind)?.address()`.
    pub fn resolve(&self, name: &str, kind: ChannelKind) -> Result<usize, CompileError> {
        self.channel(name, kind).map(|chan| chan.address)
    }
}
