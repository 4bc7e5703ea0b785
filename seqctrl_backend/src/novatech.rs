//! Driver for the Novatech 409B four-channel frequency synthesizer.
//!
//! The 409B speaks a line-based text protocol: each command is terminated by `\r\n` and most
//! commands answer with one line, `OK` on success or a `?`-prefixed error code. Frequencies are
//! given in MHz, phases in turns and amplitudes in volts.
//!
//! For sequenced runs the device is used in table mode: rows are loaded with `t` commands after
//! `m 0`, and `m t` arms the table so that every rising edge on the trigger input steps to the
//! next row.
//!
//! A driver built with [`Novatech409B::simulated`] has no link; it logs every command and
//! succeeds.
//!
//! # Example
//! ```
//! use seqctrl_backend::*;
//!
//! let link = ScriptedLink::accepting();
//! let transcript = link.transcript();
//! let mut dds = Novatech409B::new(link);
//! dds.setup().unwrap();
//! dds.set_freq(0, 80.5).unwrap();
//! assert_eq!(*transcript.borrow(), vec!["E d", "M n", "I a", "F0 80.500000"]);
//! ```

use maplit::hashmap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::NovatechError;
use crate::link::SerialLink;

pub const NOVATECH_CHANNELS: usize = 4;
/// Highest table index the device accepts.
pub const TABLE_LAST_INDEX: usize = 0x7fff;
pub const FULL_AMPLITUDE: u16 = 1023;
const MAX_LINE_LEN: usize = 256;
/// Version field of the status line of a supported firmware.
const FIRMWARE_VERSION: &str = "21";

/// Human-readable description of a device error code.
pub fn describe_error_code(code: &str) -> &'static str {
    static CODES: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    let codes = CODES.get_or_init(|| hashmap! {
        "?0" => "Unrecognized Command",
        "?1" => "Bad Frequency",
        "?2" => "Bad AM Command",
        "?3" => "Input line too long",
        "?4" => "Bad Phase",
        "?5" => "Bad Time",
        "?6" => "Bad Mode",
        "?7" => "Bad Amp",
        "?8" => "Bad Constant",
        "?f" => "Bad Byte",
    });
    codes.get(code).copied().unwrap_or("Unrecognized reply")
}

/// Frequency word of the table commands, in units of 0.1 Hz.
pub fn frequency_word(mhz: f64) -> Result<u32, NovatechError> {
    let word = (mhz * 1e7).round();
    if !word.is_finite() || word < 0. || word > u32::MAX as f64 {
        return Err(NovatechError::FrequencyOutOfRange { mhz });
    }
    Ok(word as u32)
}

/// One line of the device table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableEntry {
    pub channel: usize,
    pub index: usize,
    pub mhz: f64,
    pub phase: u16,
    pub amplitude: u16,
    /// Terminal entries (`00`) stop the table; all others (`ff`) continue on the next trigger.
    pub terminal: bool,
}

impl TableEntry {
    pub fn command(&self) -> Result<String, NovatechError> {
        check_channel(self.channel)?;
        if self.index > TABLE_LAST_INDEX {
            return Err(NovatechError::TableIndexOutOfRange {
                index: self.index,
                last: TABLE_LAST_INDEX,
            });
        }
        let flags = if self.terminal { "00" } else { "ff" };
        Ok(format!(
            "t{} {:04x} {:08x},{:04x},{:04x},{}",
            self.channel,
            self.index,
            frequency_word(self.mhz)?,
            self.phase,
            self.amplitude,
            flags
        ))
    }
}

fn check_channel(channel: usize) -> Result<(), NovatechError> {
    if channel >= NOVATECH_CHANNELS {
        return Err(NovatechError::InvalidChannel(channel));
    }
    Ok(())
}

pub struct Novatech409B<L: SerialLink> {
    link: Option<L>,
    reset_settle: Duration,
}

impl<L: SerialLink> Novatech409B<L> {
    pub fn new(link: L) -> Self {
        Self {
            link: Some(link),
            reset_settle: Duration::from_secs(1),
        }
    }

    pub fn simulated() -> Self {
        Self {
            link: None,
            reset_settle: Duration::ZERO,
        }
    }

    /// Time waited after a hardware reset before the device is set up again.
    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    pub fn is_simulation(&self) -> bool {
        self.link.is_none()
    }

    /// Releases the link. Dropping the driver does the same.
    pub fn close(mut self) -> Option<L> {
        self.link.take()
    }

    fn read_line(link: &mut L) -> Result<String, NovatechError> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if link.read(&mut byte)? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no reply from device",
                )
                .into());
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() > MAX_LINE_LEN {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "reply line too long",
                )
                .into());
            }
        }
        Ok(String::from_utf8_lossy(&line).trim_end().to_string())
    }

    fn write_line(link: &mut L, cmd: &str) -> Result<(), NovatechError> {
        link.clear_input()?;
        link.write_all(format!("{cmd}\r\n").as_bytes())?;
        link.flush()?;
        Ok(())
    }

    /// Sends one command. When `expect_response` is set the reply must be `OK`.
    pub fn send(&mut self, cmd: &str, expect_response: bool) -> Result<(), NovatechError> {
        let link = match self.link.as_mut() {
            Some(link) => link,
            None => {
                log::info!("Simulated send {cmd:?}");
                return Ok(());
            }
        };
        log::debug!("Send {cmd:?}");
        Self::write_line(link, cmd)?;
        if !expect_response {
            return Ok(());
        }
        let reply = Self::read_line(link)?;
        log::debug!("Reply {reply:?}");
        if reply != "OK" {
            return Err(NovatechError::UnexpectedResponse {
                description: describe_error_code(&reply).to_string(),
                code: reply,
            });
        }
        Ok(())
    }

    /// Hardware reset, then [`Novatech409B::setup`].
    pub fn reset(&mut self) -> Result<(), NovatechError> {
        self.send("R", false)?;
        if !self.is_simulation() {
            std::thread::sleep(self.reset_settle);
        }
        self.setup()
    }

    /// Echo off, phase-continuous mode, automatic updates.
    pub fn setup(&mut self) -> Result<(), NovatechError> {
        self.send("E d", false)?;
        self.set_phase_continuous(true)?;
        self.set_simultaneous_update(false)
    }

    pub fn save_state_to_eeprom(&mut self) -> Result<(), NovatechError> {
        self.send("S", true)
    }

    /// With `true`, the phase register is kept across frequency changes.
    pub fn set_phase_continuous(&mut self, continuous: bool) -> Result<(), NovatechError> {
        self.send(if continuous { "M n" } else { "M a" }, true)
    }

    /// With `true`, new values wait for [`Novatech409B::do_simultaneous_update`].
    pub fn set_simultaneous_update(&mut self, simultaneous: bool) -> Result<(), NovatechError> {
        self.send(if simultaneous { "I m" } else { "I a" }, true)
    }

    pub fn do_simultaneous_update(&mut self) -> Result<(), NovatechError> {
        self.send("I p", true)
    }

    pub fn set_freq(&mut self, channel: usize, mhz: f64) -> Result<(), NovatechError> {
        check_channel(channel)?;
        if !mhz.is_finite() || mhz < 0. {
            return Err(NovatechError::FrequencyOutOfRange { mhz });
        }
        self.send(&format!("F{channel} {mhz:.6}"), true)
    }

    /// `turns` in `[0, 1]` maps to the 14-bit phase word.
    pub fn set_phase(&mut self, channel: usize, turns: f64) -> Result<(), NovatechError> {
        check_channel(channel)?;
        let word = (turns * 16383.).round() as i64;
        self.send(&format!("P{channel} {word}"), true)
    }

    pub fn set_gain(&mut self, channel: usize, volts: f64) -> Result<(), NovatechError> {
        check_channel(channel)?;
        // The device accepts out-of-range values silently
        let dac = (volts / 0.51 * 1024.).floor();
        if !(0. ..=FULL_AMPLITUDE as f64).contains(&dac) {
            return Err(NovatechError::AmplitudeOutOfRange { volts });
        }
        self.send(&format!("V{channel} {}", dac as u16), true)
    }

    /// Enters table-define mode.
    pub fn table_mode_define(&mut self) -> Result<(), NovatechError> {
        self.send("m 0", false)
    }

    /// Arms the loaded table; each trigger edge steps to the next entry.
    pub fn table_mode_run(&mut self) -> Result<(), NovatechError> {
        self.send("m t", false)
    }

    pub fn program_table_entry(&mut self, entry: &TableEntry) -> Result<(), NovatechError> {
        let cmd = entry.command()?;
        self.send(&cmd, false)
    }

    /// Raw status: four channel lines followed by the device line.
    pub fn get_status(&mut self) -> Result<Vec<String>, NovatechError> {
        let link = match self.link.as_mut() {
            Some(link) => link,
            None => {
                let channel = "00989680 2000 01F5 0000 00000000 00000000 000301";
                let mut lines = vec![channel.to_string(); NOVATECH_CHANNELS];
                lines.push("80 BC0000 0000 0102 21".to_string());
                return Ok(lines);
            }
        };
        Self::write_line(link, "QUE")?;
        let lines = (0..6)
            .map(|_| Self::read_line(link))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("Device status {lines:?}");
        Ok(lines)
    }

    /// True if the device answers a status query with a supported firmware version.
    pub fn ping(&mut self) -> bool {
        let lines = match self.get_status() {
            Ok(lines) => lines,
            Err(err) => {
                log::warn!("Ping failed: {err}");
                return false;
            }
        };
        firmware_version(&lines).as_deref() == Some(FIRMWARE_VERSION)
    }
}

/// Extracts the firmware version from the device line of a status reply.
pub fn firmware_version(lines: &[String]) -> Option<String> {
    static STATUS_LINE: OnceLock<Regex> = OnceLock::new();
    let re = STATUS_LINE.get_or_init(|| {
        Regex::new(r"^[0-9A-Fa-f]{2} [0-9A-Fa-f]{6} [0-9A-Fa-f]{4} [0-9A-Fa-f]{4} ([0-9A-Fa-f]{2})$")
            .unwrap()
    });
    lines
        .iter()
        .find_map(|line| re.captures(line.trim()))
        .map(|caps| caps[1].to_string())
}
