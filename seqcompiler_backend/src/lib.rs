//! Compiles a sequence of timed channel updates into a flat buffer of 32-bit output words for a
//! clocked multi-board digital/analog output, together with the programming table of a
//! four-channel frequency synthesizer whose row changes are triggered from the same buffer.
//!
//! - [`channel`]: name-to-address lookup built once from [`config`].
//! - [`encoder`]: pure (address, value) to codeword functions.
//! - [`timeline`]: the pre-sized output buffer and its write-once checks.
//! - [`synth`]: the synthesizer table and its trigger windows.
//! - [`sequencer`]: the state machine tying them together; start here.

#[cfg(feature = "python")]
use pyo3::prelude::*;

pub mod channel;
pub mod config;
pub mod encoder;
pub mod error;
#[cfg(feature = "python")]
pub mod python;
pub mod sequencer;
pub mod synth;
pub mod timeline;
pub mod utils;

pub use channel::*;
pub use config::*;
pub use encoder::*;
pub use error::*;
pub use sequencer::*;
pub use synth::*;
pub use timeline::*;
pub use utils::*;

#[cfg(feature = "python")]
#[pymodule]
fn seqcompiler_backend(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<python::PySequencer>()?;
    Ok(())
}
