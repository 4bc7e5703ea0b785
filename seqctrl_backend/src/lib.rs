//! Plays programs compiled by [`seqcompiler_backend`].
//!
//! - [`backend`]: the [`ExecutionBackend`] trait with a simulation sink and a hardware sink.
//! - [`novatech`]: serial driver for the Novatech 409B synthesizer over a [`link::SerialLink`].
//! - `nidaqmx`: NI-DAQmx clocked output, built with the `nidaqmx` feature since it links the
//!   vendor C library.

pub mod backend;
pub mod error;
pub mod link;
#[cfg(feature = "nidaqmx")]
pub mod nidaqmx;
pub mod novatech;

pub use crate::backend::*;
pub use crate::error::*;
pub use crate::link::*;
#[cfg(feature = "nidaqmx")]
pub use crate::nidaqmx::{NiOutput, NiTask};
pub use crate::novatech::*;
