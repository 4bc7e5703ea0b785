//! Python surface of the compiler, built with the `python` feature.
//!
//! ```python
//! from seqcompiler_backend import Sequencer
//!
//! seq = Sequencer.from_file("settings.toml")
//! seq.update(20e-3, {"coil_sum": 2.5}, {"shutter": 1}, {"cooling_freq": 80.0})
//! waveform = seq.waveform()      # numpy uint32 array, filled portion
//! table = seq.synth_table()      # numpy float64 array, shape (rows, 4)
//! ```
//!
//! Contract violations are raised as `ValueError`.

use numpy::{PyArray1, PyArray2, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::sync::Arc;

use crate::config::Settings;
use crate::sequencer::{Sequencer, Update};

fn value_error<E: std::fmt::Display>(err: E) -> PyErr {
    PyValueError::new_err(err.to_string())
}

#[pyclass(name = "Sequencer")]
pub struct PySequencer {
    seq: Sequencer,
}

impl PySequencer {
    fn from_settings(settings: Settings) -> PyResult<Self> {
        let channels = settings.channel_map().map_err(value_error)?;
        let seq = Sequencer::new(Arc::new(channels), settings.sequencer_config())
            .map_err(value_error)?;
        Ok(Self { seq })
    }
}

#[pymethods]
impl PySequencer {
    #[staticmethod]
    pub fn from_file(path: &str) -> PyResult<Self> {
        Self::from_settings(Settings::from_file(path).map_err(value_error)?)
    }

    #[staticmethod]
    pub fn from_toml(text: &str) -> PyResult<Self> {
        Self::from_settings(Settings::from_toml_str(text).map_err(value_error)?)
    }

    /// Dictionaries keep their insertion order, which decides the analog word layout.
    #[pyo3(signature = (duration, analog=None, digital=None, synth=None))]
    pub fn update(
        &mut self,
        duration: f64,
        analog: Option<&PyDict>,
        digital: Option<&PyDict>,
        synth: Option<&PyDict>,
    ) -> PyResult<usize> {
        let mut update = Update::new(duration);
        if let Some(analog) = analog {
            for (name, value) in analog.iter() {
                update = update.analog(name.extract()?, value.extract()?);
            }
        }
        if let Some(digital) = digital {
            for (name, value) in digital.iter() {
                // Accept 0/1 as well as booleans
                let high = match value.extract::<bool>() {
                    Ok(high) => high,
                    Err(_) => value.extract::<f64>()? != 0.,
                };
                update = update.digital(name.extract()?, high);
            }
        }
        if let Some(synth) = synth {
            for (name, value) in synth.iter() {
                update = update.synth(name.extract()?, value.extract()?);
            }
        }
        self.seq.apply(&update).map_err(value_error)
    }

    #[getter]
    pub fn runtime(&self) -> f64 {
        self.seq.runtime()
    }

    #[getter]
    pub fn step(&self) -> usize {
        self.seq.step()
    }

    #[getter]
    pub fn row_count(&self) -> usize {
        self.seq.row_count()
    }

    pub fn waveform<'py>(&self, py: Python<'py>) -> &'py PyArray1<u32> {
        self.seq.words().to_pyarray(py)
    }

    pub fn synth_table<'py>(&self, py: Python<'py>) -> &'py PyArray2<f64> {
        self.seq.synth_rows().to_pyarray(py)
    }
}
