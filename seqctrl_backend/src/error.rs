use thiserror::Error;

/// Failures talking to the Novatech 409B.
#[derive(Debug, Error)]
pub enum NovatechError {
    #[error("Serial link error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erroneous reply from device: {code}, {description}")]
    UnexpectedResponse { code: String, description: String },

    #[error("Channel {0} does not exist, the 409B has channels 0 to 3")]
    InvalidChannel(usize),

    #[error("Frequency {mhz} MHz does not fit a 32-bit frequency word")]
    FrequencyOutOfRange { mhz: f64 },

    #[error("Amplitude out of range {volts}")]
    AmplitudeOutOfRange { volts: f64 },

    #[error("Table index {index} is beyond the last table entry {last}")]
    TableIndexOutOfRange { index: usize, last: usize },
}

/// Failures of an execution backend. Resources held by the backend are released before any of
/// these reaches the caller.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Synthesizer programming failed: {0}")]
    Synth(#[from] NovatechError),

    #[error("DAQmx error {code}: {message}")]
    Daq { code: i32, message: String },

    #[error("Clocked output did not finish within {timeout} s")]
    Timeout { timeout: f64 },
}
