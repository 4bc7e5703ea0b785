//! Minimal Rust wrapper for the parts of the NI-DAQmx C library needed to play a timeline.
//!
//! ## Overview
//!
//! [`NiTask`] owns a DAQmx task handle and maps its methods to DAQmx C-functions. [`NiOutput`]
//! builds on it to implement [`ClockedOutput`]: one digital output channel spanning the 32
//! lines of four 8-line ports, a finite sample clock, and a blocking wait for completion.
//!
//! Every C call goes through [`daqmx_call`], which turns a negative status into
//! [`BackendError::Daq`] (or [`BackendError::Timeout`] for an unfinished wait) and appends the
//! extended error message to `nidaqmx_error.logs` in the working directory of the calling shell.
//!
//! ## Cleanup
//!
//! `NiTask` implements `Drop`, so the task is cleared on every exit path, including errors.
//!
//! ## Example
//!
//! ```ignore
//! # use seqctrl_backend::*;
//! let mut output = NiOutput::new("Dev1");
//! output.play(&[0, 1 << 30, 0], 1e6, 1.1)?;
//! ```
//!
//! See the [NI-DAQmx C Reference](https://www.ni.com/docs/en-US/bundle/ni-daqmx-c-api-ref/page/cdaqmx/help_file_title.html).

use libc;
use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::Write;

use seqcompiler_backend::Word;

use crate::backend::ClockedOutput;
use crate::error::BackendError;

type CConstStr = *const libc::c_char;
type CCharBuf = *mut libc::c_char;
type CFloat64 = libc::c_double;
type CUint32 = libc::c_uint;
type CUint64 = libc::c_ulonglong;
type CBool32 = libc::c_uint;
type CInt32 = libc::c_int;
pub type TaskHandle = *mut libc::c_void;

pub const DAQMX_VAL_RISING: CInt32 = 10280;
pub const DAQMX_VAL_FINITESAMPS: CInt32 = 10178;
pub const DAQMX_VAL_GROUPBYCHANNEL: CBool32 = 0;
pub const DAQMX_VAL_CHANFORALLLINES: CInt32 = 1;
/// Status of `DAQmxWaitUntilTaskDone` when the task is still running at the timeout.
pub const DAQMX_ERROR_WAIT_UNTIL_DONE_TIMEOUT: CInt32 = -200560;

const ERROR_LOG: &str = "./nidaqmx_error.logs";

#[link(name = "NIDAQmx")]
extern "C" {
    fn DAQmxResetDevice(name: CConstStr) -> CInt32;
    fn DAQmxGetExtendedErrorInfo(errorString: CCharBuf, bufferSize: CUint32) -> CInt32;

    fn DAQmxCreateTask(taskName: CConstStr, taskHandle_ptr: &mut TaskHandle) -> CInt32;
    fn DAQmxStartTask(handle: TaskHandle) -> CInt32;
    fn DAQmxStopTask(handle: TaskHandle) -> CInt32;
    fn DAQmxClearTask(handle: TaskHandle) -> CInt32;
    fn DAQmxWaitUntilTaskDone(handle: TaskHandle, timeToWait: CFloat64) -> CInt32;

    fn DAQmxCfgSampClkTiming(
        handle: TaskHandle,
        src: CConstStr,
        rate: CFloat64,
        activeEdge: CInt32,
        sampleMode: CInt32,
        sampsPerChan: CUint64,
    ) -> CInt32;
    fn DAQmxCreateDOChan(
        handle: TaskHandle,
        lines: CConstStr,
        name: CConstStr,
        lineGrouping: CInt32,
    ) -> CInt32;
    fn DAQmxWriteDigitalU32(
        handle: TaskHandle,
        seqLen: CInt32,
        autoStart: CBool32,
        timeout: CFloat64,
        dataLayout: CBool32,
        writeArray: *const u32,
        sampsPerChanWritten: *mut CInt32,
        reserved: *mut CBool32,
    ) -> CInt32;
}

fn c_string(value: &str) -> Result<CString, BackendError> {
    CString::new(value).map_err(|_| BackendError::Daq {
        code: 0,
        message: format!("{value:?} contains a NUL byte"),
    })
}

fn log_error(message: &str) {
    let appended = OpenOptions::new()
        .append(true)
        .create(true)
        .open(ERROR_LOG)
        .and_then(|mut file| writeln!(file, "DAQmx Error: {message}"));
    if let Err(err) = appended {
        log::warn!("Could not append to {ERROR_LOG}: {err}");
    }
}

/// Calls a DAQmx C-function and converts a negative status into an error.
///
/// The extended error message is fetched with `DAQmxGetExtendedErrorInfo`, logged, and appended
/// to `nidaqmx_error.logs`.
pub fn daqmx_call<F: FnOnce() -> CInt32>(func: F) -> Result<(), BackendError> {
    let code = func();
    if code >= 0 {
        return Ok(());
    }
    let mut err_buff = [0 as libc::c_char; 2048];
    let message = unsafe {
        DAQmxGetExtendedErrorInfo(err_buff.as_mut_ptr(), err_buff.len() as CUint32);
        std::ffi::CStr::from_ptr(err_buff.as_ptr())
    }
    .to_string_lossy()
    .into_owned();
    log::error!("DAQmx error {code}: {message}");
    log_error(&message);
    Err(BackendError::Daq { code, message })
}

/// Resets a device, e.g. `reset_ni_device("Dev1")`.
pub fn reset_ni_device(name: &str) -> Result<(), BackendError> {
    let name = c_string(name)?;
    daqmx_call(|| unsafe { DAQmxResetDevice(name.as_ptr()) })
}

/// An NI-DAQmx task. Creating an instance creates the task; dropping it clears the task.
pub struct NiTask {
    handle: TaskHandle,
}

impl NiTask {
    pub fn new() -> Result<Self, BackendError> {
        let mut handle: TaskHandle = std::ptr::null_mut();
        let name = c_string("")?;
        daqmx_call(|| unsafe { DAQmxCreateTask(name.as_ptr(), &mut handle) })?;
        Ok(Self { handle })
    }

    pub fn start(&self) -> Result<(), BackendError> {
        daqmx_call(|| unsafe { DAQmxStartTask(self.handle) })
    }
    pub fn stop(&self) -> Result<(), BackendError> {
        daqmx_call(|| unsafe { DAQmxStopTask(self.handle) })
    }

    pub fn wait_until_done(&self, timeout: f64) -> Result<(), BackendError> {
        daqmx_call(|| unsafe { DAQmxWaitUntilTaskDone(self.handle, timeout as CFloat64) })
            .map_err(|err| match err {
                BackendError::Daq { code, .. } if code == DAQMX_ERROR_WAIT_UNTIL_DONE_TIMEOUT => {
                    BackendError::Timeout { timeout }
                }
                other => other,
            })
    }

    pub fn cfg_sample_clk(
        &self,
        clk_src: &str,
        samp_rate: f64,
        seq_len: u64,
    ) -> Result<(), BackendError> {
        let src = c_string(clk_src)?;
        daqmx_call(|| unsafe {
            DAQmxCfgSampClkTiming(
                self.handle,
                src.as_ptr(),
                samp_rate as CFloat64,
                DAQMX_VAL_RISING,
                DAQMX_VAL_FINITESAMPS,
                seq_len as CUint64,
            )
        })
    }

    /// One channel over all `lines`, sampled as a single word.
    pub fn create_do_chan(&self, lines: &str) -> Result<(), BackendError> {
        let lines = c_string(lines)?;
        let assigned = c_string("")?;
        daqmx_call(|| unsafe {
            DAQmxCreateDOChan(
                self.handle,
                lines.as_ptr(),
                assigned.as_ptr(),
                DAQMX_VAL_CHANFORALLLINES,
            )
        })
    }

    /// Writes one word per sample to the single digital channel without starting the task.
    pub fn write_digital_u32(&self, samples: &[u32], timeout: f64) -> Result<usize, BackendError> {
        let mut nwritten: CInt32 = 0;
        daqmx_call(|| unsafe {
            DAQmxWriteDigitalU32(
                self.handle,
                samples.len() as CInt32,
                false as CBool32,
                timeout as CFloat64,
                DAQMX_VAL_GROUPBYCHANNEL,
                samples.as_ptr(),
                &mut nwritten as *mut CInt32,
                std::ptr::null_mut(),
            )
        })?;
        Ok(nwritten as usize)
    }

    fn clear(&self) -> Result<(), BackendError> {
        daqmx_call(|| unsafe { DAQmxClearTask(self.handle) })
    }
}

impl Drop for NiTask {
    fn drop(&mut self) {
        if self.clear().is_err() {
            log::warn!("Failed to clear DAQmx task");
        }
    }
}

/// Physical lines of the output word: bit `8 * p + l` drives `port{p}/line{l}`.
pub fn port_lines(device: &str) -> String {
    (0..4)
        .map(|port| format!("{device}/port{port}/line0:7"))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`ClockedOutput`] on the 32 digital lines of one NI device.
pub struct NiOutput {
    device: String,
}

impl NiOutput {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
        }
    }

    pub fn reset(&self) -> Result<(), BackendError> {
        reset_ni_device(&self.device)
    }
}

impl ClockedOutput for NiOutput {
    fn play(
        &mut self,
        samples: &[Word],
        clock_rate: f64,
        timeout: f64,
    ) -> Result<(), BackendError> {
        let task = NiTask::new()?;
        task.create_do_chan(&port_lines(&self.device))?;
        task.cfg_sample_clk("", clock_rate, samples.len() as u64)?;
        let written = task.write_digital_u32(samples, timeout)?;
        log::debug!("Wrote {written} samples to {}", self.device);
        task.start()?;
        task.wait_until_done(timeout)?;
        task.stop()
    }
}
