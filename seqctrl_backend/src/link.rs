//! Byte transports for the synthesizer's line protocol.
//!
//! [`SerialLink`] is all the driver needs: a bidirectional byte stream that can drop unread
//! input. [`TtyLink`] opens a serial device at the 409B's fixed line settings (19200 baud, 8N1,
//! no flow control) and [`ScriptedLink`] answers commands in memory.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

pub trait SerialLink: Read + Write {
    /// Discards bytes received but not yet read.
    fn clear_input(&mut self) -> io::Result<()>;
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn clear_input(&mut self) -> io::Result<()> {
        (**self).clear_input()
    }
}

#[cfg(unix)]
pub use tty::TtyLink;

#[cfg(unix)]
mod tty {
    use std::fs::{File, OpenOptions};
    use std::io::{self, Read, Write};
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    use super::SerialLink;

    /// Read timeout in tenths of a second; a silent device ends a read with zero bytes.
    const READ_TIMEOUT_DECISECONDS: libc::cc_t = 10;

    fn check(ret: libc::c_int) -> io::Result<()> {
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// A serial device configured for the Novatech 409B.
    pub struct TtyLink {
        file: File,
        path: String,
    }

    impl TtyLink {
        pub fn open(path: &str) -> io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_NOCTTY)
                .open(path)?;
            let fd = file.as_raw_fd();
            unsafe {
                let mut tio: libc::termios = std::mem::zeroed();
                check(libc::tcgetattr(fd, &mut tio))?;
                libc::cfmakeraw(&mut tio);
                tio.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE | libc::CRTSCTS);
                tio.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;
                tio.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
                tio.c_cc[libc::VMIN] = 0;
                tio.c_cc[libc::VTIME] = READ_TIMEOUT_DECISECONDS;
                check(libc::cfsetispeed(&mut tio, libc::B19200))?;
                check(libc::cfsetospeed(&mut tio, libc::B19200))?;
                check(libc::tcsetattr(fd, libc::TCSANOW, &tio))?;
            }
            log::debug!("Opened serial link {path} at 19200 8N1");
            Ok(Self {
                file,
                path: path.to_string(),
            })
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Read for TtyLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.file.read(buf)
        }
    }

    impl Write for TtyLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.file.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl SerialLink for TtyLink {
        fn clear_input(&mut self) -> io::Result<()> {
            check(unsafe { libc::tcflush(self.file.as_raw_fd(), libc::TCIFLUSH) })
        }
    }

    impl Drop for TtyLink {
        fn drop(&mut self) {
            log::debug!("Closed serial link {}", self.path);
        }
    }
}

/// Shared record of the lines a [`ScriptedLink`] received, plus `"<closed>"` once it is dropped.
pub type Transcript = Rc<RefCell<Vec<String>>>;

/// In-memory device: every complete line written is passed to a responder, whose reply (if any)
/// becomes readable input.
pub struct ScriptedLink {
    responder: Box<dyn FnMut(&str) -> Option<String>>,
    pending: Vec<u8>,
    input: VecDeque<u8>,
    transcript: Transcript,
}

impl ScriptedLink {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Option<String> + 'static,
    {
        Self::with_transcript(responder, Transcript::default())
    }

    pub fn with_transcript<F>(responder: F, transcript: Transcript) -> Self
    where
        F: FnMut(&str) -> Option<String> + 'static,
    {
        Self {
            responder: Box::new(responder),
            pending: Vec::new(),
            input: VecDeque::new(),
            transcript,
        }
    }

    /// Replies `OK` to everything.
    pub fn accepting() -> Self {
        Self::new(|_| Some("OK".to_string()))
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    /// Queues bytes as if the device had sent them unprompted.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.input.len());
        for (dst, src) in buf.iter_mut().zip(self.input.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line).trim_end().to_string();
            if let Some(reply) = (self.responder)(&line) {
                self.input.extend(reply.as_bytes());
                self.input.extend(b"\r\n");
            }
            self.transcript.borrow_mut().push(line);
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for ScriptedLink {
    fn clear_input(&mut self) -> io::Result<()> {
        self.input.clear();
        Ok(())
    }
}

impl Drop for ScriptedLink {
    fn drop(&mut self) {
        self.transcript.borrow_mut().push("<closed>".to_string());
    }
}
