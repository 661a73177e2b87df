//! Generic blocking implementation of the [`InstrumentInterface`] trait.
//!
//! It can be used with any port that implements [`std::io::Read`] and [`std::io::Write`], such as
//! [`std::net::TcpStream`] or a serial port.

use std::{
    io::{ErrorKind, Read, Write},
    time::Duration,
};

use log::warn;

use crate::{InstrumentError, InstrumentInterface};

/// A general instrument interface over any port that implements [`Read`] and [`Write`].
///
/// The terminator defaults to `"\n"`, which is what SCPI analyzers expect on raw sockets and
/// serial lines.
///
/// # Example
///
/// ```no_run
/// use std::{net::TcpStream, time::Duration};
///
/// use specan_io::Instrument;
///
/// let stream = TcpStream::connect("192.168.10.1:5025").unwrap();
/// let interface = Instrument::new(stream, Duration::from_secs(3));
/// ```
pub struct Instrument<P: Read + Write> {
    port: P,
    terminator: String,
    timeout: Duration,
    on_timeout_change: Option<fn(&mut P, Duration) -> std::io::Result<()>>,
}

impl<P: Read + Write> Instrument<P> {
    /// Create a new [`Instrument`] from a port and a read timeout.
    pub fn new(port: P, timeout: Duration) -> Self {
        Self {
            port,
            terminator: "\n".to_string(),
            timeout,
            on_timeout_change: None,
        }
    }

    /// Register a function that applies a new timeout to the underlying port.
    ///
    /// Without it, [`InstrumentInterface::set_timeout`] only changes the timeout used for framing
    /// responses, not the one of the port itself.
    pub fn with_port_timeout(mut self, apply: fn(&mut P, Duration) -> std::io::Result<()>) -> Self {
        self.on_timeout_change = Some(apply);
        self
    }

    /// Consume the interface and return the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }
}

impl<P: Read + Write> InstrumentInterface for Instrument<P> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        self.port.read_exact(buf).map_err(|err| match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::UnexpectedEof => {
                InstrumentError::Timeout(self.timeout)
            }
            _ => InstrumentError::Io(err),
        })
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), InstrumentError> {
        if let Some(apply) = self.on_timeout_change {
            apply(&mut self.port, timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), InstrumentError> {
        if let Err(err) = self.port.flush() {
            warn!("flushing the port failed: {err}");
            return Err(err.into());
        }
        Ok(())
    }
}
