//! specan_io: blocking transport for SCPI spectrum analyzers
//!
//! This crate provides the transport layer that the `specan` session core is built on. It
//! defines the [`InstrumentInterface`] trait and its implementations, as well as the
//! [`InstrumentError`] type that every transport returns.
//!
//! # Provided interfaces
//! - [`Instrument`]: a generic implementation over any [`std::io::Read`] + [`std::io::Write`]
//!   port.
//! - [`TcpIpInterface`]: raw socket connection (port 5025 on most analyzers).
//! - `SerialInterface`: serial port via the [`serialport`] crate (feature `serial`).
//! - [`LoopbackInterface`]: a scripted interface for testing drivers without hardware.
//!
//! # Protocol shape
//!
//! Every interaction is "write one ASCII line, then read exactly one response". The only
//! exception is the status byte, which [`InstrumentInterface::read_status_byte`] can read at any
//! time between exchanges, and length-prefixed binary blocks, which are read with
//! [`InstrumentInterface::read_binary_block`].
//!
//! # License
//!
//! Licensed under either of
//!
//! - Apache License, Version 2.0 ([LICENSE-APACHE](http://www.apache.org/licenses/LICENSE-2.0))
//! - MIT license ([LICENSE-MIT](http://opensource.org/licenses/MIT))
//!
//! at your option.

#![warn(missing_docs)]

mod block;
mod instrument;
mod loopback;
#[cfg(feature = "serial")]
mod serial;
mod tcp_ip;

pub use block::{encode_block, parse_block_header};
pub use instrument::Instrument;
pub use loopback::LoopbackInterface;
#[cfg(feature = "serial")]
pub use serial::SerialInterface;
pub use tcp_ip::TcpIpInterface;

use std::time::{Duration, Instant};

use log::{debug, trace};
use thiserror::Error;

/// The default timeout for reading a response from the instrument.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Largest binary block accepted from an instrument, in bytes.
pub const MAX_BLOCK_LEN: usize = 64 * 1024 * 1024;

/// The error enum for all transports.
///
/// Every sending or querying function returns either its result or this error, so that failures
/// propagate with the `?` operator. Driver crates wrap it into their own error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstrumentError {
    /// The called command is not supported by this interface.
    #[error("This command is not supported by this interface.")]
    InterfaceCommandNotSupported,
    /// A binary block announced by the instrument is malformed. Contains a description of what was
    /// wrong with the header.
    #[error("Invalid binary block from instrument: {0}")]
    InvalidBinaryBlock(String),
    /// Error when reading from/writing to an interface. See [`std::io::Error`] for more details.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Instrument response could not be parsed because it was unexpected. Contains the response
    /// that was received from the instrument.
    #[error("Response from instrument could not be parsed. Response was: {0}")]
    ResponseParseError(String),
    #[cfg(feature = "serial")]
    /// Serial port errors can occur when opening a serial interface. See the [`serialport::Error`]
    /// documentation for more information.
    #[error(transparent)]
    Serialport(#[from] serialport::Error),
    /// Timeout occurred while waiting for data from the instrument.
    #[error(
        "Timeout occured while waiting for a response from the instrument. Timeout was set to {0:?}."
    )]
    Timeout(Duration),
    /// Timeout occurred while waiting for a response to a query.
    #[error(
        "Timeout occured while waiting for a response to query: {query}. Timeout was set to {timeout:?}."
    )]
    TimeoutQuery {
        /// The query that timed out.
        query: String,
        /// The timeout that was set.
        timeout: Duration,
    },
}

/// The `InstrumentInterface` trait defines a blocking connection to one instrument.
///
/// Implementors only have to provide [`read_exact`](InstrumentInterface::read_exact) and
/// [`write_raw`](InstrumentInterface::write_raw). Everything else, i.e., line framing, queries,
/// the status byte, and binary blocks, is built on top of these two with default
/// implementations that an interface can override if it has a native primitive for it (e.g., a
/// serial poll for the status byte).
pub trait InstrumentInterface {
    /// Read exactly `buf.len()` bytes from the instrument.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError>;

    /// Write all bytes to the instrument and flush.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError>;

    /// Get the terminator that ends every command and response line.
    fn get_terminator(&self) -> &str {
        "\n"
    }

    /// Set the terminator of the interface.
    fn set_terminator(&mut self, _terminator: &str) {}

    /// Get the transport-level read timeout.
    fn get_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Set the transport-level read timeout.
    fn set_timeout(&mut self, _timeout: Duration) -> Result<(), InstrumentError> {
        Err(InstrumentError::InterfaceCommandNotSupported)
    }

    /// Send a command to the instrument.
    ///
    /// The terminator is appended to the command before it is written.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        debug!("-> {cmd}");
        let line = format!("{cmd}{}", self.get_terminator());
        self.write_raw(line.as_bytes())
    }

    /// Read one response line from the instrument.
    ///
    /// Reads byte by byte until the response ends with the terminator, which is stripped together
    /// with surrounding whitespace. Non-UTF-8 bytes are replaced. If no terminator is seen before
    /// the timeout passes, [`InstrumentError::Timeout`] is returned.
    fn read_until_terminator(&mut self) -> Result<String, InstrumentError> {
        let terminator = self.get_terminator().to_string();
        let timeout = self.get_timeout();
        let mut response: Vec<u8> = Vec::new();
        let mut single_buf = [0u8];

        let tic = Instant::now();
        loop {
            if tic.elapsed() > timeout {
                return Err(InstrumentError::Timeout(timeout));
            }
            self.read_exact(&mut single_buf)?;
            response.push(single_buf[0]);
            if response.ends_with(terminator.as_bytes()) {
                break;
            }
        }
        response.truncate(response.len() - terminator.len());
        let line = String::from_utf8_lossy(&response).trim().to_string();
        debug!("<- {line}");
        Ok(line)
    }

    /// Query the instrument with a command and return the response line.
    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        self.sendcmd(cmd)?;
        self.read_until_terminator().map_err(|err| match err {
            InstrumentError::Timeout(timeout) => InstrumentError::TimeoutQuery {
                query: cmd.to_string(),
                timeout,
            },
            other => other,
        })
    }

    /// Read the 8-bit summary status byte.
    ///
    /// Interfaces without a native serial poll fall back to the `*STB?` query, which does not
    /// disturb the pairing of other commands and responses.
    fn read_status_byte(&mut self) -> Result<u8, InstrumentError> {
        let resp = self.query("*STB?")?;
        let stb = resp
            .trim()
            .parse::<u8>()
            .map_err(|_| InstrumentError::ResponseParseError(resp.clone()))?;
        trace!("status byte {stb:#04x}");
        Ok(stb)
    }

    /// Read an IEEE 488.2 binary block that the instrument is about to send.
    ///
    /// A definite block looks like `#<n><len><data>` where the digit `n` announces how many
    /// digits `len` has, followed by exactly `len` data bytes. The indefinite form `#0<data>`
    /// runs until the terminator. The trailing terminator after a definite block is consumed as
    /// well. Blocks longer than [`MAX_BLOCK_LEN`] are rejected before their data is read.
    fn read_binary_block(&mut self) -> Result<Vec<u8>, InstrumentError> {
        let mut header = [0u8; 2];
        self.read_exact(&mut header)?;
        let num_digits = parse_block_header(header)?;

        if num_digits == 0 {
            let terminator = self.get_terminator().as_bytes().to_vec();
            let mut data = Vec::new();
            let mut single_buf = [0u8];
            while !data.ends_with(&terminator) {
                if data.len() > MAX_BLOCK_LEN + terminator.len() {
                    return Err(InstrumentError::InvalidBinaryBlock(format!(
                        "indefinite block exceeds {MAX_BLOCK_LEN} bytes"
                    )));
                }
                self.read_exact(&mut single_buf)?;
                data.push(single_buf[0]);
            }
            data.truncate(data.len() - terminator.len());
            return Ok(data);
        }

        let mut len_digits = vec![0u8; num_digits];
        self.read_exact(&mut len_digits)?;
        let len = std::str::from_utf8(&len_digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| {
                InstrumentError::InvalidBinaryBlock(format!(
                    "length field {len_digits:?} is not a decimal number"
                ))
            })?;
        if len > MAX_BLOCK_LEN {
            return Err(InstrumentError::InvalidBinaryBlock(format!(
                "announced length {len} exceeds {MAX_BLOCK_LEN} bytes"
            )));
        }

        let mut data = vec![0u8; len];
        self.read_exact(&mut data)?;

        let mut trailer = vec![0u8; self.get_terminator().len()];
        self.read_exact(&mut trailer)?;
        debug!("<- binary block of {len} bytes");
        Ok(data)
    }

    /// Flush pending input/output and put the interface back into a known state.
    ///
    /// Interfaces that support a device clear should send it here.
    fn clear(&mut self) -> Result<(), InstrumentError> {
        Ok(())
    }
}
