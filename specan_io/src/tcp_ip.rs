//! Blocking TCP/IP connection to an analyzer's raw SCPI socket.

use std::{
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use crate::{DEFAULT_TIMEOUT, Instrument, InstrumentError};

/// Constructors for an [`Instrument`] over a [`TcpStream`].
#[derive(Debug)]
pub struct TcpIpInterface {}

impl TcpIpInterface {
    /// Connect to the given socket address with the default timeout of three seconds.
    ///
    /// Spectrum analyzers usually listen on port 5025 for raw SCPI. The read and write timeouts
    /// of the stream are set as well, as we never want to block forever on an instrument.
    ///
    /// # Arguments
    /// * `sock_addr` - Socket address, e.g., `"192.168.10.1:5025"`.
    pub fn simple<A: ToSocketAddrs>(sock_addr: A) -> Result<Instrument<TcpStream>, InstrumentError> {
        Self::full(sock_addr, DEFAULT_TIMEOUT)
    }

    /// Connect to the given socket address with a given timeout.
    pub fn full<A: ToSocketAddrs>(
        sock_addr: A,
        timeout: Duration,
    ) -> Result<Instrument<TcpStream>, InstrumentError> {
        let stream = TcpStream::connect(sock_addr)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_read_timeout(Some(timeout))?;
        Ok(Instrument::new(stream, timeout).with_port_timeout(|stream, timeout| {
            stream.set_write_timeout(Some(timeout))?;
            stream.set_read_timeout(Some(timeout))
        }))
    }
}
