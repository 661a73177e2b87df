//! Blocking serial connection using the [`serialport`] crate.

use serialport::{SerialPort, SerialPortBuilder};

use crate::{DEFAULT_TIMEOUT, Instrument, InstrumentError};

/// Constructors for an [`Instrument`] over a serial port.
#[derive(Debug)]
pub struct SerialInterface {}

impl SerialInterface {
    /// Open a serial port with a given baud rate, 8N1, and the default timeout of three seconds.
    ///
    /// # Arguments
    /// * `port` - The name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM3"`.
    /// * `baud_rate` - The baud rate configured on the instrument.
    pub fn simple(
        port: &str,
        baud_rate: u32,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        Self::full(serialport::new(port, baud_rate).timeout(DEFAULT_TIMEOUT))
    }

    /// Open a serial port from a fully configured [`SerialPortBuilder`].
    pub fn full(spb: SerialPortBuilder) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let port = spb.open()?;
        let timeout = port.timeout();
        Ok(Instrument::new(port, timeout).with_port_timeout(|port, timeout| {
            port.set_timeout(timeout).map_err(std::io::Error::from)
        }))
    }
}
