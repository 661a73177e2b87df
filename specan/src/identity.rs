//! Identity and installed options of an analyzer.

use std::fmt;

use crate::SpecanError;

/// The parsed answer to `*IDN?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Manufacturer name.
    pub manufacturer: String,
    /// Model designation.
    pub model: String,
    /// Serial number.
    pub serial_number: String,
    /// Firmware version.
    pub firmware: String,
}

impl Identity {
    /// Parse a comma-separated `*IDN?` response with four fields.
    pub fn parse(resp: &str) -> Result<Self, SpecanError> {
        let fields: Vec<&str> = resp.trim().splitn(4, ',').map(str::trim).collect();
        match fields.as_slice() {
            [manufacturer, model, serial_number, firmware] => Ok(Identity {
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                serial_number: serial_number.to_string(),
                firmware: firmware.to_string(),
            }),
            _ => Err(SpecanError::protocol("*IDN?", resp)),
        }
    }

    /// Identity reported by simulated sessions.
    pub fn simulated() -> Self {
        Identity {
            manufacturer: "Simulated".to_string(),
            model: "Spectrum Analyzer".to_string(),
            serial_number: "000000".to_string(),
            firmware: "0.0".to_string(),
        }
    }

    /// Parse the `*OPT?` response into option names. `"0"` means no options are installed.
    pub fn parse_options(resp: &str) -> Vec<String> {
        resp.split(',')
            .map(str::trim)
            .filter(|opt| !opt.is_empty() && *opt != "0")
            .map(ToString::to_string)
            .collect()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (serial {}, firmware {})",
            self.manufacturer, self.model, self.serial_number, self.firmware
        )
    }
}
