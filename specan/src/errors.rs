//! Error types of the session core.

use std::{fmt, time::Duration};

use specan_io::InstrumentError;
use thiserror::Error;

/// One entry of the instrument's error queue, as returned by `SYST:ERR?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorQueueEntry {
    /// SCPI error code. Zero means "no error" and terminates the queue.
    pub code: i32,
    /// Error message without the surrounding quotes.
    pub message: String,
}

impl ErrorQueueEntry {
    /// Create a new entry.
    pub fn new(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    /// Parse a response of the form `-113,"Undefined header"`.
    pub fn parse(resp: &str) -> Result<Self, SpecanError> {
        let (code, message) = resp.split_once(',').unwrap_or((resp, ""));
        let code = code
            .trim()
            .parse::<i32>()
            .map_err(|_| SpecanError::protocol("SYST:ERR?", resp))?;
        let message = message.trim();
        let message = message
            .strip_prefix('"')
            .and_then(|m| m.strip_suffix('"'))
            .unwrap_or(message);
        Ok(Self::new(code, message))
    }

    /// The sentinel entry that marks an empty queue.
    pub fn is_no_error(&self) -> bool {
        self.code == 0
    }
}

impl fmt::Display for ErrorQueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},\"{}\"", self.code, self.message)
    }
}

/// Problems with the session itself rather than with the instrument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The session was closed and cannot be used anymore.
    #[error("Session is closed.")]
    Closed,
    /// Another caller panicked while holding the session lock.
    #[error("Session lock is poisoned, a previous caller panicked during an exchange.")]
    Poisoned,
    /// The session lock could not be obtained within the configured lock timeout.
    #[error("Could not obtain the session lock within {0:?}.")]
    LockTimeout(Duration),
}

/// The error enum of the session core.
///
/// The variants follow the failure taxonomy of the driver: caller errors are caught before any
/// I/O, protocol errors mean the instrument said something unexpected, timeouts and faults come
/// from the completion poller, and instrument status/fault errors from the status check.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpecanError {
    /// An argument was rejected before anything was sent to the instrument.
    #[error("{0}")]
    Parameter(String),
    /// The instrument's response to a command could not be interpreted.
    #[error("Unexpected response to '{command}': '{response}'")]
    Protocol {
        /// The command that was sent.
        command: String,
        /// The response that was received.
        response: String,
    },
    /// The operation-complete signal was not observed in time.
    #[error("Operation did not complete within {timeout:?}, gave up after {elapsed:?}.")]
    Timeout {
        /// Time spent polling.
        elapsed: Duration,
        /// The completion timeout that was configured.
        timeout: Duration,
    },
    /// The error-queue bit came up while waiting for completion. The error queue has not been
    /// read yet.
    #[error(
        "Instrument reported an error after {elapsed:?} while waiting for completion (status byte {status_byte:#04x})."
    )]
    Faulted {
        /// The summary status byte that showed the error.
        status_byte: u8,
        /// Time spent polling until the error showed up.
        elapsed: Duration,
    },
    /// The status byte shows pending errors, but the error queue was not read.
    #[error("Instrument status reports an error (status byte {status_byte:#04x}).")]
    InstrumentStatus {
        /// The summary status byte that showed the error.
        status_byte: u8,
    },
    /// One or more errors drained from the instrument's error queue, oldest first.
    #[error("Instrument reported: {}", join_entries(.0))]
    InstrumentFault(Vec<ErrorQueueEntry>),
    /// Session lifecycle or locking problem.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Error of the underlying transport.
    #[error(transparent)]
    Transport(#[from] InstrumentError),
}

impl SpecanError {
    pub(crate) fn protocol(command: &str, response: &str) -> Self {
        SpecanError::Protocol {
            command: command.to_string(),
            response: response.to_string(),
        }
    }

    /// The drained error queue entries if this is an [`SpecanError::InstrumentFault`].
    pub fn fault_entries(&self) -> Option<&[ErrorQueueEntry]> {
        match self {
            SpecanError::InstrumentFault(entries) => Some(entries),
            _ => None,
        }
    }
}

fn join_entries(entries: &[ErrorQueueEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        let entry = ErrorQueueEntry::parse("-113,\"Undefined header;FREQ:CENTX\"").unwrap();
        assert_eq!(entry, ErrorQueueEntry::new(-113, "Undefined header;FREQ:CENTX"));
        assert!(!entry.is_no_error());
    }

    #[test]
    fn test_parse_entry_message_with_comma() {
        let entry = ErrorQueueEntry::parse("-222,\"Data out of range, 40 GHz\"").unwrap();
        assert_eq!(entry.message, "Data out of range, 40 GHz");
    }

    #[test]
    fn test_parse_no_error() {
        assert!(ErrorQueueEntry::parse("0,\"No error\"").unwrap().is_no_error());
        assert!(ErrorQueueEntry::parse("+0").unwrap().is_no_error());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            ErrorQueueEntry::parse("No error"),
            Err(SpecanError::Protocol { .. })
        ));
    }

    #[test]
    fn test_fault_message_lists_all_entries() {
        let err = SpecanError::InstrumentFault(vec![
            ErrorQueueEntry::new(-222, "Data out of range"),
            ErrorQueueEntry::new(-113, "Undefined header"),
        ]);
        assert_eq!(
            err.to_string(),
            "Instrument reported: -222,\"Data out of range\"; -113,\"Undefined header\""
        );
        assert_eq!(err.fault_entries().map(<[_]>::len), Some(2));
    }
}
