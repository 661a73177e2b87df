//! A scripted loopback interface for testing drivers without hardware.
//!
//! The [`LoopbackInterface`] holds an ordered script of exchanges. Every write must match the next
//! scripted command, and every read is served from the response scripted for it. This way a test
//! pins down the exact conversation a driver has with the instrument, including the order of
//! commands and status polls.

use std::{collections::VecDeque, fmt, thread, time::Duration};

use crate::{InstrumentError, InstrumentInterface, block::encode_block};

/// One scripted step of a conversation.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// A command from host to instrument that produces no response.
    Write(String),
    /// A command from host to instrument followed by a response line.
    Query(String, String),
    /// A command from host to instrument followed by a binary block.
    Block(String, Vec<u8>),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Write(cmd) => write!(f, "write '{cmd}'"),
            Step::Query(cmd, resp) => write!(f, "query '{cmd}' -> '{resp}'"),
            Step::Block(cmd, data) => write!(f, "block '{cmd}' -> {} bytes", data.len()),
        }
    }
}

/// An interface that replays a scripted conversation.
///
/// # Example
///
/// A driver that asks for the identity of the instrument and a test for it:
///
/// ```
/// use specan_io::{InstrumentError, InstrumentInterface, LoopbackInterface};
///
/// fn identity<T: InstrumentInterface>(intf: &mut T) -> Result<String, InstrumentError> {
///     intf.query("*IDN?")
/// }
///
/// let mut lbk = LoopbackInterface::new("\n")
///     .expect_query("*IDN?", "Acme,SA-26,100123,1.2.3");
/// assert_eq!(identity(&mut lbk).unwrap(), "Acme,SA-26,100123,1.2.3");
/// // Dropping `lbk` with unused steps left would panic.
/// ```
///
/// Writing a command that is not the next one in the script panics, and so does dropping the
/// interface while steps are left over. The latter check is skipped if the thread is already
/// panicking, such that the original failure is reported.
#[derive(Debug)]
pub struct LoopbackInterface {
    steps: VecDeque<Step>,
    pending: VecDeque<u8>,
    terminator_exp: String,
    terminator: String,
    timeout: Duration,
}

impl LoopbackInterface {
    /// Create an empty script.
    ///
    /// # Arguments
    /// * `terminator_exp` - The terminator the driver under test is expected to use.
    pub fn new(terminator_exp: &str) -> Self {
        LoopbackInterface {
            steps: VecDeque::new(),
            pending: VecDeque::new(),
            terminator_exp: terminator_exp.to_string(),
            terminator: "\n".to_string(),
            timeout: crate::DEFAULT_TIMEOUT,
        }
    }

    /// Append a command that the host writes without expecting a response.
    pub fn expect_write(mut self, cmd: &str) -> Self {
        self.steps.push_back(Step::Write(cmd.to_string()));
        self
    }

    /// Append a query and the line the instrument answers with.
    pub fn expect_query(mut self, cmd: &str, resp: &str) -> Self {
        self.steps
            .push_back(Step::Query(cmd.to_string(), resp.to_string()));
        self
    }

    /// Append a query that the instrument answers with a definite-length binary block.
    pub fn expect_block(mut self, cmd: &str, data: &[u8]) -> Self {
        self.steps
            .push_back(Step::Block(cmd.to_string(), data.to_vec()));
        self
    }

    /// Append a number of status byte polls that all return the same value.
    pub fn expect_status_polls(mut self, count: usize, stb: u8) -> Self {
        for _ in 0..count {
            self = self.expect_query("*STB?", &stb.to_string());
        }
        self
    }

    /// Append all steps of another script after the steps of this one.
    pub fn append(mut self, mut other: LoopbackInterface) -> Self {
        self.steps.append(&mut other.steps);
        self
    }

    /// Number of scripted steps that have not been used yet.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// Panic if scripted steps or unread response bytes are left.
    ///
    /// It is called automatically on drop, but can also be called manually.
    pub fn finalize(&mut self) {
        if let Some(step) = self.steps.front() {
            panic!("Leftover expected step in loopback script: {step}");
        }
        if !self.pending.is_empty() {
            panic!(
                "Leftover response bytes from instrument to host: {:?}",
                String::from_utf8_lossy(self.pending.make_contiguous())
            );
        }
    }

    /// Assert that the driver configured the expected terminator.
    pub fn test_terminator(&self, expected_terminator: &str) {
        assert_eq!(
            expected_terminator, self.terminator,
            "Expected terminator '{expected_terminator}', got '{}'",
            self.terminator
        );
    }
}

impl InstrumentInterface for LoopbackInterface {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        if self.pending.len() < buf.len() {
            return Err(InstrumentError::Timeout(self.timeout));
        }
        for byte in buf.iter_mut() {
            *byte = self.pending.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        let step = self
            .steps
            .pop_front()
            .unwrap_or_else(|| {
                panic!(
                    "No more steps expected, got {:?}",
                    std::str::from_utf8(data)
                )
            });
        let (cmd, response) = match step {
            Step::Write(cmd) => (cmd, None),
            Step::Query(cmd, resp) => (
                cmd,
                Some(format!("{resp}{}", self.terminator_exp).into_bytes()),
            ),
            Step::Block(cmd, bytes) => {
                let mut block = encode_block(&bytes);
                block.extend_from_slice(self.terminator_exp.as_bytes());
                (cmd, Some(block))
            }
        };
        let exp = format!("{cmd}{}", self.terminator_exp);
        assert_eq!(
            exp.as_bytes(),
            data,
            "Expected sendcmd '{exp:?}', got '{:?}'",
            std::str::from_utf8(data)
        );
        if let Some(resp) = response {
            self.pending.extend(resp);
        }
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
        self.timeout = timeout;
        Ok(())
    }
}

impl Drop for LoopbackInterface {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.finalize();
        }
    }
}
