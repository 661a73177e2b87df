//! Configuration of a session.

use std::time::Duration;

/// Options that are applied when a [`crate::Session`] is initialized.
///
/// All options have sensible defaults, use the `with_*` methods to change the ones you need:
///
/// ```
/// use std::time::Duration;
/// use specan::SessionOptions;
///
/// let opts = SessionOptions::default()
///     .with_reset(true)
///     .with_completion_timeout(Duration::from_secs(30));
/// assert!(opts.reset);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Timeout for operations synchronized with operation complete.
    pub completion_timeout: Duration,
    /// Read timeout of the transport for plain exchanges.
    pub transport_timeout: Duration,
    /// Line terminator.
    pub terminator: String,
    /// Query `*IDN?` during initialization.
    pub id_query: bool,
    /// Perform a full `*RST` during initialization instead of the lighter default setup.
    pub reset: bool,
    /// Check the status byte after every command.
    pub query_instrument_status: bool,
    /// Drain the error queue on every failed status check instead of only during recovery.
    pub auto_system_error_query: bool,
    /// Give up acquiring the session lock after this long. `None` blocks until the lock is free.
    pub lock_timeout: Option<Duration>,
    /// Do not talk to an instrument at all, every operation succeeds trivially.
    pub simulate: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(10),
            transport_timeout: specan_io::DEFAULT_TIMEOUT,
            terminator: "\n".to_string(),
            id_query: true,
            reset: false,
            query_instrument_status: true,
            auto_system_error_query: false,
            lock_timeout: None,
            simulate: false,
        }
    }
}

impl SessionOptions {
    /// Set the completion timeout.
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Set the transport timeout.
    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    /// Set the line terminator.
    pub fn with_terminator(mut self, terminator: &str) -> Self {
        self.terminator = terminator.to_string();
        self
    }

    /// Enable or disable the identity query.
    pub fn with_id_query(mut self, id_query: bool) -> Self {
        self.id_query = id_query;
        self
    }

    /// Enable or disable the reset during initialization.
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Enable or disable the status check after every command.
    pub fn with_query_instrument_status(mut self, enabled: bool) -> Self {
        self.query_instrument_status = enabled;
        self
    }

    /// Enable or disable draining the error queue on every failed status check.
    pub fn with_auto_system_error_query(mut self, enabled: bool) -> Self {
        self.auto_system_error_query = enabled;
        self
    }

    /// Set a timeout for acquiring the session lock.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Enable or disable simulation.
    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }
}
