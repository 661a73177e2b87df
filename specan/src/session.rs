//! The session: one conversation with one instrument.
//!
//! A [`Session`] owns the transport behind a mutex. Every exchange happens through a
//! [`SessionGuard`] obtained with [`Session::acquire`], so exactly one command/response exchange
//! is in flight per session. The guard releases the lock when it is dropped, on every exit path.
//!
//! The guard dereferences to a [`Conversation`], which holds the transport together with the
//! session values that are guarded by the same lock: the completion timeout and the recovery
//! state of the status check.

use std::{
    ops::{Deref, DerefMut},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, TryLockError},
    thread,
    time::{Duration, Instant},
};

use log::{debug, info, trace, warn};
use specan_io::{InstrumentError, InstrumentInterface};

use crate::{
    ErrorQueueEntry, Identity, Scoped, SessionError, SessionOptions, SpecanError,
    poll::{Completion, PendingOperation, backoff},
    status::{RegisterMasks, RegisterPart, StandardEvent, StatusByte, StatusRegister},
};

/// Upper bound of `SYST:ERR?` queries when draining the error queue.
pub const MAX_ERROR_QUEUE_DRAIN: usize = 255;

/// State of the status check with respect to auto-recovery.
///
/// A failed status check is retried at most once with error-queue draining forced on. While
/// that retry runs, the state is [`RecoveryState::RecoveringOnce`], which keeps a second failure
/// from starting another recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecoveryState {
    /// Regular operation.
    #[default]
    Normal,
    /// The single recovery check is running.
    RecoveringOnce,
}

/// The transport of a session, or the reason why there is none.
enum Link<T> {
    Connected(T),
    Simulated,
    Closed,
}

/// A clonable handle to one instrument session.
///
/// Clones share the same lock and transport, so a session can be handed to several threads;
/// their exchanges are serialized.
pub struct Session<T: InstrumentInterface> {
    inner: Arc<Mutex<Conversation<T>>>,
    lock_timeout: Option<Duration>,
}

impl<T: InstrumentInterface> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            lock_timeout: self.lock_timeout,
        }
    }
}

impl<T: InstrumentInterface> Session<T> {
    /// Open a session on the given interface.
    ///
    /// Configures terminator and transport timeout, reads identity (if enabled) and installed
    /// options, arms operation complete with `*CLS` and `*ESE 1`, and finally either performs a
    /// full reset or just checks the status. If `options.simulate` is set, the interface is
    /// dropped and a simulated session is returned instead.
    pub fn init(interface: T, options: SessionOptions) -> Result<Self, SpecanError> {
        if options.simulate {
            return Ok(Self::simulated(options));
        }
        let mut interface = interface;
        interface.set_terminator(&options.terminator);
        match interface.set_timeout(options.transport_timeout) {
            Ok(()) => {}
            Err(InstrumentError::InterfaceCommandNotSupported) => {
                debug!("interface keeps its own timeout");
            }
            Err(err) => return Err(err.into()),
        }

        let session = Self::with_link(Link::Connected(interface), &options, None);
        session.acquire()?.initialize(options.id_query, options.reset)?;
        Ok(session)
    }

    /// Create a session without an instrument in which every operation succeeds trivially.
    pub fn simulated(options: SessionOptions) -> Self {
        debug!("opening simulated session");
        Self::with_link(Link::Simulated, &options, Some(Identity::simulated()))
    }

    fn with_link(link: Link<T>, options: &SessionOptions, identity: Option<Identity>) -> Self {
        let conv = Conversation {
            link,
            completion_timeout: options.completion_timeout,
            query_instrument_status: options.query_instrument_status,
            auto_system_error_query: options.auto_system_error_query,
            recovery: RecoveryState::Normal,
            identity,
            installed_options: Vec::new(),
        };
        Self {
            inner: Arc::new(Mutex::new(conv)),
            lock_timeout: options.lock_timeout,
        }
    }

    /// Acquire exclusive access to the instrument.
    ///
    /// Blocks until no other caller holds the lock, or fails with
    /// [`SessionError::LockTimeout`] if a lock timeout is configured and passes. Fails with
    /// [`SessionError::Closed`] if the session was closed.
    pub fn acquire(&self) -> Result<SessionGuard<'_, T>, SpecanError> {
        let state = match self.lock_timeout {
            None => self.inner.lock().map_err(|_| SessionError::Poisoned)?,
            Some(limit) => self.acquire_within(limit)?,
        };
        if matches!(state.link, Link::Closed) {
            return Err(SessionError::Closed.into());
        }
        Ok(SessionGuard { state })
    }

    fn acquire_within(
        &self,
        limit: Duration,
    ) -> Result<MutexGuard<'_, Conversation<T>>, SessionError> {
        let start = Instant::now();
        loop {
            match self.inner.try_lock() {
                Ok(state) => return Ok(state),
                Err(TryLockError::Poisoned(_)) => return Err(SessionError::Poisoned),
                Err(TryLockError::WouldBlock) => {}
            }
            let elapsed = start.elapsed();
            if elapsed >= limit {
                return Err(SessionError::LockTimeout(limit));
            }
            let sleep = backoff(elapsed).min(limit - elapsed);
            if sleep.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(sleep);
            }
        }
    }

    /// Close the session: clear the interface and release it.
    ///
    /// Every later operation on this session or any of its clones fails with
    /// [`SessionError::Closed`].
    pub fn close(&self) -> Result<(), SpecanError> {
        self.acquire()?.close()
    }

    /// Whether this session runs without an instrument.
    pub fn is_simulated(&self) -> Result<bool, SpecanError> {
        Ok(self.acquire()?.is_simulated())
    }

    /// Send a command and check the status.
    pub fn write(&self, cmd: &str) -> Result<(), SpecanError> {
        let mut conv = self.acquire()?;
        conv.send(cmd)?;
        conv.check_status()
    }

    /// Send a query, read the response, and check the status.
    pub fn query(&self, cmd: &str) -> Result<String, SpecanError> {
        let mut conv = self.acquire()?;
        let resp = conv.query(cmd)?;
        conv.check_status()?;
        Ok(resp)
    }

    /// Send a query, parse the response, and check the status.
    pub fn query_parsed<F: FromStr>(&self, cmd: &str) -> Result<F, SpecanError> {
        let mut conv = self.acquire()?;
        let value = conv.query_parsed(cmd)?;
        conv.check_status()?;
        Ok(value)
    }

    /// Send a command tagged with `*OPC` and wait until the instrument finished it.
    pub fn write_with_opc(&self, cmd: &str) -> Result<Completion, SpecanError> {
        self.acquire()?.write_with_opc(cmd)
    }

    /// Run `op` with the completion timeout temporarily set to `timeout`.
    ///
    /// The lock is held for the whole closure, and the previous timeout is restored afterwards
    /// whether `op` succeeds or not.
    pub fn with_completion_timeout<R>(
        &self,
        timeout: Duration,
        op: impl FnOnce(&mut Conversation<T>) -> Result<R, SpecanError>,
    ) -> Result<R, SpecanError> {
        let mut conv = self.acquire()?;
        let mut scoped = conv.override_completion_timeout(timeout);
        op(&mut *scoped)
    }

    /// Check the instrument status, see [`Conversation::check_status`].
    pub fn check_status(&self) -> Result<(), SpecanError> {
        self.acquire()?.check_status()
    }

    /// Drain the error queue, see [`Conversation::drain_error_queue`].
    pub fn drain_error_queue(&self) -> Result<Vec<ErrorQueueEntry>, SpecanError> {
        self.acquire()?.drain_error_queue()
    }

    /// Read one entry of the error queue.
    pub fn error_query(&self) -> Result<ErrorQueueEntry, SpecanError> {
        self.acquire()?.error_query()
    }

    /// Read one part of a status register.
    pub fn read_register(
        &self,
        register: StatusRegister,
        part: RegisterPart,
    ) -> Result<u16, SpecanError> {
        self.acquire()?.read_register(register, part)
    }

    /// Write the enable and transition masks of a status register and check the status.
    pub fn write_register_masks(
        &self,
        register: StatusRegister,
        masks: RegisterMasks,
    ) -> Result<(), SpecanError> {
        let mut conv = self.acquire()?;
        conv.write_register_masks(register, masks)?;
        conv.check_status()
    }

    /// Arm bits of a register to show up in the status byte, see [`Conversation::arm`].
    pub fn arm(&self, register: StatusRegister, bits: u16) -> Result<(), SpecanError> {
        let mut conv = self.acquire()?;
        conv.arm(register, bits)?;
        conv.check_status()
    }

    /// Timeout for operations synchronized with operation complete.
    pub fn completion_timeout(&self) -> Result<Duration, SpecanError> {
        Ok(self.acquire()?.completion_timeout())
    }

    /// Set the timeout for operations synchronized with operation complete.
    pub fn set_completion_timeout(&self, timeout: Duration) -> Result<(), SpecanError> {
        self.acquire()?.set_completion_timeout(timeout);
        Ok(())
    }

    /// Read timeout of the transport.
    pub fn transport_timeout(&self) -> Result<Duration, SpecanError> {
        self.acquire()?.transport_timeout()
    }

    /// Set the read timeout of the transport.
    pub fn set_transport_timeout(&self, timeout: Duration) -> Result<(), SpecanError> {
        self.acquire()?.set_transport_timeout(timeout)
    }

    /// Identity read during initialization, if it was queried.
    pub fn identity(&self) -> Result<Option<Identity>, SpecanError> {
        Ok(self.acquire()?.identity().cloned())
    }

    /// Options installed on the instrument, as read during initialization.
    pub fn installed_options(&self) -> Result<Vec<String>, SpecanError> {
        Ok(self.acquire()?.installed_options().to_vec())
    }
}

/// Exclusive access to a session. Dropping it releases the lock.
pub struct SessionGuard<'a, T: InstrumentInterface> {
    state: MutexGuard<'a, Conversation<T>>,
}

impl<T: InstrumentInterface> Deref for SessionGuard<'_, T> {
    type Target = Conversation<T>;

    fn deref(&self) -> &Conversation<T> {
        &self.state
    }
}

impl<T: InstrumentInterface> DerefMut for SessionGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Conversation<T> {
        &mut self.state
    }
}

/// The state of a session that is only reachable while holding its lock.
///
/// Plain exchanges (`send`, `query`, ...) do not check the status on their own, such that several
/// of them can be combined under one lock before a single [`Conversation::check_status`].
pub struct Conversation<T: InstrumentInterface> {
    link: Link<T>,
    completion_timeout: Duration,
    query_instrument_status: bool,
    auto_system_error_query: bool,
    recovery: RecoveryState,
    identity: Option<Identity>,
    installed_options: Vec<String>,
}

impl<T: InstrumentInterface> Conversation<T> {
    /// The interface, `None` when simulating.
    fn interface(&mut self) -> Result<Option<&mut T>, SpecanError> {
        match &mut self.link {
            Link::Connected(intf) => Ok(Some(intf)),
            Link::Simulated => Ok(None),
            Link::Closed => Err(SessionError::Closed.into()),
        }
    }

    /// Whether this session runs without an instrument.
    pub fn is_simulated(&self) -> bool {
        matches!(self.link, Link::Simulated)
    }

    /// Send a command without reading a response.
    pub fn send(&mut self, cmd: &str) -> Result<(), SpecanError> {
        match self.interface()? {
            Some(intf) => Ok(intf.sendcmd(cmd)?),
            None => {
                debug!("simulated -> {cmd}");
                Ok(())
            }
        }
    }

    /// Send a query and read one response line.
    ///
    /// A simulated session answers every query with `"0"`.
    pub fn query(&mut self, cmd: &str) -> Result<String, SpecanError> {
        match self.interface()? {
            Some(intf) => Ok(intf.query(cmd)?),
            None => Ok("0".to_string()),
        }
    }

    /// Send a query and parse the response.
    pub fn query_parsed<F: FromStr>(&mut self, cmd: &str) -> Result<F, SpecanError> {
        let resp = self.query(cmd)?;
        resp.trim()
            .parse::<F>()
            .map_err(|_| SpecanError::protocol(cmd, &resp))
    }

    /// Send a query and read the binary block the instrument answers with.
    pub fn query_block(&mut self, cmd: &str) -> Result<Vec<u8>, SpecanError> {
        match self.interface()? {
            Some(intf) => {
                intf.sendcmd(cmd)?;
                Ok(intf.read_binary_block()?)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Send a query that takes long to answer, with the transport timeout raised for this query.
    ///
    /// The previous transport timeout is restored afterwards, also if the query fails.
    pub fn query_with_timeout(
        &mut self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<String, SpecanError> {
        let Some(intf) = self.interface()? else {
            return Ok("0".to_string());
        };
        let previous = intf.get_timeout();
        intf.set_timeout(timeout)?;
        let result = intf.query(cmd);
        let restored = intf.set_timeout(previous);
        let resp = result?;
        restored?;
        Ok(resp)
    }

    /// Read the summary status byte.
    pub fn read_status_byte(&mut self) -> Result<u8, SpecanError> {
        match self.interface()? {
            Some(intf) => Ok(intf.read_status_byte()?),
            None => Ok(0),
        }
    }

    /// Poll the status byte until operation complete, an error, or the timeout.
    ///
    /// Succeeds as soon as the event status bit is set. Fails with [`SpecanError::Faulted`] if
    /// the error-queue bit shows up first; the queue is not read, see
    /// [`Conversation::drain_error_queue`]. Fails with [`SpecanError::Timeout`] once `timeout`
    /// has passed.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> Result<Completion, SpecanError> {
        if self.is_simulated() {
            return Ok(Completion {
                elapsed: Duration::ZERO,
                polls: 0,
            });
        }
        let mut pending = PendingOperation::start(timeout);
        loop {
            let stb = self.read_status_byte()?;
            if let Some(outcome) = pending.observe(stb) {
                let result = pending.finish(outcome);
                if let Ok(done) = &result {
                    info!(
                        "operation complete after {:?} and {} polls",
                        done.elapsed, done.polls
                    );
                }
                return result;
            }
            let sleep = pending.next_sleep();
            trace!("poll {} stb {stb:#04x}, sleeping {sleep:?}", pending.polls());
            if !sleep.is_zero() {
                thread::sleep(sleep);
            }
        }
    }

    /// Send `cmd;*OPC`, wait for completion with the completion timeout, and check the status.
    ///
    /// After completion the standard event register is read to clear the event status bit. If
    /// the error-queue bit showed up while waiting, the queue is drained and returned as
    /// [`SpecanError::InstrumentFault`]. On timeout, the queue is drained as well so that stale
    /// errors do not end up in the next operation, and the timeout is returned. Either way `*CLS`
    /// cancels the pending operation complete, and a failing drain never hides the fault or the
    /// timeout.
    pub fn write_with_opc(&mut self, cmd: &str) -> Result<Completion, SpecanError> {
        let timeout = self.completion_timeout;
        self.send(&format!("{cmd};*OPC"))?;
        match self.wait_for_completion(timeout) {
            Ok(done) => {
                let esr = StandardEvent(self.read_register(
                    StatusRegister::StandardEvent,
                    RegisterPart::Event,
                )? as u8);
                if esr.has_error() {
                    debug!("standard event register after '{cmd}': {:#04x}", esr.0);
                }
                self.check_status()?;
                Ok(done)
            }
            Err(err @ SpecanError::Faulted { .. }) => {
                let entries = self.discard_pending(cmd);
                if entries.is_empty() {
                    Err(err)
                } else {
                    Err(SpecanError::InstrumentFault(entries))
                }
            }
            Err(err @ SpecanError::Timeout { .. }) => {
                let stale = self.discard_pending(cmd);
                if !stale.is_empty() {
                    warn!("'{cmd}' timed out, discarded errors: {stale:?}");
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Drain the error queue and cancel the pending operation complete with `*CLS`.
    ///
    /// Runs after a fault or a timeout, whose error is what the caller gets. Failures here are
    /// only logged, and `*CLS` is sent even if the drain failed.
    fn discard_pending(&mut self, cmd: &str) -> Vec<ErrorQueueEntry> {
        let entries = self.drain_error_queue().unwrap_or_else(|err| {
            warn!("draining the error queue after '{cmd}' failed: {err}");
            Vec::new()
        });
        if let Err(err) = self.send("*CLS") {
            warn!("clearing the status after '{cmd}' failed: {err}");
        }
        entries
    }

    /// Check the instrument status after a command.
    ///
    /// Does nothing if querying the instrument status is disabled. Otherwise the status byte is
    /// read; if the error-queue bit is set, the error queue is drained when auto system-error
    /// query is on and [`SpecanError::InstrumentFault`] returned. With auto system-error query
    /// off, the check is repeated exactly once with draining forced on, so that the queue does not
    /// carry the error into the next operation. That single recovery never recurses.
    pub fn check_status(&mut self) -> Result<(), SpecanError> {
        if !self.query_instrument_status || self.is_simulated() {
            return Ok(());
        }
        match self.status_check_pass() {
            Err(err @ SpecanError::InstrumentStatus { .. })
                if self.recovery == RecoveryState::Normal && !self.auto_system_error_query =>
            {
                warn!("{err} Recovering once with error queue query.");
                let mut recovering = Scoped::new(
                    self,
                    |conv| &mut conv.recovery,
                    RecoveryState::RecoveringOnce,
                );
                match recovering.status_check_pass() {
                    Ok(()) => Err(err),
                    Err(retry) => Err(retry),
                }
            }
            other => other,
        }
    }

    /// One pass of the status check without recovery.
    fn status_check_pass(&mut self) -> Result<(), SpecanError> {
        let status_byte = self.read_status_byte()?;
        if !StatusByte(status_byte).error_queue() {
            return Ok(());
        }
        if self.auto_system_error_query || self.recovery == RecoveryState::RecoveringOnce {
            let entries = self.drain_error_queue()?;
            if !entries.is_empty() {
                return Err(SpecanError::InstrumentFault(entries));
            }
        }
        Err(SpecanError::InstrumentStatus { status_byte })
    }

    /// Current recovery state of the status check.
    pub fn recovery_state(&self) -> RecoveryState {
        self.recovery
    }

    /// Read the error queue until it reports "no error", oldest entry first.
    ///
    /// Fails with a protocol error if the instrument still reports errors after
    /// [`MAX_ERROR_QUEUE_DRAIN`] queries.
    pub fn drain_error_queue(&mut self) -> Result<Vec<ErrorQueueEntry>, SpecanError> {
        let mut entries = Vec::new();
        for _ in 0..MAX_ERROR_QUEUE_DRAIN {
            let entry = self.error_query()?;
            if entry.is_no_error() {
                if !entries.is_empty() {
                    debug!("drained {} error(s) from the queue", entries.len());
                }
                return Ok(entries);
            }
            entries.push(entry);
        }
        Err(SpecanError::Protocol {
            command: "SYST:ERR?".to_string(),
            response: format!("no end of error queue after {MAX_ERROR_QUEUE_DRAIN} entries"),
        })
    }

    /// Read exactly one entry of the error queue.
    pub fn error_query(&mut self) -> Result<ErrorQueueEntry, SpecanError> {
        if self.is_simulated() {
            return Ok(ErrorQueueEntry::new(0, "No error"));
        }
        let resp = self.query("SYST:ERR?")?;
        ErrorQueueEntry::parse(&resp)
    }

    /// Read one part of a status register.
    pub fn read_register(
        &mut self,
        register: StatusRegister,
        part: RegisterPart,
    ) -> Result<u16, SpecanError> {
        if (register, part) == (StatusRegister::StatusByte, RegisterPart::Condition) {
            return Ok(self.read_status_byte()? as u16);
        }
        let cmd = register.query(part)?;
        let resp = self.query(&cmd)?;
        let value = resp
            .trim()
            .parse::<i64>()
            .map_err(|_| SpecanError::protocol(&cmd, &resp))?;
        if !(0..=register.max_value() as i64).contains(&value) {
            return Err(SpecanError::protocol(&cmd, &resp));
        }
        Ok(value as u16)
    }

    /// Write enable and transition masks of a register.
    ///
    /// Transition filters are written before the enable mask. Condition and event contents are not
    /// touched. The IEEE 488.2 registers only have an enable mask; asking for transitions on them is
    /// a parameter error.
    pub fn write_register_masks(
        &mut self,
        register: StatusRegister,
        masks: RegisterMasks,
    ) -> Result<(), SpecanError> {
        if masks.enable > register.max_value() {
            return Err(SpecanError::Parameter(format!(
                "Enable mask {} does not fit into the {register}.",
                masks.enable
            )));
        }
        if register.node().is_none() {
            if masks.positive_transition != 0 || masks.negative_transition != 0 {
                return Err(SpecanError::Parameter(format!(
                    "The {register} has no transition filters."
                )));
            }
        } else {
            let ptr =
                register.set_command(RegisterPart::PositiveTransition, masks.positive_transition)?;
            let ntr =
                register.set_command(RegisterPart::NegativeTransition, masks.negative_transition)?;
            self.send(&ptr)?;
            self.send(&ntr)?;
        }
        let enable = register.set_command(RegisterPart::Enable, masks.enable)?;
        self.send(&enable)
    }

    /// Arm rising edges of `bits` in `register` to show up in the status byte.
    ///
    /// Writes the masks of the register itself and then sets the summary bit in the enable and
    /// positive transition masks of every ancestor below the status byte, keeping the bits that
    /// were already set there. The IEEE 488.2 registers have no transition filters, so arming them
    /// adds `bits` to their enable mask (`*ESE`/`*SRE`) and keeps the bits already enabled.
    pub fn arm(&mut self, register: StatusRegister, bits: u16) -> Result<(), SpecanError> {
        if register.node().is_none() {
            let enable = self.read_register(register, RegisterPart::Enable)?;
            let masks = RegisterMasks {
                enable: enable | bits,
                ..Default::default()
            };
            return self.write_register_masks(register, masks);
        }
        self.write_register_masks(register, RegisterMasks::rising(bits))?;
        for (parent, bit) in register.ancestors() {
            if parent == StatusRegister::StatusByte {
                break;
            }
            let enable = self.read_register(parent, RegisterPart::Enable)?;
            let ptr = self.read_register(parent, RegisterPart::PositiveTransition)?;
            let ntr = self.read_register(parent, RegisterPart::NegativeTransition)?;
            let masks = RegisterMasks {
                enable: enable | bit,
                positive_transition: ptr | bit,
                negative_transition: ntr,
            };
            self.write_register_masks(parent, masks)?;
        }
        Ok(())
    }

    /// Preset all status registers with `STAT:PRES`.
    pub fn preset_status(&mut self) -> Result<(), SpecanError> {
        self.send("STAT:PRES")
    }

    /// Clear event registers and the error queue with `*CLS`.
    pub fn clear_status(&mut self) -> Result<(), SpecanError> {
        self.send("*CLS")
    }

    /// Timeout for operations synchronized with operation complete.
    pub fn completion_timeout(&self) -> Duration {
        self.completion_timeout
    }

    /// Set the timeout for operations synchronized with operation complete.
    pub fn set_completion_timeout(&mut self, timeout: Duration) {
        self.completion_timeout = timeout;
    }

    /// Use `timeout` as completion timeout until the returned guard is dropped.
    pub fn override_completion_timeout(
        &mut self,
        timeout: Duration,
    ) -> Scoped<'_, Self, Duration> {
        Scoped::new(self, |conv| &mut conv.completion_timeout, timeout)
    }

    /// Read timeout of the transport.
    pub fn transport_timeout(&mut self) -> Result<Duration, SpecanError> {
        match self.interface()? {
            Some(intf) => Ok(intf.get_timeout()),
            None => Ok(specan_io::DEFAULT_TIMEOUT),
        }
    }

    /// Set the read timeout of the transport.
    pub fn set_transport_timeout(&mut self, timeout: Duration) -> Result<(), SpecanError> {
        match self.interface()? {
            Some(intf) => Ok(intf.set_timeout(timeout)?),
            None => Ok(()),
        }
    }

    /// Identity read during initialization.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Options installed on the instrument.
    pub fn installed_options(&self) -> &[String] {
        &self.installed_options
    }

    /// Full reset with `*RST`, synchronized with operation complete.
    pub fn reset(&mut self) -> Result<Completion, SpecanError> {
        self.write_with_opc("*RST")
    }

    /// Read identity and options, arm operation complete, and reset if asked to.
    fn initialize(&mut self, id_query: bool, reset: bool) -> Result<(), SpecanError> {
        if id_query {
            let idn = self.query("*IDN?")?;
            self.identity = Some(Identity::parse(&idn)?);
        }
        let opt = self.query("*OPT?")?;
        self.installed_options = Identity::parse_options(&opt);
        self.clear_status()?;
        self.write_register_masks(
            StatusRegister::StandardEvent,
            RegisterMasks {
                enable: StandardEvent::OPERATION_COMPLETE as u16,
                ..RegisterMasks::default()
            },
        )?;
        if reset {
            self.reset()?;
        } else {
            self.check_status()?;
        }
        match &self.identity {
            Some(idn) => info!("session open: {idn}"),
            None => info!("session open"),
        }
        Ok(())
    }

    /// Clear the interface and drop it.
    fn close(&mut self) -> Result<(), SpecanError> {
        match std::mem::replace(&mut self.link, Link::Closed) {
            Link::Connected(mut intf) => {
                debug!("closing session");
                intf.clear()?;
                Ok(())
            }
            Link::Simulated => Ok(()),
            Link::Closed => Err(SessionError::Closed.into()),
        }
    }
}
