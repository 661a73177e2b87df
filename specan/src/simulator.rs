//! An in-process spectrum analyzer.
//!
//! [`SimulatedAnalyzer`] implements [`InstrumentInterface`] and answers the commands the session
//! core and the command layer use, including the status register tree, the error queue, and
//! operation complete for sweeps of configurable duration. Clones share the same instrument, so a
//! test can hand one clone to a [`crate::Session`] and keep another to inject faults and inspect
//! what was sent.
//!
//! ```
//! use std::time::Duration;
//! use specan::{Session, SessionOptions, SimulatedAnalyzer};
//!
//! let sim = SimulatedAnalyzer::new().with_operation_time(Some(Duration::from_millis(20)));
//! let session = Session::init(sim.clone(), SessionOptions::default()).unwrap();
//! let done = session.write_with_opc("INIT:IMM").unwrap();
//! assert!(done.elapsed >= Duration::from_millis(15));
//! assert!(sim.status_polls() > 0);
//! ```

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace};
use specan_io::{InstrumentError, InstrumentInterface, encode_block};

use crate::{ErrorQueueEntry, StandardEvent, StatusByte, StatusRegister};

/// Contents of one subsystem register of the simulated instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterBank {
    /// Live state.
    pub condition: u16,
    /// Latched transitions.
    pub event: u16,
    /// Event bits summarized into the parent.
    pub enable: u16,
    /// Rising condition bits that are latched.
    pub positive_transition: u16,
    /// Falling condition bits that are latched.
    pub negative_transition: u16,
}

impl RegisterBank {
    fn preset() -> Self {
        Self {
            positive_transition: u16::MAX,
            ..Self::default()
        }
    }

    fn summary(&self) -> bool {
        self.event & self.enable != 0
    }
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Until(Instant),
    Forever,
}

#[derive(Debug)]
struct SimState {
    identity: String,
    options: String,
    terminator: String,
    timeout: Duration,
    latency: Duration,
    operation_time: Option<Duration>,
    output: VecDeque<u8>,
    esr: u8,
    ese: u8,
    sre: u8,
    errors: VecDeque<ErrorQueueEntry>,
    registers: HashMap<StatusRegister, RegisterBank>,
    opc_armed: bool,
    pending: Option<Pending>,
    stuck_error: bool,
    fault_at: Option<(u32, ErrorQueueEntry)>,
    center_frequency: f64,
    span: f64,
    continuous: bool,
    format: String,
    trace: Vec<f32>,
    status_polls: u32,
    error_queries: u32,
    commands: Vec<String>,
}

const DEFAULT_CENTER: f64 = 1.5e9;
const DEFAULT_SPAN: f64 = 3e9;

impl Default for SimState {
    fn default() -> Self {
        Self {
            identity: "Specan,SA-SIM,000001,1.0.0".to_string(),
            options: "B25,K7".to_string(),
            terminator: "\n".to_string(),
            timeout: specan_io::DEFAULT_TIMEOUT,
            latency: Duration::ZERO,
            operation_time: Some(Duration::ZERO),
            output: VecDeque::new(),
            esr: 0,
            ese: 0,
            sre: 0,
            errors: VecDeque::new(),
            registers: StatusRegister::subsystems()
                .into_iter()
                .map(|reg| (reg, RegisterBank::preset()))
                .collect(),
            opc_armed: false,
            pending: None,
            stuck_error: false,
            fault_at: None,
            center_frequency: DEFAULT_CENTER,
            span: DEFAULT_SPAN,
            continuous: true,
            format: "ASC,0".to_string(),
            trace: vec![-90.0; 11],
            status_polls: 0,
            error_queries: 0,
            commands: Vec::new(),
        }
    }
}

impl SimState {
    fn respond(&mut self, resp: &str) {
        self.output.extend(resp.as_bytes());
        self.output.extend(self.terminator.as_bytes());
    }

    fn push_error(&mut self, entry: ErrorQueueEntry) {
        self.esr |= match entry.code {
            -199..=-100 => StandardEvent::COMMAND_ERROR,
            -299..=-200 => StandardEvent::EXECUTION_ERROR,
            -499..=-400 => StandardEvent::QUERY_ERROR,
            _ => StandardEvent::DEVICE_ERROR,
        };
        debug!("simulated instrument error {entry}");
        self.errors.push_back(entry);
    }

    /// Finish an elapsed operation and latch operation complete if it was asked for.
    fn settle(&mut self) {
        if let Some(Pending::Until(deadline)) = self.pending {
            if Instant::now() >= deadline {
                self.pending = None;
            }
        }
        if self.opc_armed && self.pending.is_none() {
            self.esr |= StandardEvent::OPERATION_COMPLETE;
            self.opc_armed = false;
        }
    }

    fn summary(&self, register: StatusRegister) -> bool {
        self.registers
            .get(&register)
            .is_some_and(RegisterBank::summary)
    }

    fn status_byte(&self) -> u8 {
        let mut stb = 0;
        if !self.errors.is_empty() || self.stuck_error {
            stb |= StatusByte::ERROR_QUEUE;
        }
        if self.summary(StatusRegister::Questionable) {
            stb |= StatusByte::QUESTIONABLE;
        }
        if !self.output.is_empty() {
            stb |= StatusByte::MESSAGE_AVAILABLE;
        }
        if self.esr & self.ese != 0 {
            stb |= StatusByte::EVENT_STATUS;
        }
        if self.summary(StatusRegister::Operation) {
            stb |= StatusByte::OPERATION;
        }
        if stb & self.sre & !StatusByte::SERVICE_REQUEST != 0 {
            stb |= StatusByte::SERVICE_REQUEST;
        }
        stb
    }

    fn set_condition(&mut self, register: StatusRegister, value: u16) {
        let Some(bank) = self.registers.get_mut(&register) else {
            return;
        };
        let old = bank.condition;
        bank.condition = value;
        let rising = !old & value;
        let falling = old & !value;
        bank.event |= (rising & bank.positive_transition) | (falling & bank.negative_transition);
        self.propagate(register);
    }

    /// Update the summary bit of `register` in the condition of its parent.
    ///
    /// Registers sharing a summary bit, like the limit windows, are ORed together.
    fn propagate(&mut self, register: StatusRegister) {
        let Some((parent, bit)) = register.parent() else {
            return;
        };
        let Some(parent_bank) = self.registers.get(&parent) else {
            // The status byte is computed on demand.
            return;
        };
        let summary = self
            .registers
            .keys()
            .any(|reg| reg.parent() == Some((parent, bit)) && self.summary(*reg));
        let condition = if summary {
            parent_bank.condition | bit
        } else {
            parent_bank.condition & !bit
        };
        if condition != parent_bank.condition {
            self.set_condition(parent, condition);
        }
    }

    fn reset(&mut self) {
        self.center_frequency = DEFAULT_CENTER;
        self.span = DEFAULT_SPAN;
        self.continuous = true;
        self.format = "ASC,0".to_string();
        self.pending = None;
    }

    fn clear_status(&mut self) {
        self.esr = 0;
        self.errors.clear();
        self.opc_armed = false;
        for reg in StatusRegister::subsystems() {
            if let Some(bank) = self.registers.get_mut(&reg) {
                bank.event = 0;
            }
        }
        for reg in StatusRegister::subsystems() {
            self.propagate(reg);
        }
    }

    fn preset_status(&mut self) {
        for reg in StatusRegister::subsystems() {
            if let Some(bank) = self.registers.get_mut(&reg) {
                let condition = bank.condition;
                let event = bank.event;
                *bank = RegisterBank {
                    condition,
                    event,
                    ..RegisterBank::preset()
                };
            }
        }
        for reg in StatusRegister::subsystems() {
            self.propagate(reg);
        }
    }

    fn execute(&mut self, cmd: &str) {
        self.commands.push(cmd.to_string());
        let (header, arg) = match cmd.split_once(char::is_whitespace) {
            Some((header, arg)) => (header.to_ascii_uppercase(), arg.trim()),
            None => (cmd.to_ascii_uppercase(), ""),
        };
        match header.as_str() {
            "*IDN?" => {
                let idn = self.identity.clone();
                self.respond(&idn);
            }
            "*OPT?" => {
                let opt = self.options.clone();
                self.respond(&opt);
            }
            "*RST" => self.reset(),
            "*CLS" => self.clear_status(),
            "*ESE" => match arg.parse::<u8>() {
                Ok(val) => self.ese = val,
                Err(_) => self.data_error(),
            },
            "*ESE?" => self.respond(&self.ese.to_string()),
            "*SRE" => match arg.parse::<u8>() {
                Ok(val) => self.sre = val,
                Err(_) => self.data_error(),
            },
            "*SRE?" => self.respond(&self.sre.to_string()),
            "*ESR?" => {
                self.settle();
                let esr = self.esr;
                self.esr = 0;
                self.respond(&esr.to_string());
            }
            "*STB?" => self.status_poll(),
            "*OPC" => {
                self.opc_armed = true;
                self.settle();
            }
            "*OPC?" => self.respond("1"),
            "*TST?" | "*CAL?" => self.respond("0"),
            "*WAI" => {}
            "SYST:ERR?" | "SYST:ERR:NEXT?" => {
                self.error_queries += 1;
                let entry = self
                    .errors
                    .pop_front()
                    .unwrap_or_else(|| ErrorQueueEntry::new(0, "No error"));
                self.respond(&entry.to_string());
            }
            "STAT:PRES" => self.preset_status(),
            "FREQ:CENT" => {
                if let Some(hz) = self.frequency_arg(arg) {
                    self.center_frequency = hz;
                }
            }
            "FREQ:CENT?" => self.respond(&self.center_frequency.to_string()),
            "FREQ:SPAN" => {
                if let Some(hz) = self.frequency_arg(arg) {
                    self.span = hz;
                }
            }
            "FREQ:SPAN?" => self.respond(&self.span.to_string()),
            "INIT:CONT" => match arg.to_ascii_uppercase().as_str() {
                "ON" | "1" => self.continuous = true,
                "OFF" | "0" => self.continuous = false,
                _ => self.data_error(),
            },
            "INIT:CONT?" => self.respond(if self.continuous { "1" } else { "0" }),
            "INIT:IMM" | "INIT" => {
                self.pending = Some(match self.operation_time {
                    Some(time) => Pending::Until(Instant::now() + time),
                    None => Pending::Forever,
                });
            }
            "FORM" => {
                let format: String = arg
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
                    .to_ascii_uppercase();
                match format.as_str() {
                    "REAL,32" | "ASC" | "ASC,0" => self.format = format,
                    _ => self.data_error(),
                }
            }
            "FORM?" => self.respond(&self.format.clone()),
            "TRAC:DATA?" => self.trace_data(arg),
            _ => {
                if !self.status_register_command(&header, arg) {
                    self.push_error(ErrorQueueEntry::new(-113, "Undefined header"));
                }
            }
        }
    }

    fn data_error(&mut self) {
        self.push_error(ErrorQueueEntry::new(-104, "Data type error"));
    }

    fn frequency_arg(&mut self, arg: &str) -> Option<f64> {
        match arg.parse::<f64>() {
            Ok(hz) if hz.is_finite() && hz >= 0.0 => Some(hz),
            Ok(_) => {
                self.push_error(ErrorQueueEntry::new(-222, "Data out of range"));
                None
            }
            Err(_) => {
                self.data_error();
                None
            }
        }
    }

    fn status_poll(&mut self) {
        self.status_polls += 1;
        let polls = self.status_polls;
        if self.fault_at.as_ref().is_some_and(|(at, _)| *at == polls) {
            if let Some((_, entry)) = self.fault_at.take() {
                self.push_error(entry);
            }
        }
        self.settle();
        let stb = self.status_byte();
        trace!("simulated status byte {stb:#04x}");
        self.respond(&stb.to_string());
    }

    fn trace_data(&mut self, arg: &str) {
        let number = arg
            .to_ascii_uppercase()
            .strip_prefix("TRACE")
            .and_then(|n| n.parse::<u8>().ok());
        if !matches!(number, Some(1..=6)) {
            self.push_error(ErrorQueueEntry::new(-222, "Data out of range"));
            return;
        }
        if self.format == "REAL,32" {
            let data: Vec<u8> = self.trace.iter().flat_map(|v| v.to_le_bytes()).collect();
            let block = encode_block(&data);
            self.output.extend(block);
            self.output.extend(self.terminator.as_bytes());
        } else {
            let resp = self
                .trace
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            self.respond(&resp);
        }
    }

    /// Handle `STAT:<node>:<part>[?]`. Returns `false` if the header is not a register command.
    fn status_register_command(&mut self, header: &str, arg: &str) -> bool {
        let Some((register, part)) = StatusRegister::subsystems().into_iter().find_map(|reg| {
            let rest = header.strip_prefix(reg.node()?.as_str())?;
            matches!(
                rest,
                ":COND?" | ":EVEN?" | ":ENAB" | ":ENAB?" | ":PTR" | ":PTR?" | ":NTR" | ":NTR?"
            )
            .then_some((reg, rest))
        }) else {
            return false;
        };
        let Some(bank) = self.registers.get(&register).copied() else {
            return false;
        };
        if let Some(part) = part.strip_suffix('?') {
            let value = match part {
                ":COND" => bank.condition,
                ":EVEN" => {
                    if let Some(bank) = self.registers.get_mut(&register) {
                        bank.event = 0;
                    }
                    self.propagate(register);
                    bank.event
                }
                ":ENAB" => bank.enable,
                ":PTR" => bank.positive_transition,
                _ => bank.negative_transition,
            };
            self.respond(&value.to_string());
            return true;
        }
        let Ok(value) = arg.parse::<u16>() else {
            self.data_error();
            return true;
        };
        if let Some(bank) = self.registers.get_mut(&register) {
            match part {
                ":ENAB" => bank.enable = value,
                ":PTR" => bank.positive_transition = value,
                _ => bank.negative_transition = value,
            }
        }
        self.propagate(register);
        true
    }
}

/// A simulated spectrum analyzer, see the [module documentation](self).
#[derive(Debug, Clone)]
pub struct SimulatedAnalyzer {
    state: Arc<Mutex<SimState>>,
    terminator: String,
}

impl Default for SimulatedAnalyzer {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            terminator: "\n".to_string(),
        }
    }
}

impl SimulatedAnalyzer {
    /// A simulated analyzer in its power-on state. Sweeps complete immediately.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the response to `*IDN?`.
    pub fn with_identity(self, identity: &str) -> Self {
        self.state().identity = identity.to_string();
        self
    }

    /// Set the response to `*OPT?`.
    pub fn with_options(self, options: &str) -> Self {
        self.state().options = options.to_string();
        self
    }

    /// How long `INIT:IMM` takes. `None` means it never completes.
    pub fn with_operation_time(self, time: Option<Duration>) -> Self {
        self.state().operation_time = time;
        self
    }

    /// Delay of every write, to model the round trip to a real instrument.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = latency;
        self
    }

    /// Put an entry into the error queue.
    pub fn push_error(&self, code: i32, message: &str) {
        self.state().push_error(ErrorQueueEntry::new(code, message));
    }

    /// Put an entry into the error queue when the `nth` status poll from now is answered.
    pub fn fault_at_poll(&self, nth: u32, code: i32, message: &str) {
        let mut state = self.state();
        let at = state.status_polls + nth;
        state.fault_at = Some((at, ErrorQueueEntry::new(code, message)));
    }

    /// Keep the error-queue bit of the status byte set regardless of the queue.
    pub fn stick_error_bit(&self, stuck: bool) {
        self.state().stuck_error = stuck;
    }

    /// Set the condition part of a subsystem register, latching transitions into its event part
    /// and propagating summaries up the tree.
    pub fn set_condition(&self, register: StatusRegister, value: u16) {
        self.state().set_condition(register, value);
    }

    /// Snapshot of a subsystem register. `None` for the IEEE 488.2 registers.
    pub fn register(&self, register: StatusRegister) -> Option<RegisterBank> {
        self.state().registers.get(&register).copied()
    }

    /// The status byte as it would be answered now, without counting a poll.
    pub fn status_byte(&self) -> u8 {
        let mut state = self.state();
        state.settle();
        state.status_byte()
    }

    /// The standard event status enable mask.
    pub fn event_status_enable(&self) -> u8 {
        self.state().ese
    }

    /// Number of `*STB?` queries answered.
    pub fn status_polls(&self) -> u32 {
        self.state().status_polls
    }

    /// Number of `SYST:ERR?` queries answered.
    pub fn error_queries(&self) -> u32 {
        self.state().error_queries
    }

    /// Every command received so far, split at `;`.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    /// Reset the poll and query counters and the command log.
    pub fn reset_counters(&self) {
        let mut state = self.state();
        state.status_polls = 0;
        state.error_queries = 0;
        state.commands.clear();
    }

    /// Set the data returned for every trace.
    pub fn set_trace(&self, trace: Vec<f32>) {
        self.state().trace = trace;
    }

    /// Current center frequency in Hz.
    pub fn center_frequency(&self) -> f64 {
        self.state().center_frequency
    }

    /// Whether the analyzer sweeps continuously.
    pub fn continuous(&self) -> bool {
        self.state().continuous
    }
}

impl InstrumentInterface for SimulatedAnalyzer {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        let mut state = self.state();
        if state.output.len() < buf.len() {
            return Err(InstrumentError::Timeout(state.timeout));
        }
        for byte in buf.iter_mut() {
            *byte = state.output.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        let latency = self.state().latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let mut state = self.state();
        let line = String::from_utf8_lossy(data);
        let line = line.strip_suffix(state.terminator.as_str()).unwrap_or(&line);
        for cmd in line.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            state.execute(cmd);
        }
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        &self.terminator
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
        self.state().terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.state().timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), InstrumentError> {
        self.state().timeout = timeout;
        Ok(())
    }
}
