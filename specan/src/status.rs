//! The status register model.
//!
//! The analyzer reports its state through a tree of 16-bit registers. Each subsystem register has
//! a condition part (live state), an event part (latched transitions, cleared on read), an enable
//! mask, and positive/negative transition filters. The enabled event bits of a register are
//! summarized into one condition bit of its parent, up to the 8-bit status byte at the root.
//!
//! Polling the status byte is one short round trip, while reading the tree costs one round trip
//! per node. Arming the bits of interest once with [`RegisterMasks`] makes the status byte alone
//! sufficient to detect them later.

use std::fmt;

use crate::SpecanError;

/// A register of the status tree, mapped to its SCPI node at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusRegister {
    /// The 8-bit summary status byte, the root of the tree.
    StatusByte,
    /// The 8-bit standard event status register (`*ESR?`).
    StandardEvent,
    /// `STATus:OPERation`
    Operation,
    /// `STATus:QUEStionable`
    Questionable,
    /// `STATus:QUEStionable:POWer`
    QuestionablePower,
    /// `STATus:QUEStionable:TEMPerature`
    QuestionableTemperature,
    /// `STATus:QUEStionable:FREQuency`
    QuestionableFrequency,
    /// `STATus:QUEStionable:CALibration`
    QuestionableCalibration,
    /// `STATus:QUEStionable:LIMit<n>` of measurement window `n`, starting at 1.
    QuestionableLimit(u8),
    /// `STATus:QUEStionable:LMARgin<n>` of measurement window `n`, starting at 1.
    QuestionableLimitMargin(u8),
    /// `STATus:QUEStionable:SYNC`
    QuestionableSync,
    /// `STATus:QUEStionable:ACPLimit`
    QuestionableAcpLimit,
}

/// The part of a register to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterPart {
    /// Live state, read-only.
    Condition,
    /// Latched transitions, read-only and cleared by reading.
    Event,
    /// Which event bits propagate to the parent.
    Enable,
    /// Which rising condition bits are latched into the event part.
    PositiveTransition,
    /// Which falling condition bits are latched into the event part.
    NegativeTransition,
}

impl RegisterPart {
    fn suffix(&self) -> &'static str {
        match self {
            RegisterPart::Condition => ":COND",
            RegisterPart::Event => ":EVEN",
            RegisterPart::Enable => ":ENAB",
            RegisterPart::PositiveTransition => ":PTR",
            RegisterPart::NegativeTransition => ":NTR",
        }
    }

    /// Whether this part can be written by the host.
    pub fn is_writable(&self) -> bool {
        !matches!(self, RegisterPart::Condition | RegisterPart::Event)
    }
}

/// Number of measurement windows, each with its own limit and limit margin register.
pub const LIMIT_WINDOWS: u8 = 16;

impl StatusRegister {
    /// All subsystem registers that have the full five-part structure, every limit window
    /// included.
    pub fn subsystems() -> Vec<StatusRegister> {
        let mut regs = vec![
            StatusRegister::Operation,
            StatusRegister::Questionable,
            StatusRegister::QuestionablePower,
            StatusRegister::QuestionableTemperature,
            StatusRegister::QuestionableFrequency,
            StatusRegister::QuestionableCalibration,
            StatusRegister::QuestionableSync,
            StatusRegister::QuestionableAcpLimit,
        ];
        regs.extend((1..=LIMIT_WINDOWS).map(StatusRegister::QuestionableLimit));
        regs.extend((1..=LIMIT_WINDOWS).map(StatusRegister::QuestionableLimitMargin));
        regs
    }

    /// The SCPI node of a subsystem register. The 8-bit IEEE 488.2 registers have none.
    pub fn node(&self) -> Option<String> {
        let node = match self {
            StatusRegister::StatusByte | StatusRegister::StandardEvent => return None,
            StatusRegister::Operation => "STAT:OPER",
            StatusRegister::Questionable => "STAT:QUES",
            StatusRegister::QuestionablePower => "STAT:QUES:POW",
            StatusRegister::QuestionableTemperature => "STAT:QUES:TEMP",
            StatusRegister::QuestionableFrequency => "STAT:QUES:FREQ",
            StatusRegister::QuestionableCalibration => "STAT:QUES:CAL",
            StatusRegister::QuestionableLimit(window) => {
                return Some(format!("STAT:QUES:LIM{window}"));
            }
            StatusRegister::QuestionableLimitMargin(window) => {
                return Some(format!("STAT:QUES:LMAR{window}"));
            }
            StatusRegister::QuestionableSync => "STAT:QUES:SYNC",
            StatusRegister::QuestionableAcpLimit => "STAT:QUES:ACPL",
        };
        Some(node.to_string())
    }

    /// Fails for a limit register of a window outside `1..=LIMIT_WINDOWS`.
    fn check_window(&self) -> Result<(), SpecanError> {
        match self {
            StatusRegister::QuestionableLimit(window)
            | StatusRegister::QuestionableLimitMargin(window)
                if !(1..=LIMIT_WINDOWS).contains(window) =>
            {
                Err(SpecanError::Parameter(format!(
                    "Window {window} is not in 1..={LIMIT_WINDOWS}."
                )))
            }
            _ => Ok(()),
        }
    }

    /// The register this one is summarized into, together with the summary bit mask.
    ///
    /// Returns `None` for the status byte, which is the root. The limit registers of all windows
    /// share one summary bit.
    pub fn parent(&self) -> Option<(StatusRegister, u16)> {
        let questionable = StatusRegister::Questionable;
        match self {
            StatusRegister::StatusByte => None,
            StatusRegister::StandardEvent => {
                Some((StatusRegister::StatusByte, StatusByte::EVENT_STATUS as u16))
            }
            StatusRegister::Operation => {
                Some((StatusRegister::StatusByte, StatusByte::OPERATION as u16))
            }
            StatusRegister::Questionable => {
                Some((StatusRegister::StatusByte, StatusByte::QUESTIONABLE as u16))
            }
            StatusRegister::QuestionablePower => Some((questionable, 1 << 3)),
            StatusRegister::QuestionableTemperature => Some((questionable, 1 << 4)),
            StatusRegister::QuestionableFrequency => Some((questionable, 1 << 5)),
            StatusRegister::QuestionableCalibration => Some((questionable, 1 << 8)),
            StatusRegister::QuestionableLimit(_) => Some((questionable, 1 << 9)),
            StatusRegister::QuestionableLimitMargin(_) => Some((questionable, 1 << 10)),
            StatusRegister::QuestionableSync => Some((questionable, 1 << 11)),
            StatusRegister::QuestionableAcpLimit => Some((questionable, 1 << 12)),
        }
    }

    /// The chain of ancestors from the direct parent up to the status byte.
    pub fn ancestors(&self) -> Vec<(StatusRegister, u16)> {
        let mut chain = Vec::new();
        let mut current = *self;
        while let Some((parent, bit)) = current.parent() {
            chain.push((parent, bit));
            current = parent;
        }
        chain
    }

    /// The query that reads the given part of this register.
    pub fn query(&self, part: RegisterPart) -> Result<String, SpecanError> {
        self.check_window()?;
        match (self, part) {
            (StatusRegister::StatusByte, RegisterPart::Condition) => Ok("*STB?".to_string()),
            (StatusRegister::StatusByte, RegisterPart::Enable) => Ok("*SRE?".to_string()),
            (StatusRegister::StandardEvent, RegisterPart::Event) => Ok("*ESR?".to_string()),
            (StatusRegister::StandardEvent, RegisterPart::Enable) => Ok("*ESE?".to_string()),
            _ => match self.node() {
                Some(node) => Ok(format!("{node}{}?", part.suffix())),
                None => Err(self.unsupported(part)),
            },
        }
    }

    /// The command that writes `value` to the given part of this register.
    pub fn set_command(&self, part: RegisterPart, value: u16) -> Result<String, SpecanError> {
        if !part.is_writable() {
            return Err(SpecanError::Parameter(format!(
                "The {part} part of {self} is read-only."
            )));
        }
        self.check_window()?;
        match (self, part) {
            (StatusRegister::StatusByte, RegisterPart::Enable) => Ok(format!("*SRE {value}")),
            (StatusRegister::StandardEvent, RegisterPart::Enable) => Ok(format!("*ESE {value}")),
            _ => match self.node() {
                Some(node) => Ok(format!("{node}{} {value}", part.suffix())),
                None => Err(self.unsupported(part)),
            },
        }
    }

    /// Largest value a register can hold. The IEEE 488.2 registers are 8 bits wide.
    pub fn max_value(&self) -> u16 {
        match self.node() {
            Some(_) => u16::MAX,
            None => u8::MAX as u16,
        }
    }

    fn unsupported(&self, part: RegisterPart) -> SpecanError {
        SpecanError::Parameter(format!("{self} has no {part} part."))
    }
}

impl fmt::Display for StatusRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusRegister::StatusByte => write!(f, "status byte"),
            StatusRegister::StandardEvent => write!(f, "standard event register"),
            _ => write!(f, "{}", self.node().unwrap_or_default()),
        }
    }
}

impl fmt::Display for RegisterPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterPart::Condition => "condition",
            RegisterPart::Event => "event",
            RegisterPart::Enable => "enable",
            RegisterPart::PositiveTransition => "positive transition",
            RegisterPart::NegativeTransition => "negative transition",
        };
        write!(f, "{name}")
    }
}

/// Enable and transition masks of one register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterMasks {
    /// Event bits that propagate to the parent.
    pub enable: u16,
    /// Condition bits whose rising edge is latched.
    pub positive_transition: u16,
    /// Condition bits whose falling edge is latched.
    pub negative_transition: u16,
}

impl RegisterMasks {
    /// Latch and propagate the rising edges of `bits`.
    pub fn rising(bits: u16) -> Self {
        Self {
            enable: bits,
            positive_transition: bits,
            negative_transition: 0,
        }
    }

    /// Latch and propagate the falling edges of `bits`.
    pub fn falling(bits: u16) -> Self {
        Self {
            enable: bits,
            positive_transition: 0,
            negative_transition: bits,
        }
    }
}

/// The summary status byte, read with a serial poll or `*STB?`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusByte(pub u8);

impl StatusByte {
    /// Bit 2: the error queue has entries.
    pub const ERROR_QUEUE: u8 = 1 << 2;
    /// Bit 3: summary of the questionable register.
    pub const QUESTIONABLE: u8 = 1 << 3;
    /// Bit 4: a response is waiting in the output buffer.
    pub const MESSAGE_AVAILABLE: u8 = 1 << 4;
    /// Bit 5: summary of the enabled standard event bits. With `*ESE 1` this is the
    /// operation-complete signal.
    pub const EVENT_STATUS: u8 = 1 << 5;
    /// Bit 6: the instrument requests service.
    pub const SERVICE_REQUEST: u8 = 1 << 6;
    /// Bit 7: summary of the operation register.
    pub const OPERATION: u8 = 1 << 7;

    /// The error queue is not empty.
    pub fn error_queue(&self) -> bool {
        self.0 & Self::ERROR_QUEUE != 0
    }

    /// The questionable summary bit is set.
    pub fn questionable(&self) -> bool {
        self.0 & Self::QUESTIONABLE != 0
    }

    /// A response is waiting to be read.
    pub fn message_available(&self) -> bool {
        self.0 & Self::MESSAGE_AVAILABLE != 0
    }

    /// The event status bit (operation complete) is set.
    pub fn event_status(&self) -> bool {
        self.0 & Self::EVENT_STATUS != 0
    }

    /// The service request bit is set.
    pub fn service_request(&self) -> bool {
        self.0 & Self::SERVICE_REQUEST != 0
    }

    /// The operation summary bit is set.
    pub fn operation(&self) -> bool {
        self.0 & Self::OPERATION != 0
    }
}

/// The standard event status register, read (and cleared) with `*ESR?`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StandardEvent(pub u8);

impl StandardEvent {
    /// Bit 0: all operations tagged with `*OPC` have finished.
    pub const OPERATION_COMPLETE: u8 = 1 << 0;
    /// Bit 2: a response was requested but not read, or read without a request.
    pub const QUERY_ERROR: u8 = 1 << 2;
    /// Bit 3: device-dependent error.
    pub const DEVICE_ERROR: u8 = 1 << 3;
    /// Bit 4: a command could not be executed.
    pub const EXECUTION_ERROR: u8 = 1 << 4;
    /// Bit 5: a command could not be parsed.
    pub const COMMAND_ERROR: u8 = 1 << 5;
    /// Bit 7: the instrument was power cycled.
    pub const POWER_ON: u8 = 1 << 7;

    const ERRORS: u8 =
        Self::QUERY_ERROR | Self::DEVICE_ERROR | Self::EXECUTION_ERROR | Self::COMMAND_ERROR;

    /// Operation complete is set.
    pub fn operation_complete(&self) -> bool {
        self.0 & Self::OPERATION_COMPLETE != 0
    }

    /// Any of the error bits is set.
    pub fn has_error(&self) -> bool {
        self.0 & Self::ERRORS != 0
    }
}
