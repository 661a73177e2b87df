//! A thin command layer on top of the session.
//!
//! Every function here validates its arguments before any I/O, formats one or a few SCPI
//! commands, and goes through the session for locking, completion, and the status check.

use std::time::Duration;

use log::info;
use measurements::Frequency;
use specan_io::InstrumentInterface;

use crate::{Completion, Identity, Session, SpecanError, StatusRegister};

/// Number of traces the analyzer provides.
const NUM_TRACES: u8 = 6;

/// Completion timeout for `*TST?` and `*CAL?`, both of which take tens of seconds.
const SELF_TEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A spectrum analyzer driven through a [`Session`].
///
/// The struct is cheap to clone; clones share the session and can be sent to other threads.
pub struct SpectrumAnalyzer<T: InstrumentInterface> {
    session: Session<T>,
}

impl<T: InstrumentInterface> Clone for SpectrumAnalyzer<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<T: InstrumentInterface> SpectrumAnalyzer<T> {
    /// Create an analyzer on an initialized session.
    pub fn new(session: Session<T>) -> Self {
        Self { session }
    }

    /// The underlying session.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Identity of the analyzer. Queried now if it was not read during initialization.
    pub fn identity(&self) -> Result<Identity, SpecanError> {
        if let Some(idn) = self.session.identity()? {
            return Ok(idn);
        }
        let resp = self.session.query("*IDN?")?;
        Identity::parse(&resp)
    }

    /// Options installed on the analyzer.
    pub fn installed_options(&self) -> Result<Vec<String>, SpecanError> {
        self.session.installed_options()
    }

    /// Whether a given option is installed.
    pub fn has_option(&self, option: &str) -> Result<bool, SpecanError> {
        Ok(self
            .installed_options()?
            .iter()
            .any(|opt| opt.eq_ignore_ascii_case(option)))
    }

    /// Reset the analyzer with `*RST` and wait until it is done.
    pub fn reset(&self) -> Result<Completion, SpecanError> {
        self.session.acquire()?.reset()
    }

    /// Clear the event registers and the error queue.
    pub fn clear_status(&self) -> Result<(), SpecanError> {
        self.session.acquire()?.clear_status()
    }

    /// Run the built-in self test. Returns `true` if it passed.
    pub fn self_test(&self) -> Result<bool, SpecanError> {
        self.long_query_passed("*TST?")
    }

    /// Run the self alignment. Returns `true` if it passed.
    pub fn self_alignment(&self) -> Result<bool, SpecanError> {
        self.long_query_passed("*CAL?")
    }

    fn long_query_passed(&self, cmd: &str) -> Result<bool, SpecanError> {
        let mut conv = self.session.acquire()?;
        let resp = conv.query_with_timeout(cmd, SELF_TEST_TIMEOUT)?;
        let code = resp
            .trim()
            .parse::<i32>()
            .map_err(|_| SpecanError::protocol(cmd, &resp))?;
        conv.check_status()?;
        Ok(code == 0)
    }

    /// Set the center frequency.
    pub fn set_center_frequency(&self, freq: Frequency) -> Result<(), SpecanError> {
        let hz = validate_frequency("Center frequency", freq)?;
        self.session.write(&format!("FREQ:CENT {hz}"))
    }

    /// Get the center frequency.
    pub fn center_frequency(&self) -> Result<Frequency, SpecanError> {
        let hz: f64 = self.session.query_parsed("FREQ:CENT?")?;
        Ok(Frequency::from_hertz(hz))
    }

    /// Set the frequency span.
    pub fn set_span(&self, span: Frequency) -> Result<(), SpecanError> {
        let hz = validate_frequency("Span", span)?;
        self.session.write(&format!("FREQ:SPAN {hz}"))
    }

    /// Get the frequency span.
    pub fn span(&self) -> Result<Frequency, SpecanError> {
        let hz: f64 = self.session.query_parsed("FREQ:SPAN?")?;
        Ok(Frequency::from_hertz(hz))
    }

    /// Switch to single sweep mode, run one sweep, and wait until it is done.
    ///
    /// `sweep_timeout` replaces the completion timeout for this sweep only.
    pub fn single_sweep(&self, sweep_timeout: Duration) -> Result<Completion, SpecanError> {
        self.session.with_completion_timeout(sweep_timeout, |conv| {
            conv.send("INIT:CONT OFF")?;
            conv.check_status()?;
            let done = conv.write_with_opc("INIT:IMM")?;
            info!("single sweep done in {:?}", done.elapsed);
            Ok(done)
        })
    }

    /// Read the data of one trace (1 to 6) as 32-bit floats.
    pub fn trace_data(&self, trace: u8) -> Result<Vec<f32>, SpecanError> {
        if !(1..=NUM_TRACES).contains(&trace) {
            return Err(SpecanError::Parameter(format!(
                "Trace {trace} does not exist. Valid traces are 1 to {NUM_TRACES}."
            )));
        }
        let cmd = format!("TRAC:DATA? TRACE{trace}");
        let mut conv = self.session.acquire()?;
        conv.send("FORM REAL,32")?;
        let block = conv.query_block(&cmd)?;
        conv.check_status()?;
        if block.len() % 4 != 0 {
            return Err(SpecanError::Protocol {
                command: cmd,
                response: format!("binary block of {} bytes", block.len()),
            });
        }
        Ok(block
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Arm rising edges of questionable bits so that they show up in the status byte.
    pub fn arm_questionable(
        &self,
        register: StatusRegister,
        bits: u16,
    ) -> Result<(), SpecanError> {
        let in_tree = register == StatusRegister::Questionable
            || register
                .ancestors()
                .iter()
                .any(|(parent, _)| *parent == StatusRegister::Questionable);
        if !in_tree {
            return Err(SpecanError::Parameter(format!(
                "{register} is not part of the questionable tree."
            )));
        }
        self.session.arm(register, bits)
    }

    /// Close the session.
    pub fn close(&self) -> Result<(), SpecanError> {
        self.session.close()
    }
}

fn validate_frequency(name: &str, freq: Frequency) -> Result<f64, SpecanError> {
    let hz = freq.as_hertz();
    if !hz.is_finite() || hz < 0.0 {
        return Err(SpecanError::Parameter(format!(
            "{name} must be a finite, non-negative frequency, got {hz} Hz."
        )));
    }
    Ok(hz)
}
