//! A session core for bench spectrum analyzers.
//!
//! This crate implements the part of a spectrum analyzer driver that every command goes through:
//!
//! - a [`Session`] that serializes all callers onto one conversation with the instrument,
//! - a completion poller that waits for operation complete with an adaptive [`backoff`],
//! - a status register model ([`StatusRegister`]) to arm the bits of interest once and then poll
//!   the status byte alone,
//! - an error classifier that drains the instrument's error queue into a typed [`SpecanError`],
//!   with a single auto-recovery pass when a status check itself fails.
//!
//! The transport is any [`specan_io::InstrumentInterface`]. For tests and demos,
//! [`SimulatedAnalyzer`] provides an in-process instrument.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use specan::{Session, SessionOptions, SpectrumAnalyzer};
//! use specan_io::TcpIpInterface;
//!
//! let interface = TcpIpInterface::simple("192.168.10.1:5025").unwrap();
//! let session = Session::init(interface, SessionOptions::default().with_reset(true)).unwrap();
//! let analyzer = SpectrumAnalyzer::new(session);
//!
//! analyzer.single_sweep(Duration::from_secs(20)).unwrap();
//! let trace = analyzer.trace_data(1).unwrap();
//! println!("{} points", trace.len());
//! ```

#![warn(missing_docs)]

mod analyzer;
mod errors;
mod identity;
mod options;
mod poll;
mod scoped;
mod session;
pub mod simulator;
mod status;

pub use analyzer::SpectrumAnalyzer;
pub use errors::{ErrorQueueEntry, SessionError, SpecanError};
pub use identity::Identity;
pub use options::SessionOptions;
pub use poll::{Completion, PendingOperation, PollOutcome, backoff};
pub use scoped::Scoped;
pub use session::{
    Conversation, MAX_ERROR_QUEUE_DRAIN, RecoveryState, Session, SessionGuard,
};
pub use simulator::SimulatedAnalyzer;
pub use status::{
    LIMIT_WINDOWS, RegisterMasks, RegisterPart, StandardEvent, StatusByte, StatusRegister,
};
