//! Completion polling.
//!
//! After a command that starts instrument-side processing (a sweep, an alignment) has been sent
//! with `*OPC`, the status byte is polled until the event status bit shows operation complete,
//! the error-queue bit shows a problem, or the timeout passes. Time between polls grows with the
//! elapsed time: fast operations are caught almost immediately, long ones are not hammered with
//! thousands of round trips.

use std::time::{Duration, Instant};

use crate::{SpecanError, status::StatusByte};

/// Sleep interval between two polls after `elapsed` time of waiting.
///
/// The tiers are monotonic in the elapsed time. Below 10 ms the poller does not sleep at all.
pub fn backoff(elapsed: Duration) -> Duration {
    let ms = elapsed.as_millis();
    let sleep_ms = match ms {
        0..10 => 0,
        10..100 => 1,
        100..1_000 => 5,
        1_000..5_000 => 10,
        5_000..10_000 => 50,
        10_000..20_000 => 100,
        20_000..30_000 => 500,
        _ => 1_000,
    };
    Duration::from_millis(sleep_ms)
}

/// Result of a successful wait for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Time from the start of polling until completion was observed.
    pub elapsed: Duration,
    /// Number of status byte reads.
    pub polls: u32,
}

/// Terminal state of a [`PendingOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The operation-complete bit was observed before the deadline.
    Completed,
    /// The error-queue bit was observed before or instead of completion.
    Faulted,
    /// The deadline passed.
    TimedOut,
}

/// The interval between issuing a command and observing its completion.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    started: Instant,
    timeout: Duration,
    last_status: Option<StatusByte>,
    polls: u32,
}

impl PendingOperation {
    /// Start waiting now with the given timeout.
    pub fn start(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            last_status: None,
            polls: 0,
        }
    }

    /// Time since the operation started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Number of status bytes observed so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// The last status byte observed.
    pub fn last_status(&self) -> Option<StatusByte> {
        self.last_status
    }

    /// Feed a freshly read status byte and classify it.
    pub fn observe(&mut self, stb: u8) -> Option<PollOutcome> {
        let elapsed = self.elapsed();
        self.observe_at(stb, elapsed)
    }

    /// Classify a status byte read after `elapsed` time. Returns `None` if polling must go on.
    pub fn observe_at(&mut self, stb: u8, elapsed: Duration) -> Option<PollOutcome> {
        let status = StatusByte(stb);
        self.polls += 1;
        self.last_status = Some(status);
        if status.event_status() {
            Some(PollOutcome::Completed)
        } else if status.error_queue() {
            Some(PollOutcome::Faulted)
        } else if elapsed >= self.timeout {
            Some(PollOutcome::TimedOut)
        } else {
            None
        }
    }

    /// How long to sleep before the next poll, never past the deadline.
    pub fn next_sleep(&self) -> Duration {
        let elapsed = self.elapsed();
        backoff(elapsed).min(self.timeout.saturating_sub(elapsed))
    }

    /// Turn a terminal outcome into the result reported to the caller.
    pub fn finish(&self, outcome: PollOutcome) -> Result<Completion, SpecanError> {
        let elapsed = self.elapsed();
        match outcome {
            PollOutcome::Completed => Ok(Completion {
                elapsed,
                polls: self.polls,
            }),
            PollOutcome::Faulted => Err(SpecanError::Faulted {
                status_byte: self.last_status.map(|s| s.0).unwrap_or_default(),
                elapsed,
            }),
            PollOutcome::TimedOut => Err(SpecanError::Timeout {
                elapsed,
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(val: u64) -> Duration {
        Duration::from_millis(val)
    }

    #[test]
    fn test_backoff_tiers() {
        assert_eq!(backoff(ms(0)), ms(0));
        assert_eq!(backoff(ms(9)), ms(0));
        assert_eq!(backoff(ms(10)), ms(1));
        assert_eq!(backoff(ms(99)), ms(1));
        assert_eq!(backoff(ms(100)), ms(5));
        assert_eq!(backoff(ms(999)), ms(5));
        assert_eq!(backoff(ms(1_000)), ms(10));
        assert_eq!(backoff(ms(4_999)), ms(10));
        assert_eq!(backoff(ms(5_000)), ms(50));
        assert_eq!(backoff(ms(10_000)), ms(100));
        assert_eq!(backoff(ms(20_000)), ms(500));
        assert_eq!(backoff(ms(29_999)), ms(500));
        assert_eq!(backoff(ms(30_000)), ms(1_000));
        assert_eq!(backoff(Duration::from_secs(3_600)), ms(1_000));
    }

    #[test]
    fn test_backoff_monotonic_and_bounded() {
        let mut prev = Duration::ZERO;
        for elapsed in (0..40_000).step_by(7) {
            let sleep = backoff(ms(elapsed));
            assert!(sleep >= prev, "backoff decreased at {elapsed} ms");
            assert!(sleep <= ms(1_000));
            prev = sleep;
        }
    }

    /// The sleep never exceeds a tenth of the elapsed time once sleeping starts, so the time lost
    /// after completion stays proportional to the operation.
    #[test]
    fn test_backoff_relative_to_elapsed() {
        for elapsed in (10..40_000).step_by(3) {
            assert!(backoff(ms(elapsed)) * 10 <= ms(elapsed));
        }
    }

    #[test]
    fn test_observe_order() {
        let mut op = PendingOperation::start(ms(100));
        assert_eq!(op.observe_at(0, ms(1)), None);
        assert_eq!(
            op.observe_at(StatusByte::EVENT_STATUS | StatusByte::ERROR_QUEUE, ms(2)),
            Some(PollOutcome::Completed)
        );
        assert_eq!(
            op.observe_at(StatusByte::ERROR_QUEUE, ms(3)),
            Some(PollOutcome::Faulted)
        );
        assert_eq!(op.observe_at(0, ms(100)), Some(PollOutcome::TimedOut));
        assert_eq!(op.polls(), 4);
        assert_eq!(op.last_status(), Some(StatusByte(0)));
    }

    /// Bits other than event status and error queue do not end the wait.
    #[test]
    fn test_observe_ignores_other_bits() {
        let mut op = PendingOperation::start(ms(100));
        let other = StatusByte::MESSAGE_AVAILABLE | StatusByte::QUESTIONABLE | StatusByte::OPERATION;
        assert_eq!(op.observe_at(other, ms(50)), None);
    }

    #[test]
    fn test_next_sleep_clamped_to_deadline() {
        let op = PendingOperation::start(ms(0));
        assert_eq!(op.next_sleep(), Duration::ZERO);
    }

    #[test]
    fn test_finish() {
        let mut op = PendingOperation::start(ms(5));
        op.observe_at(StatusByte::ERROR_QUEUE, ms(1));
        match op.finish(PollOutcome::Faulted) {
            Err(SpecanError::Faulted { status_byte, .. }) => {
                assert_eq!(status_byte, StatusByte::ERROR_QUEUE)
            }
            other => panic!("Expected a fault, got {other:?}"),
        }
        match op.finish(PollOutcome::TimedOut) {
            Err(SpecanError::Timeout { timeout, .. }) => assert_eq!(timeout, ms(5)),
            other => panic!("Expected a timeout, got {other:?}"),
        }
        assert_eq!(op.finish(PollOutcome::Completed).unwrap().polls, 1);
    }
}
