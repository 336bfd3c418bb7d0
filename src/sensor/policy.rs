//! What the acquisition loop does when a read fails.
//!
//! [`Terminate`] ends the loop on the first failure and hands the raw
//! status back as the exit code. [`RetryWithBackoff`] keeps trying with a
//! doubling delay before giving up.

use embassy_time::Duration;

use crate::error::AcquisitionError;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Terminate,
    RetryAfter(Duration),
}

pub trait AcquisitionPolicy {
    fn on_failure(&mut self, err: &AcquisitionError) -> Verdict;

    /// A full cycle succeeded.
    fn on_success(&mut self) {}
}

/// Stop on the first failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct Terminate;

impl AcquisitionPolicy for Terminate {
    fn on_failure(&mut self, _err: &AcquisitionError) -> Verdict {
        Verdict::Terminate
    }
}

/// Retry up to `max_attempts` consecutive failures, doubling the delay
/// from `initial` up to `max_delay`. A successful cycle resets it.
#[derive(Clone, Copy, Debug)]
pub struct RetryWithBackoff {
    initial: Duration,
    max_delay: Duration,
    max_attempts: u8,
    attempts: u8,
    next: Duration,
}

impl RetryWithBackoff {
    pub fn new(initial: Duration, max_delay: Duration, max_attempts: u8) -> Self {
        Self {
            initial,
            max_delay,
            max_attempts,
            attempts: 0,
            next: initial,
        }
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }
}

impl AcquisitionPolicy for RetryWithBackoff {
    fn on_failure(&mut self, err: &AcquisitionError) -> Verdict {
        if self.attempts >= self.max_attempts {
            error!("Giving up after {} attempts ({})", self.attempts, err.status().0);
            return Verdict::Terminate;
        }
        self.attempts += 1;
        let delay = self.next.min(self.max_delay);
        self.next = (self.next * 2).min(self.max_delay);
        Verdict::RetryAfter(delay)
    }

    fn on_success(&mut self) {
        self.attempts = 0;
        self.next = self.initial;
    }
}
