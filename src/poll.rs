//! Retry-until-true polling.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EnginestrapError;

fn default_interval_ms() -> u64 {
    3_000
}

fn default_timeout_ms() -> u64 {
    180_000
}

/// How often and for how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PollPolicy {
    /// 60 attempts, 3 seconds apart.
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl PollPolicy {
    /// Durations beyond `u64::MAX` milliseconds saturate.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Calls `probe` until it returns true or the policy's timeout would be
/// exceeded by waiting another interval.
///
/// The probe always runs at least once. Returns the number of attempts it
/// took.
pub fn wait_for<F>(what: &str, policy: PollPolicy, mut probe: F) -> Result<usize, EnginestrapError>
where
    F: FnMut() -> bool,
{
    let started = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        if probe() {
            debug!("{} ready after {} attempt(s)", what, attempts);
            return Ok(attempts);
        }

        let elapsed = started.elapsed();
        if elapsed + policy.interval() > policy.timeout() {
            return Err(EnginestrapError::Timeout {
                what: what.to_string(),
                attempts,
                elapsed,
            });
        }

        debug!("{} not ready (attempt {}), retrying in {:?}", what, attempts, policy.interval());
        thread::sleep(policy.interval());
    }
}
