//! Reconnect delay policy.
//!
//! Attempts are unbounded (the room either comes back or the server
//! starts refusing it), but the request rate is not: delays grow
//! exponentially from `base` up to `cap`, with jitter added so that a
//! fleet of clients dropped by the same outage does not reconnect in
//! lockstep.

use std::time::Duration;

/// Capped exponential backoff between reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Growth factor applied per failed attempt.
    pub multiplier: f64,
    /// Add up to a quarter of the delay as jitter.
    pub jitter: bool,
    attempt: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            attempt: 0,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration, multiplier: f64) -> Self {
        Self {
            base,
            cap,
            multiplier,
            jitter: true,
            attempt: 0,
        }
    }

    /// Fixed-delay policy: every attempt waits exactly `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            cap: delay,
            multiplier: 1.0,
            jitter: false,
            attempt: 0,
        }
    }

    /// Delay before the next attempt. Each call counts one attempt.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base.as_millis() as f64 * self.multiplier.powi(self.attempt as i32);
        let capped = (exp as u64).min(self.cap.as_millis() as u64);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = if self.jitter { jitter_ms(capped / 4) } else { 0 };
        Duration::from_millis((capped + jitter).min(self.cap.as_millis() as u64))
    }

    /// Forget accumulated attempts after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Failed attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Jitter in `[0, max)` derived from the clock's subsecond noise.
fn jitter_ms(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    nanos % max
}
