use rand::Rng;
use std::time::Duration;

/// Jittered exponential backoff shared by the control-plane reconnect loop
/// and the publisher retry path.
///
/// The growth factor is derived from the bounds so that `steps` consecutive
/// attempts walk from `min` to `max`: `factor = (max/min)^(1/(steps-1))`.
/// Each delay gets full jitter in `[delay/2, delay]` so a fleet of probes
/// does not reconnect in lockstep.
#[derive(Debug)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration, steps: u32) -> Self {
        debug_assert!(steps > 1);
        debug_assert!(max > min);
        let factor = (max.as_secs_f64() / min.as_secs_f64()).powf(1.0 / f64::from(steps - 1));
        Self {
            min,
            max,
            factor,
            attempt: 0,
        }
    }

    /// The delay to wait before the next attempt. Successive calls grow the
    /// delay until the cap is reached.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.peek();
        self.attempt = self.attempt.saturating_add(1);
        let jittered = delay.as_secs_f64() * rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_secs_f64(jittered)
    }

    /// The un-jittered delay the next call to [`Self::next_delay`] is based on.
    pub fn peek(&self) -> Duration {
        let raw = self.min.as_secs_f64() * self.factor.powi(self.attempt as i32);
        Duration::from_secs_f64(raw.min(self.max.as_secs_f64()))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    /// The reconnection policy: min 2s, max 30s, cap reached in 8 attempts.
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30), 8)
    }
}
