//! Poll/backoff policy for waiting on remote jobs.
//!
//! Delays grow geometrically from [`PollPolicy::initial_delay`] up to
//! [`PollPolicy::max_delay`], with optional proportional jitter so that
//! several watchers started together do not hit the service in lockstep.
//! [`PollPolicy::fixed`] reproduces a plain "sleep N seconds, try M times"
//! loop.

use std::time::Duration;

use rand::Rng;

use crate::error::CoreError;

/// Tunable parameters for status polling.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Total number of status requests, including the first one.
    pub max_attempts: u32,
    /// Delay after the first pending response.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each pending response.
    pub multiplier: f64,
    /// Proportional jitter in `0.0..=1.0` (0.1 = plus or minus 10%).
    pub jitter: f64,
    /// Wall-clock budget for the whole poll, if any.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            multiplier: 1.5,
            jitter: 0.1,
            deadline: None,
        }
    }
}

impl PollPolicy {
    /// Constant interval, no jitter.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
            jitter: 0.0,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Reject policies that would never poll or never converge.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_attempts == 0 {
            return Err(CoreError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(CoreError::Validation(format!(
                "multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(CoreError::Validation(format!(
                "jitter must be within 0.0..=1.0, got {}",
                self.jitter
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(CoreError::Validation(format!(
                "initial_delay ({:?}) exceeds max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }

    /// The un-jittered delay schedule between consecutive attempts.
    ///
    /// Yields `max_attempts - 1` values: no delay follows the last attempt.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let count = self.max_attempts.saturating_sub(1) as usize;
        std::iter::successors(Some(self.initial_delay), move |d| {
            Some(next_delay(*d, self))
        })
        .take(count)
    }

    /// Upper bound on time spent sleeping across a full poll.
    pub fn worst_case_sleep(&self) -> Duration {
        self.delays().sum()
    }
}

/// Calculate the next backoff delay from the current delay and policy.
///
/// The result is clamped to [`PollPolicy::max_delay`].
pub fn next_delay(current: Duration, policy: &PollPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

/// Apply proportional jitter to a delay.
///
/// The result stays within `delay * (1 - jitter) ..= delay * (1 + jitter)`
/// and never exceeds `ceiling`.
pub fn jittered<R: Rng + ?Sized>(
    delay: Duration,
    jitter: f64,
    ceiling: Duration,
    rng: &mut R,
) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay.min(ceiling);
    }
    let jitter = jitter.min(1.0);
    let factor = rng.random_range((1.0 - jitter)..=(1.0 + jitter));
    let millis = (delay.as_millis() as f64 * factor).max(0.0) as u64;
    Duration::from_millis(millis).min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn default_policy_is_valid() {
        assert!(PollPolicy::default().validate().is_ok());
    }

    #[test]
    fn next_delay_grows_and_clamps() {
        let policy = PollPolicy {
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            ..Default::default()
        };
        assert_eq!(next_delay(Duration::from_secs(4), &policy), Duration::from_secs(8));
        assert_eq!(next_delay(Duration::from_secs(8), &policy), Duration::from_secs(10));
        assert_eq!(next_delay(Duration::from_secs(10), &policy), Duration::from_secs(10));
    }

    #[test]
    fn full_backoff_sequence() {
        let policy = PollPolicy {
            max_attempts: 8,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.0,
            deadline: None,
        };
        let secs: Vec<u64> = policy.delays().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(policy.worst_case_sleep(), Duration::from_secs(91));
    }

    #[test]
    fn fixed_policy_repeats_interval() {
        let policy = PollPolicy::fixed(Duration::from_secs(10), 5);
        assert!(policy.validate().is_ok());
        assert!(policy.delays().all(|d| d == Duration::from_secs(10)));
        assert_eq!(policy.delays().count(), 4);
    }

    #[test]
    fn single_attempt_has_no_delays() {
        let policy = PollPolicy::fixed(Duration::from_secs(3), 1);
        assert_eq!(policy.delays().count(), 0);
    }

    #[test]
    fn invalid_policies_are_rejected() {
        let zero = PollPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let shrinking = PollPolicy {
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(shrinking.validate().is_err());

        let wild = PollPolicy {
            jitter: 1.5,
            ..Default::default()
        };
        assert!(wild.validate().is_err());

        let inverted = PollPolicy {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn jitter_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(7);
        let base = Duration::from_millis(1000);
        let ceiling = Duration::from_secs(60);
        for _ in 0..200 {
            let d = jittered(base, 0.2, ceiling, &mut rng);
            assert!(d >= Duration::from_millis(800), "{d:?} below band");
            assert!(d <= Duration::from_millis(1200), "{d:?} above band");
        }
    }

    #[test]
    fn jitter_respects_ceiling_and_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = jittered(Duration::from_secs(10), 0.5, Duration::from_secs(10), &mut rng);
        assert!(d <= Duration::from_secs(10));
        assert_eq!(
            jittered(Duration::ZERO, 0.5, Duration::from_secs(10), &mut rng),
            Duration::ZERO
        );
        assert_eq!(
            jittered(Duration::from_secs(3), 0.0, Duration::from_secs(10), &mut rng),
            Duration::from_secs(3)
        );
    }
}
