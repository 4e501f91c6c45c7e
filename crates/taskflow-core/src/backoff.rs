use std::time::Duration;

/// Ceiling on any single computed retry delay. `attempt_count` and
/// `max_retries` arrive unchecked from the wire, so `base ^ n` can exceed
/// what `Duration` can represent; the cap keeps the decision total.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// What to do with a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Re-publish for another attempt after the given delay.
    Retry { delay: Duration },
    /// Retries exhausted; route to the dead letter queue.
    Quarantine,
}

/// Exponential backoff policy.
///
/// Pure and side-effect free: the decision is recomputed from the envelope's
/// `attempt_count` on every failure, never stored.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Retry ceiling applied when the envelope carries no override.
    pub max_retries: u32,
    /// Delay for attempt `n` (1-based) is `base_delay_secs ^ n`.
    pub base_delay_secs: f64,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay_secs: f64) -> Self {
        BackoffPolicy {
            max_retries,
            base_delay_secs,
        }
    }

    /// Decide using the policy's own retry ceiling.
    ///
    /// `attempt_count` is the count *before* the failure being handled:
    /// attempt 0 -> 1 waits `base^1`, attempt 1 -> 2 waits `base^2`, and so
    /// on. The caller increments the count before re-publishing.
    pub fn decide(&self, attempt_count: u32) -> RetryDecision {
        self.decide_with_max(attempt_count, self.max_retries)
    }

    /// Decide against an explicit ceiling (per-envelope override).
    pub fn decide_with_max(&self, attempt_count: u32, max_retries: u32) -> RetryDecision {
        if attempt_count < max_retries {
            let exponent = attempt_count.saturating_add(1).min(i32::MAX as u32) as i32;
            let secs = self.base_delay_secs.powi(exponent).max(0.0);
            let delay = Duration::try_from_secs_f64(secs)
                .map(|d| d.min(MAX_RETRY_DELAY))
                .unwrap_or(MAX_RETRY_DELAY);
            RetryDecision::Retry { delay }
        } else {
            RetryDecision::Quarantine
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::new(3, 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_secs(decision: RetryDecision) -> f64 {
        match decision {
            RetryDecision::Retry { delay } => delay.as_secs_f64(),
            RetryDecision::Quarantine => panic!("expected a retry decision"),
        }
    }

    #[test]
    fn test_decision_table() {
        // (attempt_count, max_retries, base) -> expected delay in seconds,
        // or None for quarantine.
        let cases: &[(u32, u32, f64, Option<f64>)] = &[
            (0, 3, 2.0, Some(2.0)),
            (1, 3, 2.0, Some(4.0)),
            (2, 3, 2.0, Some(8.0)),
            (3, 3, 2.0, None),
            (4, 3, 2.0, None),
            (0, 1, 5.0, Some(5.0)),
            (1, 1, 5.0, None),
            (0, 0, 2.0, None),
            (2, 10, 1.5, Some(3.375)),
        ];

        for &(attempt, max, base, expected) in cases {
            let decision = BackoffPolicy::new(max, base).decide(attempt);
            match expected {
                Some(secs) => {
                    assert_eq!(
                        retry_secs(decision),
                        secs,
                        "attempt={attempt} max={max} base={base}"
                    );
                }
                None => {
                    assert_eq!(
                        decision,
                        RetryDecision::Quarantine,
                        "attempt={attempt} max={max} base={base}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_oversized_attempt_count_caps_delay() {
        // attempt_count and max_retries come from the wire unvalidated;
        // 2^151 seconds overflows Duration and must cap, not panic.
        let decision = BackoffPolicy::new(3, 2.0).decide_with_max(150, 200);
        assert_eq!(retry_secs(decision), MAX_RETRY_DELAY.as_secs_f64());

        // Just past the cap: 2^17 s = 131072 s > 24h.
        let decision = BackoffPolicy::new(3, 2.0).decide_with_max(16, 200);
        assert_eq!(retry_secs(decision), MAX_RETRY_DELAY.as_secs_f64());

        // u32::MAX must not overflow the exponent arithmetic either.
        let decision = BackoffPolicy::new(3, 2.0).decide_with_max(u32::MAX - 1, u32::MAX);
        assert_eq!(retry_secs(decision), MAX_RETRY_DELAY.as_secs_f64());
    }

    #[test]
    fn test_envelope_override_takes_precedence() {
        let policy = BackoffPolicy::new(3, 2.0);

        // Attempt 4 is over the configured ceiling but under the override.
        assert!(matches!(
            policy.decide_with_max(4, 6),
            RetryDecision::Retry { .. }
        ));
        // And a lower override quarantines earlier.
        assert_eq!(policy.decide_with_max(1, 1), RetryDecision::Quarantine);
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = BackoffPolicy::new(10, 3.0);
        assert_eq!(retry_secs(policy.decide(0)), 3.0);
        assert_eq!(retry_secs(policy.decide(1)), 9.0);
        assert_eq!(retry_secs(policy.decide(2)), 27.0);
    }
}
