//! Inter-retry delay policies.
//!
//! Pure attempt-index → delay functions, selected by name when the
//! orchestrator is constructed. All three are non-decreasing in
//! expectation; only the exponential policy carries jitter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy applied between retry attempts. The attempt index is
/// zero-based: `delay(0)` is the wait before the first retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum BackoffStrategy {
    /// `min(base * 2^attempt, max)` plus uniform jitter in
    /// `[0, 0.1 * delay)`. Jitter keeps parallel tasks from retrying in
    /// lockstep.
    Exponential { base_secs: f64, max_secs: f64 },
    /// `step * (attempt + 1)`.
    Linear { step_secs: f64 },
    /// `base * fib(attempt)`, sequence seeded [1, 1].
    Fibonacci { base_secs: f64 },
}

impl BackoffStrategy {
    pub fn exponential() -> Self {
        BackoffStrategy::Exponential {
            base_secs: 1.0,
            max_secs: 60.0,
        }
    }

    pub fn linear() -> Self {
        BackoffStrategy::Linear { step_secs: 2.0 }
    }

    pub fn fibonacci() -> Self {
        BackoffStrategy::Fibonacci { base_secs: 1.0 }
    }

    /// Lookup by name; unknown names fall back to exponential.
    pub fn from_name(name: &str) -> Self {
        match name {
            "linear" => Self::linear(),
            "fibonacci" => Self::fibonacci(),
            _ => Self::exponential(),
        }
    }

    /// Delay before retry number `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = match *self {
            BackoffStrategy::Exponential {
                base_secs,
                max_secs,
            } => {
                let delay = (base_secs * 2f64.powi(attempt as i32)).min(max_secs);
                delay + rand::random::<f64>() * delay * 0.1
            }
            BackoffStrategy::Linear { step_secs } => step_secs * (attempt as f64 + 1.0),
            BackoffStrategy::Fibonacci { base_secs } => base_secs * fib(attempt) as f64,
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::exponential()
    }
}

fn fib(n: u32) -> u64 {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 0..n {
        let next = a + b;
        a = b;
        b = next;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_bounded_even_with_jitter() {
        let strategy = BackoffStrategy::exponential();
        for attempt in 0..20 {
            let delay = strategy.delay(attempt).as_secs_f64();
            assert!(delay >= 0.0);
            assert!(delay <= 60.0 * 1.1, "attempt {} gave {}", attempt, delay);
        }
    }

    #[test]
    fn test_exponential_doubles_before_cap() {
        let strategy = BackoffStrategy::Exponential {
            base_secs: 1.0,
            max_secs: 60.0,
        };
        // Jitter adds at most 10%, so the base progression stays visible.
        assert!(strategy.delay(0).as_secs_f64() >= 1.0);
        assert!(strategy.delay(2).as_secs_f64() >= 4.0);
        assert!(strategy.delay(4).as_secs_f64() >= 16.0);
    }

    #[test]
    fn test_linear_progression() {
        let strategy = BackoffStrategy::linear();
        assert_eq!(strategy.delay(0), Duration::from_secs_f64(2.0));
        assert_eq!(strategy.delay(1), Duration::from_secs_f64(4.0));
        assert_eq!(strategy.delay(4), Duration::from_secs_f64(10.0));
    }

    #[test]
    fn test_fibonacci_progression() {
        let strategy = BackoffStrategy::fibonacci();
        let delays: Vec<u64> = (0..7).map(|a| strategy.delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 1, 2, 3, 5, 8, 13]);
    }

    #[rstest::rstest]
    #[case("linear", BackoffStrategy::linear())]
    #[case("fibonacci", BackoffStrategy::fibonacci())]
    #[case("exponential", BackoffStrategy::exponential())]
    // Unknown names fall back to the default.
    #[case("quadratic", BackoffStrategy::exponential())]
    fn test_from_name_lookup(#[case] name: &str, #[case] expected: BackoffStrategy) {
        assert_eq!(BackoffStrategy::from_name(name), expected);
    }

    #[test]
    fn test_exponential_stays_within_jitter_band() {
        let strategy = BackoffStrategy::Exponential {
            base_secs: 1.0,
            max_secs: 60.0,
        };
        for attempt in 0..12 {
            let expected = (2f64.powi(attempt as i32)).min(60.0);
            let delay = strategy.delay(attempt).as_secs_f64();
            assert!(delay >= expected);
            assert!(delay <= expected * 1.1);
        }
    }

    #[test]
    fn test_deterministic_strategies_non_decreasing() {
        for strategy in [BackoffStrategy::linear(), BackoffStrategy::fibonacci()] {
            let mut previous = Duration::ZERO;
            for attempt in 0..10 {
                let delay = strategy.delay(attempt);
                assert!(delay >= previous);
                previous = delay;
            }
        }
    }
}
