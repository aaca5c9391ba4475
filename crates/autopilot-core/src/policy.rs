//! Retry/backoff policy engine.
//!
//! Pure and stateless: `next_delay` and `should_retry` are plain functions
//! of the policy and attempt number. The orchestrator owns everything
//! stateful (sleeping, fallback dispatch, alerting on exhaustion).
//!
//! Attempts are 1-indexed and `max_retries` bounds the retries, so an
//! action may run up to `max_retries + 1` times in total.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::executor::ExecError;

// ---------------------------------------------------------------------------
// BackoffStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Every retry fires immediately.
    Immediate,
    /// Delay grows as `base * attempt`.
    LinearBackoff,
    /// Delay grows as `base * 2^(attempt - 1)`.
    ExponentialBackoff,
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

pub const MAX_RETRIES_RANGE: std::ops::RangeInclusive<u32> = 1..=10;
pub const BASE_DELAY_RANGE: std::ops::RangeInclusive<u64> = 1..=3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_strategy")]
    pub strategy: BackoffStrategy,
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: u64,
    /// Action run exactly once after full retry exhaustion, never retried
    /// itself. Must resolve to an action in the owning plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_action_id: Option<Uuid>,
    #[serde(default = "default_alert")]
    pub alert_on_final_failure: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_strategy() -> BackoffStrategy {
    BackoffStrategy::ExponentialBackoff
}

fn default_base_delay() -> u64 {
    60
}

fn default_alert() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_retries: default_max_retries(),
            strategy: default_strategy(),
            base_delay_seconds: default_base_delay(),
            fallback_action_id: None,
            alert_on_final_failure: default_alert(),
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if !MAX_RETRIES_RANGE.contains(&self.max_retries) {
            return Err(PipelineError::InvalidPolicy(format!(
                "max_retries must be in [{}, {}], got {}",
                MAX_RETRIES_RANGE.start(),
                MAX_RETRIES_RANGE.end(),
                self.max_retries
            )));
        }
        if !BASE_DELAY_RANGE.contains(&self.base_delay_seconds) {
            return Err(PipelineError::InvalidPolicy(format!(
                "base_delay_seconds must be in [{}, {}], got {}",
                BASE_DELAY_RANGE.start(),
                BASE_DELAY_RANGE.end(),
                self.base_delay_seconds
            )));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let seconds = match self.strategy {
            BackoffStrategy::Immediate => 0,
            BackoffStrategy::LinearBackoff => {
                self.base_delay_seconds.saturating_mul(u64::from(attempt))
            }
            BackoffStrategy::ExponentialBackoff => self
                .base_delay_seconds
                .saturating_mul(2u64.saturating_pow(attempt - 1)),
        };
        Duration::from_secs(seconds)
    }

    /// Whether the orchestrator should schedule retry number `attempt`
    /// after `error`. Non-retryable failures escalate immediately
    /// regardless of remaining budget.
    pub fn should_retry(&self, attempt: u32, error: &ExecError) -> bool {
        self.enabled && attempt <= self.max_retries && error.is_retryable()
    }

    /// Total wait across all retries if every one of them fires — the
    /// "total time if all retries fail" figure surfaced to users.
    pub fn worst_case_wait(&self) -> Duration {
        (1..=self.max_retries)
            .map(|attempt| self.next_delay(attempt))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecError, ExecErrorKind};

    fn policy(strategy: BackoffStrategy, base: u64, max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            strategy,
            base_delay_seconds: base,
            max_retries,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn defaults_match_documented_policy() {
        let p = RetryPolicy::default();
        assert!(p.enabled);
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.strategy, BackoffStrategy::ExponentialBackoff);
        assert_eq!(p.base_delay_seconds, 60);
        assert!(p.fallback_action_id.is_none());
        assert!(p.alert_on_final_failure);
    }

    #[test]
    fn immediate_delays_are_zero() {
        let p = policy(BackoffStrategy::Immediate, 60, 10);
        for attempt in 1..=10 {
            assert_eq!(p.next_delay(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn linear_delays_form_arithmetic_sequence() {
        let p = policy(BackoffStrategy::LinearBackoff, 30, 5);
        let delays: Vec<u64> = (1..=5).map(|n| p.next_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![30, 60, 90, 120, 150]);
        for pair in delays.windows(2) {
            assert_eq!(pair[1] - pair[0], 30);
        }
    }

    #[test]
    fn exponential_delays_double_each_attempt() {
        let p = policy(BackoffStrategy::ExponentialBackoff, 60, 3);
        let delays: Vec<u64> = (1..=3).map(|n| p.next_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![60, 120, 240]);
        assert_eq!(p.worst_case_wait(), Duration::from_secs(420));
    }

    #[test]
    fn exponential_delay_saturates_instead_of_overflowing() {
        let p = policy(BackoffStrategy::ExponentialBackoff, 3600, 10);
        // Far past any sane attempt number; must not panic.
        let d = p.next_delay(200);
        assert!(d >= p.next_delay(10));
    }

    #[test]
    fn should_retry_respects_budget() {
        let p = policy(BackoffStrategy::Immediate, 1, 3);
        let transient = ExecError::new(ExecErrorKind::Network, "connection reset");
        assert!(p.should_retry(1, &transient));
        assert!(p.should_retry(3, &transient));
        assert!(!p.should_retry(4, &transient));
    }

    #[test]
    fn should_retry_rejects_permanent_failures_immediately() {
        let p = policy(BackoffStrategy::ExponentialBackoff, 60, 10);
        let permanent = ExecError::new(ExecErrorKind::Permission, "token expired");
        assert!(!p.should_retry(1, &permanent));
    }

    #[test]
    fn disabled_policy_never_retries() {
        let p = RetryPolicy {
            enabled: false,
            ..RetryPolicy::default()
        };
        let transient = ExecError::new(ExecErrorKind::Timeout, "slow");
        assert!(!p.should_retry(1, &transient));
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        let mut p = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        assert!(p.validate().is_err());

        p.max_retries = 11;
        assert!(p.validate().is_err());

        p.max_retries = 3;
        p.base_delay_seconds = 0;
        assert!(p.validate().is_err());

        p.base_delay_seconds = 3601;
        assert!(p.validate().is_err());

        p.base_delay_seconds = 3600;
        p.validate().unwrap();
    }

    #[test]
    fn policy_roundtrips_through_yaml() {
        let p = policy(BackoffStrategy::LinearBackoff, 120, 5);
        let yaml = serde_yaml::to_string(&p).unwrap();
        assert!(yaml.contains("linear_backoff"));
        let parsed: RetryPolicy = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: RetryPolicy = serde_yaml::from_str("enabled: true\n").unwrap();
        assert_eq!(parsed, RetryPolicy::default());
    }
}
