//! Bounded polling for asynchronous provider jobs.
//!
//! Providers that run work as a job (image predictions, talk synthesis)
//! are polled under an injected policy rather than a hardcoded loop, so
//! the interval and attempt budget are configuration and tests can use a
//! fast policy.

use std::future::Future;
use std::time::Duration;

use crate::ai::core::providers::ProviderError;

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn from_config() -> Self {
        Self {
            interval: Duration::from_millis(*crate::config::POLL_INTERVAL_MS),
            max_attempts: *crate::config::POLL_MAX_ATTEMPTS,
        }
    }
}

/// Outcome of one poll attempt.
pub enum PollOutcome<T> {
    Done(T),
    Pending,
}

/// Run `check` up to `policy.max_attempts` times, sleeping the policy
/// interval between attempts. Exhausting the budget is a terminal
/// timeout, never a retry-forever.
pub async fn poll_until<T, F, Fut>(
    provider: &'static str,
    policy: PollPolicy,
    mut check: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome<T>, ProviderError>>,
{
    for attempt in 1..=policy.max_attempts {
        match check().await? {
            PollOutcome::Done(value) => return Ok(value),
            PollOutcome::Pending => {
                tracing::debug!(provider, attempt, "job still pending");
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(ProviderError::Timeout {
        provider,
        attempts: policy.max_attempts,
    })
}
