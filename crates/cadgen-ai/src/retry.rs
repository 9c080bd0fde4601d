//! Rate-limit backoff applied uniformly to every provider client

use crate::{ChatClient, Completion, Context, Error, Provider, RequestOptions, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Backoff schedule for transient provider failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of calls, including the first
    pub max_attempts: u32,
    /// Wait before each retry; the last entry repeats if the list runs short
    pub delays: Vec<Duration>,
    /// HTTP-equivalent statuses worth another attempt
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delays: vec![Duration::from_secs(15), Duration::from_secs(30)],
            retryable_statuses: vec![429, 503, 529],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delays: vec![],
            retryable_statuses: vec![],
        }
    }

    /// Delay before the retry following `attempt` (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        self.delays
            .get(idx)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or_default()
    }

    /// Whether `error` should be retried under this policy
    pub fn is_retryable(&self, error: &Error) -> bool {
        error
            .status()
            .is_some_and(|status| self.retryable_statuses.contains(&status))
    }
}

/// Wraps a client and retries transient failures per [`RetryPolicy`]
pub struct RetryingClient {
    inner: Box<dyn ChatClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn ChatClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl ChatClient for RetryingClient {
    fn provider(&self) -> Provider {
        self.inner.provider()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, context: &Context, options: &RequestOptions) -> Result<Completion> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.complete(context, options).await {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < max_attempts && self.policy.is_retryable(&e) => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        "{} request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        self.inner.provider(),
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                // Exhausted or not transient: surface the provider error as-is
                Err(e) => return Err(e),
            }
        }
    }
}
