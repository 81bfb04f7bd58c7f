//! Retry with exponential backoff for remote judgment calls.
//!
//! Every attempt is bounded by its own deadline. Between attempts the policy
//! waits `base_delay * 2^n` (optionally jittered) and logs a warning.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::config::humantime_duration;
use crate::responder::ResponderError;

/// Retry settings for one kind of remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: usize,

    /// Wait before the second attempt; doubles after each failure
    #[serde(with = "humantime_duration")]
    pub base_delay: Duration,

    /// Randomize each wait
    pub jitter: bool,

    /// Deadline per attempt, `None` for unbounded. Set from `call_timeout`.
    #[serde(skip)]
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter: false,
            attempt_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(2.0)
            .without_max_delay()
            .with_max_times(self.max_attempts.saturating_sub(1));
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// Returns the last error once every attempt has failed. `label` names
    /// the call in the warning logged after each failed attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ResponderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResponderError>>,
    {
        let attempt_timeout = self.attempt_timeout;
        let mut attempt = 0usize;
        let max_attempts = self.max_attempts.max(1);

        let bounded = || {
            let call = operation();
            async move {
                match attempt_timeout {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .map_err(|_| ResponderError::Timeout(limit))?,
                    None => call.await,
                }
            }
        };

        bounded
            .retry(self.backoff())
            .sleep(tokio::time::sleep)
            .notify(|err: &ResponderError, wait: Duration| {
                attempt += 1;
                tracing::warn!(
                    call = label,
                    attempt,
                    max_attempts,
                    retry_in = ?wait,
                    error = %err,
                    "Remote call failed, retrying"
                );
            })
            .await
    }
}
