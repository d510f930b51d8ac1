//! Linear backoff for the device authorization request.

use std::future::Future;
use std::time::Duration;

use crate::{OAuthError, PollPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizeRetry {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for AuthorizeRetry {
    fn default() -> Self {
        Self::from_policy(&PollPolicy::default())
    }
}

impl AuthorizeRetry {
    pub fn from_policy(policy: &PollPolicy) -> Self {
        Self {
            max_attempts: policy.max_authorize_attempts.max(1),
            backoff_step: policy.backoff_step,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, OAuthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OAuthError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.max_attempts {
                        return Err(err);
                    }

                    let delay = self.delay(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "device authorization failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
