//! Quota-gated, retrying execution of remote calls.
//!
//! Every remote call in the engine goes through [`RemoteExecutor::run`]:
//! the full unit cost of the operation (including declared extra units
//! for compound read-before-write operations) is secured before the
//! first byte leaves the process, and transient failures are retried
//! with exponential backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use calmir_core::config::{QuotaConfig, RetryConfig};
use calmir_core::error::{CalmirError, CalmirResult};
use calmir_core::remote::protocol::RemoteOp;
use tracing::{debug, warn};

use crate::limiter::RateLimiter;

/// Bounded exponential backoff: `base_delay * 2^attempt`, capped at
/// `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }
}

pub struct RemoteExecutor {
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    quota_timeout: Duration,
}

impl RemoteExecutor {
    pub fn new(
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        quota_timeout: Duration,
    ) -> RemoteExecutor {
        RemoteExecutor {
            limiter,
            retry,
            quota_timeout,
        }
    }

    pub fn from_config(
        limiter: Arc<RateLimiter>,
        quota: &QuotaConfig,
        retry: &RetryConfig,
    ) -> RemoteExecutor {
        RemoteExecutor::new(
            limiter,
            RetryPolicy::from(retry),
            Duration::from_millis(quota.wait_timeout_ms),
        )
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run one remote operation for a user.
    ///
    /// `extra_units` declares the cost of any internal read a compound
    /// operation performs before its write (e.g. fetch-then-patch), so
    /// the whole budget is checked together and no call is made with
    /// only half the quota secured.
    pub async fn run<T, F, Fut>(
        &self,
        user_id: &str,
        op: RemoteOp,
        extra_units: u32,
        call: F,
    ) -> CalmirResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CalmirResult<T>>,
    {
        let units = op.units() + extra_units;

        self.limiter
            .wait_for_quota(user_id, units, self.quota_timeout)
            .await?;

        // Quota can evaporate between the passing peek inside the wait
        // and now; give it one more wait before committing.
        if !self.limiter.peek(user_id, units).allowed {
            self.limiter
                .wait_for_quota(user_id, units, self.quota_timeout)
                .await?;
        }

        let decision = self.limiter.check(user_id, units);
        if !decision.allowed {
            // Lost the race to a concurrent caller. The wasted wait is
            // accepted; no remote call was made and no quota spent.
            return Err(CalmirError::RateLimited {
                message: format!("quota check failed for {units} units after wait"),
                retry_after: decision.wait,
            });
        }

        let mut attempt: u32 = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !err.is_retryable() || attempt >= self.retry.max_attempts {
                        if attempt > 1 {
                            warn!(
                                user_id,
                                ?op,
                                attempts = attempt,
                                error = %err,
                                "remote call failed after retries"
                            );
                        }
                        return Err(err);
                    }

                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.retry.delay_for(attempt - 1));
                    debug!(
                        user_id,
                        ?op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient remote failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
