//! Bounded condition polling.
//!
//! A [`Poller`] evaluates a probe, returns as soon as it is ready, and
//! otherwise sleeps `min(interval, remaining)` before trying again. It never
//! sleeps after a successful evaluation and never times out before the full
//! budget has passed. Cancellation is checked at the top of every iteration
//! and interrupts the sleep.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::Deadline;
use crate::condition::Condition;
use crate::driver::{Driver, DriverResult};
use crate::error::{Error, Result, WaitError};

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_interval_ms() -> u64 {
    500
}

/// Timeout budget and re-check cadence for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPollSpec")]
pub struct PollSpec {
    timeout: Duration,
    interval: Duration,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPollSpec {
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
}

impl TryFrom<RawPollSpec> for PollSpec {
    type Error = Error;

    fn try_from(raw: RawPollSpec) -> Result<Self> {
        PollSpec::from_millis(raw.timeout_ms, raw.interval_ms)
    }
}

impl PollSpec {
    /// Fails unless `0 < interval <= timeout`.
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::Config("poll interval must be greater than zero".into()));
        }
        if interval > timeout {
            return Err(Error::Config(format!(
                "poll interval ({:?}) must not exceed timeout ({:?})",
                interval, timeout
            )));
        }
        Ok(Self { timeout, interval })
    }

    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Result<Self> {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(interval_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollSpec {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(default_timeout_ms()),
            interval: Duration::from_millis(default_interval_ms()),
        }
    }
}

/// Result of one probe evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    /// Done; the wait returns this value.
    Ready(T),
    /// Not yet. The value is kept for timeout diagnostics.
    Pending(Value),
}

/// Runs one bounded wait at a time against a [`PollSpec`].
#[derive(Debug, Clone)]
pub struct Poller {
    spec: PollSpec,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(spec: PollSpec) -> Self {
        Self {
            spec,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `token` in addition to the deadline.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn spec(&self) -> &PollSpec {
        &self.spec
    }

    /// Poll `probe` until it is ready, the deadline passes, or the token is
    /// cancelled.
    ///
    /// Fatal driver errors end the wait at once. Other driver errors count as
    /// "not yet" and the most recent one is reported on timeout.
    pub async fn until<T, F, Fut>(
        &self,
        description: &str,
        mut probe: F,
    ) -> std::result::Result<T, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DriverResult<Probe<T>>>,
    {
        let deadline = Deadline::after(self.spec.timeout);
        let mut last_observed = None;
        let mut last_error = None;
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                debug!("Wait cancelled: {}", description);
                return Err(WaitError::Cancelled {
                    description: description.to_string(),
                    elapsed: deadline.elapsed(),
                });
            }

            attempts += 1;
            match probe().await {
                Ok(Probe::Ready(value)) => {
                    debug!(
                        "Satisfied after {:?} ({} checks): {}",
                        deadline.elapsed(),
                        attempts,
                        description
                    );
                    return Ok(value);
                }
                Ok(Probe::Pending(observed)) => {
                    last_observed = Some(observed);
                }
                Err(e) if e.is_fatal() => {
                    debug!("Fatal driver error while waiting for {}: {}", description, e);
                    return Err(WaitError::Driver(e));
                }
                Err(e) => {
                    debug!("Check {} for '{}' errored: {}", attempts, description, e);
                    last_error = Some(e);
                }
            }

            if deadline.expired() {
                return Err(WaitError::Timeout {
                    description: description.to_string(),
                    elapsed: deadline.elapsed(),
                    last_observed,
                    last_error,
                });
            }

            let pause = self.spec.interval.min(deadline.remaining());
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.cancel.cancelled() => {}
            }
        }
    }

    /// Wait for `condition` and return what it observed when it held.
    pub async fn wait<C>(
        &self,
        driver: &dyn Driver,
        condition: &C,
    ) -> std::result::Result<Value, WaitError>
    where
        C: Condition + ?Sized,
    {
        let description = condition.describe();
        self.until(&description, move || async move {
            let check = condition.check(driver).await?;
            Ok(if check.satisfied {
                Probe::Ready(check.observed)
            } else {
                Probe::Pending(check.observed)
            })
        })
        .await
    }
}
