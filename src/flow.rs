//! Test-flow outcomes built from wait results.
//!
//! A flow that only makes sense when some precondition holds (a logged-in
//! header, a promo banner) checks it with a wait and hands the result to
//! [`skip_unless`]. A timeout becomes [`Outcome::Skipped`]; cancellation and
//! driver failures stay errors.

use std::fmt;
use std::ops::ControlFlow;

use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result, WaitError};

/// How one flow ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// `Passed` for `Ok`, `Failed` with the error text otherwise.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Passed,
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("passed"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

/// Continue with the waited-for value, or break with a skip when the wait
/// timed out. Any other error is returned.
pub fn skip_unless<T>(result: Result<T>) -> Result<ControlFlow<Outcome, T>> {
    match result {
        Ok(value) => Ok(ControlFlow::Continue(value)),
        Err(Error::Wait(WaitError::Timeout { description, .. })) => {
            info!("Skipping: precondition not met ({})", description);
            Ok(ControlFlow::Break(Outcome::Skipped(format!(
                "precondition not met: {}",
                description
            ))))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ElementVisible;
    use crate::driver::Locator;
    use crate::poll::PollSpec;
    use crate::session::Session;
    use crate::testing::{FakeBrowser, FakeElement};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_skip() {
        let browser = FakeBrowser::new("https://shop.example");
        let session = Session::attach(browser).await.unwrap();
        let spec = PollSpec::from_millis(500, 100).unwrap();

        let waited = session
            .wait(&ElementVisible::new(Locator::id("logout")), spec)
            .await;
        match skip_unless(waited).unwrap() {
            ControlFlow::Break(outcome) => {
                assert!(outcome.is_skipped());
                assert!(outcome.to_string().contains("logout"), "{outcome}");
            }
            ControlFlow::Continue(_) => panic!("expected skip"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_met_precondition_continues() {
        let browser = FakeBrowser::new("https://shop.example");
        let logout = Locator::id("logout");
        browser.add_element_after(
            Duration::from_millis(200),
            &browser.first_handle(),
            FakeElement::new(logout.clone()),
        );
        let session = Session::attach(browser).await.unwrap();
        let spec = PollSpec::from_millis(500, 100).unwrap();

        let waited = session.wait(&ElementVisible::new(logout), spec).await;
        assert!(matches!(skip_unless(waited).unwrap(), ControlFlow::Continue(_)));
    }

    #[test]
    fn test_cancellation_is_not_a_skip() {
        let cancelled: Result<()> = Err(Error::Wait(WaitError::Cancelled {
            description: "anything".into(),
            elapsed: Duration::ZERO,
        }));
        assert!(skip_unless(cancelled).is_err());
    }

    #[test]
    fn test_outcome_serializes_with_status() {
        let json = serde_json::to_value(Outcome::Skipped("no banner".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "skipped", "reason": "no banner"}));
        let json = serde_json::to_value(Outcome::Passed).unwrap();
        assert_eq!(json, serde_json::json!({"status": "passed"}));
    }
}
