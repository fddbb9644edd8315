mod executor;

use crate::config::Scenario;
use crate::Result;
use serde::Serialize;
use std::ops::ControlFlow;
use std::time::Duration;
use tabsync::{Condition, Interact, Outcome, Session};
use tabsync_eoka::{EokaDriver, LaunchConfig};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What running a scenario produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: Outcome,
    /// Steps completed in the last attempt.
    pub steps_executed: usize,
    pub duration_ms: u64,
    pub retries: u32,
}

impl RunReport {
    /// Passed or skipped.
    pub fn is_success(&self) -> bool {
        !self.outcome.is_failed()
    }
}

/// Executes scenarios against one browser session.
pub struct Runner<D> {
    session: Session<D>,
}

impl Runner<EokaDriver> {
    /// Launch a browser for `config` and attach to its first tab.
    pub async fn launch(config: &LaunchConfig) -> Result<Self> {
        let driver = EokaDriver::launch(config).await?;
        Self::new(driver).await
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.session.into_driver().close().await?;
        Ok(())
    }
}

impl<D: Interact> Runner<D> {
    pub async fn new(driver: D) -> Result<Self> {
        Ok(Self {
            session: Session::attach(driver).await?,
        })
    }

    pub fn session(&self) -> &Session<D> {
        &self.session
    }

    /// Run the scenario, retrying failed attempts as configured.
    ///
    /// A skip ends the run at once. A corrupted session is returned as an
    /// error, since no later attempt could trust which tab it drives.
    pub async fn run(&mut self, scenario: &Scenario) -> Result<RunReport> {
        let start = Instant::now();
        let retry = scenario.on_failure.as_ref().and_then(|f| f.retry.as_ref());
        let max_attempts = retry.map(|r| r.attempts).unwrap_or(1);
        let retry_delay = retry.map(|r| r.delay_ms).unwrap_or(0);

        let mut last_failure = String::new();
        let mut steps_executed = 0;
        let mut retries = 0;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                retries += 1;
                info!("Retry attempt {}/{}", attempt, max_attempts);
                if retry_delay > 0 {
                    tokio::time::sleep(Duration::from_millis(retry_delay)).await;
                }
            }

            steps_executed = 0;
            match self.run_once(scenario, &mut steps_executed).await {
                Ok(Outcome::Failed(reason)) => {
                    warn!("Attempt {} failed: {}", attempt, reason);
                    last_failure = reason;
                }
                Ok(outcome) => {
                    return Ok(RunReport {
                        outcome,
                        steps_executed,
                        duration_ms: start.elapsed().as_millis() as u64,
                        retries,
                    });
                }
                Err(e) if e.is_fatal() => {
                    error!("Attempt {} aborted: {}", attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Attempt {} failed: {}", attempt, e);
                    last_failure = e.to_string();
                }
            }
        }

        Ok(RunReport {
            outcome: Outcome::Failed(last_failure),
            steps_executed,
            duration_ms: start.elapsed().as_millis() as u64,
            retries,
        })
    }

    async fn run_once(&mut self, scenario: &Scenario, executed: &mut usize) -> Result<Outcome> {
        info!("Navigating to: {}", scenario.target.url);
        self.session.driver().goto(&scenario.target.url).await?;

        for (i, step) in scenario.steps.iter().enumerate() {
            debug!("Executing step {}: {}", i + 1, step.name());
            let flow = executor::execute(&mut self.session, step, &scenario.sync).await?;
            *executed += 1;
            if let ControlFlow::Break(outcome) = flow {
                return Ok(outcome);
            }
        }

        let success = self.check_success(scenario).await?;
        debug!("Success check: {}", success);
        if success {
            Ok(Outcome::Passed)
        } else {
            Ok(Outcome::Failed("success conditions not met".into()))
        }
    }

    async fn check_success(&self, scenario: &Scenario) -> Result<bool> {
        let Some(ref success) = scenario.success else {
            return Ok(true);
        };

        if let Some(ref any) = success.any {
            for spec in any {
                if self.holds(&*spec.build()?).await? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        if let Some(ref all) = success.all {
            for spec in all {
                if !self.holds(&*spec.build()?).await? {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    async fn holds(&self, condition: &dyn Condition) -> Result<bool> {
        let check = condition.check(self.session.driver()).await?;
        debug!(
            "Success condition '{}': {} (observed: {})",
            condition.describe(),
            check.satisfied,
            check.observed
        );
        Ok(check.satisfied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabsync::testing::{ClickEffect, FakeBrowser, FakeElement};
    use tabsync::Locator;

    const LOGIN: &str = r##"
name: "Login"
target:
  url: "https://shop.test/"
sync:
  poll:
    timeout_ms: 2000
    interval_ms: 100
steps:
  - fill:
      selector: "#user-name"
      value: "standard_user"
  - click:
      id: "login-button"
  - wait:
      until:
        url_contains: "inventory"
success:
  all:
    - url_contains: "inventory"
    - window_count_is: 1
"##;

    fn login_page() -> FakeBrowser {
        let browser = FakeBrowser::new("about:blank");
        let w0 = browser.first_handle();
        browser.add_element(&w0, FakeElement::new(Locator::css("#user-name")));
        browser.add_element(&w0, FakeElement::new(Locator::id("login-button")));
        browser.on_click(
            Locator::id("login-button"),
            ClickEffect::Navigate {
                url: "https://shop.test/inventory.html".into(),
                after: Duration::from_millis(250),
            },
        );
        browser
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_passes() {
        let scenario = Scenario::parse(LOGIN).unwrap();
        let mut runner = Runner::new(login_page()).await.unwrap();

        let report = runner.run(&scenario).await.unwrap();
        assert_eq!(report.outcome, Outcome::Passed);
        assert!(report.is_success());
        assert_eq!(report.steps_executed, 3);
        assert_eq!(report.retries, 0);
        assert_eq!(report.duration_ms, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_are_retried() {
        let yaml = r##"
name: "Never"
target:
  url: "https://shop.test/"
steps:
  - wait:
      until:
        url_contains: "never"
      poll:
        timeout_ms: 1000
        interval_ms: 500
on_failure:
  retry:
    attempts: 3
    delay_ms: 200
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        let mut runner = Runner::new(FakeBrowser::new("about:blank")).await.unwrap();

        let report = runner.run(&scenario).await.unwrap();
        assert!(report.outcome.is_failed());
        assert!(!report.is_success());
        assert_eq!(report.retries, 2);
        assert_eq!(report.steps_executed, 0);
        assert_eq!(report.duration_ms, 3 * 1000 + 2 * 200);
        let Outcome::Failed(reason) = &report.outcome else {
            unreachable!()
        };
        assert!(reason.contains("url contains 'never'"), "{reason}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_is_not_retried() {
        let yaml = r##"
name: "Promo"
target:
  url: "https://shop.test/"
steps:
  - log:
      message: "checking promo"
  - skip_unless:
      until:
        visible:
          selector: ".promo"
      poll:
        timeout_ms: 300
        interval_ms: 100
  - click:
      selector: ".promo"
on_failure:
  retry:
    attempts: 5
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        let mut runner = Runner::new(FakeBrowser::new("about:blank")).await.unwrap();

        let report = runner.run(&scenario).await.unwrap();
        assert!(report.outcome.is_skipped(), "{}", report.outcome);
        assert!(report.is_success());
        assert_eq!(report.retries, 0);
        assert_eq!(report.steps_executed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmet_success_condition_fails() {
        let yaml = r##"
name: "Any"
target:
  url: "https://shop.test/"
success:
  any:
    - url_contains: "checkout"
    - title_is: "Done"
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        let mut runner = Runner::new(FakeBrowser::new("about:blank")).await.unwrap();

        let report = runner.run(&scenario).await.unwrap();
        assert_eq!(
            report.outcome,
            Outcome::Failed("success conditions not met".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupted_session_aborts_without_retry() {
        let yaml = r##"
name: "Popup"
target:
  url: "https://shop.test/"
steps:
  - new_window:
      click:
        selector: "a.about"
      verify:
        - url_contains: "about"
        - elapsed_ms: 200
on_failure:
  retry:
    attempts: 3
"##;
        let browser = FakeBrowser::new("about:blank");
        let w0 = browser.first_handle();
        browser.add_element(&w0, FakeElement::new(Locator::css("a.about")));
        browser.on_click(
            Locator::css("a.about"),
            ClickEffect::OpenWindow {
                url: "https://shop.test/about".into(),
                after: Duration::ZERO,
            },
        );
        // The origin tab goes away while the popup is being verified.
        browser.close_window_after(Duration::from_millis(100), &w0);

        let scenario = Scenario::parse(yaml).unwrap();
        let mut runner = Runner::new(browser.clone()).await.unwrap();

        let err = runner.run(&scenario).await.unwrap_err();
        assert!(err.is_fatal(), "{err}");
        assert!(runner.session().is_corrupted());
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport {
            outcome: Outcome::Skipped("precondition not met: x".into()),
            steps_executed: 2,
            duration_ms: 40,
            retries: 0,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "skipped");
        assert_eq!(json["steps_executed"], 2);
    }
}
