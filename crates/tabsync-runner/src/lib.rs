//! # tabsync-runner
//!
//! Browser scenarios in YAML. Every wait polls a condition with a bounded
//! timeout, and links that open new tabs are followed, verified and closed
//! without losing the original tab.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabsync_runner::{Runner, Scenario};
//!
//! # #[tokio::main]
//! # async fn main() -> tabsync_runner::Result<()> {
//! let scenario = Scenario::load("login.yaml")?;
//! let mut runner = Runner::launch(&scenario.browser).await?;
//! let report = runner.run(&scenario).await?;
//! println!("Outcome: {}", report.outcome);
//! runner.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod runner;

pub use config::{
    ConditionSpec, OnFailure, ParamDef, Params, RetryConfig, Scenario, Step, SuccessCondition,
    Target, TargetUrl,
};
pub use runner::{RunReport, Runner};

/// Result type for tabsync-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during scenario loading or execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error(transparent)]
    Driver(#[from] tabsync::DriverError),

    #[error(transparent)]
    Sync(#[from] tabsync::Error),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),
}

impl Error {
    /// The session can no longer be trusted; retrying on it is pointless.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Sync(e) => e.is_fatal(),
            Self::Driver(e) => e.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_minimal_scenario() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        assert_eq!(scenario.name, "Test");
        assert_eq!(scenario.target.url, "https://example.com");
        assert!(scenario.steps.is_empty());
        assert!(!scenario.browser.headless);
        assert_eq!(scenario.sync, tabsync::SyncConfig::default());
    }

    #[test]
    fn test_parse_browser_and_sync() {
        let yaml = r##"
name: "Test"
browser:
  headless: true
  proxy: "http://localhost:8080"
  user_agent: "Custom UA"
sync:
  poll:
    timeout_ms: 3000
    interval_ms: 100
  switch:
    timeout_ms: 8000
target:
  url: "https://example.com"
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        assert!(scenario.browser.headless);
        assert_eq!(scenario.browser.proxy, Some("http://localhost:8080".into()));
        assert_eq!(scenario.browser.user_agent, Some("Custom UA".into()));
        assert_eq!(scenario.sync.poll.timeout(), Duration::from_secs(3));
        assert_eq!(scenario.sync.poll.interval(), Duration::from_millis(100));
        assert_eq!(scenario.sync.switch.timeout(), Duration::from_secs(8));
    }

    #[test]
    fn test_parse_interaction_steps() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  - goto:
      url: "https://other.com"
  - fill:
      selector: "#user-name"
      value: "standard_user"
  - click:
      id: "login-button"
  - click:
      xpath: "//a[text()='About']"
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        assert_eq!(scenario.steps.len(), 4);

        if let Step::Goto(s) = &scenario.steps[0] {
            assert_eq!(s.url, "https://other.com");
        } else {
            panic!("Expected Goto step");
        }

        if let Step::Fill(s) = &scenario.steps[1] {
            assert_eq!(s.target.locator().unwrap(), tabsync::Locator::css("#user-name"));
            assert_eq!(s.value, "standard_user");
        } else {
            panic!("Expected Fill step");
        }

        if let Step::Click(t) = &scenario.steps[2] {
            assert_eq!(t.locator().unwrap(), tabsync::Locator::id("login-button"));
        } else {
            panic!("Expected Click step");
        }

        if let Step::Click(t) = &scenario.steps[3] {
            assert_eq!(
                t.locator().unwrap(),
                tabsync::Locator::xpath("//a[text()='About']")
            );
        } else {
            panic!("Expected Click step");
        }
    }

    #[test]
    fn test_parse_wait_steps() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  - wait:
      until:
        url_contains: "/inventory"
  - wait:
      until:
        visible:
          id: "logout"
      poll:
        timeout_ms: 2000
        interval_ms: 250
  - skip_unless:
      until:
        present:
          selector: ".promo"
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        assert_eq!(scenario.steps.len(), 3);

        if let Step::Wait(w) = &scenario.steps[0] {
            assert!(matches!(&w.until, ConditionSpec::UrlContains(s) if s == "/inventory"));
            assert!(w.poll.is_none());
        } else {
            panic!("Expected Wait step");
        }

        if let Step::Wait(w) = &scenario.steps[1] {
            let poll = w.poll.unwrap();
            assert_eq!(poll.timeout(), Duration::from_secs(2));
            assert_eq!(poll.interval(), Duration::from_millis(250));
        } else {
            panic!("Expected Wait step");
        }

        assert!(matches!(scenario.steps[2], Step::SkipUnless(_)));
    }

    #[test]
    fn test_parse_new_window_step() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  - new_window:
      click:
        selector: "a.social_twitter"
      verify:
        - url_contains: "twitter.com"
        - title_contains: "Sauce"
      pick:
        url_contains: "twitter"
      poll:
        timeout_ms: 5000
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        if let Step::NewWindow(n) = &scenario.steps[0] {
            assert_eq!(
                n.click.locator().unwrap(),
                tabsync::Locator::css("a.social_twitter")
            );
            assert_eq!(n.verify.len(), 2);
            assert!(n.pick.is_some());
            assert_eq!(n.poll.unwrap().timeout(), Duration::from_secs(5));
        } else {
            panic!("Expected NewWindow step");
        }
    }

    #[test]
    fn test_parse_control_flow() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  - log:
      message: "starting"
  - assert:
      not:
        visible:
          selector: ".error"
  - repeat:
      times: 3
      steps:
        - click:
            selector: ".add"
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        assert_eq!(scenario.steps.len(), 3);

        if let Step::Log(l) = &scenario.steps[0] {
            assert_eq!(l.message, "starting");
        } else {
            panic!("Expected Log step");
        }

        assert!(matches!(
            &scenario.steps[1],
            Step::Assert(ConditionSpec::Not(_))
        ));

        if let Step::Repeat(r) = &scenario.steps[2] {
            assert_eq!(r.times, 3);
            assert_eq!(r.steps.len(), 1);
        } else {
            panic!("Expected Repeat step");
        }
    }

    #[test]
    fn test_parse_success_and_retry() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
success:
  all:
    - url_contains: "/done"
    - window_count_is: 1
on_failure:
  retry:
    attempts: 3
    delay_ms: 500
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        let success = scenario.success.unwrap();
        assert_eq!(success.all.unwrap().len(), 2);
        let retry = scenario.on_failure.unwrap().retry.unwrap();
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.delay_ms, 500);
    }

    #[test]
    fn test_unknown_step_rejected() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  - sleep:
      ms: 1000
"##;
        let err = Scenario::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("sleep"), "{err}");
    }

    #[test]
    fn test_validation_errors() {
        let no_name = "name: \"\"\ntarget:\n  url: \"https://example.com\"\n";
        assert!(matches!(Scenario::parse(no_name), Err(Error::Config(_))));

        let both = r##"
name: "Test"
target:
  url: "https://example.com"
success:
  any:
    - url_contains: "a"
  all:
    - url_contains: "b"
"##;
        assert!(matches!(Scenario::parse(both), Err(Error::Config(_))));

        let bad_regex = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  - wait:
      until:
        url_matches: "(unclosed"
"##;
        assert!(matches!(Scenario::parse(bad_regex), Err(Error::Sync(_))));

        let two_locators = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  - click:
      selector: "#a"
      id: "a"
"##;
        assert!(matches!(Scenario::parse(two_locators), Err(Error::Config(_))));
    }
}
