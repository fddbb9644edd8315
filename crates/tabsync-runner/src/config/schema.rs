use super::condition::ConditionSpec;
use super::params::{self, ParamDef, Params};
use super::Step;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tabsync::SyncConfig;
use tabsync_eoka::LaunchConfig;

/// A scenario file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,

    /// Parameter declarations, substituted as `${name}` everywhere else.
    #[serde(default)]
    pub params: HashMap<String, ParamDef>,

    #[serde(default)]
    pub browser: LaunchConfig,

    /// Default poll settings for waits and new-window switches.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Page loaded before the first step of every attempt.
    pub target: TargetUrl,

    #[serde(default)]
    pub steps: Vec<Step>,

    /// Checked once after the last step.
    pub success: Option<SuccessCondition>,

    pub on_failure: Option<OnFailure>,
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_params(path, &Params::new())
    }

    pub fn load_with_params<P: AsRef<Path>>(path: P, params: &Params) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse_with_params(&content, params)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        Self::parse_with_params(yaml, &Params::new())
    }

    /// Parse with `${name}` substitution.
    ///
    /// Declarations are read first, so defaults apply and missing required
    /// parameters are reported before anything else is deserialized.
    pub fn parse_with_params(yaml: &str, params: &Params) -> Result<Self> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(yaml)?;

        let defs: HashMap<String, ParamDef> = match value.get("params") {
            Some(v) => serde_yaml::from_value(v.clone())?,
            None => HashMap::new(),
        };
        let resolved = params.resolve(&defs)?;

        if let serde_yaml::Value::Mapping(map) = &mut value {
            for (key, v) in map.iter_mut() {
                if key.as_str() != Some("params") {
                    params::substitute_value(v, &resolved);
                }
            }
        }

        let scenario: Scenario = serde_yaml::from_value(value)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("name is required".into()));
        }
        if self.target.url.is_empty() {
            return Err(Error::Config("target.url is required".into()));
        }
        for (i, step) in self.steps.iter().enumerate() {
            step.validate().map_err(|e| match e {
                Error::Config(msg) => {
                    Error::Config(format!("step {} ({}): {}", i + 1, step.name(), msg))
                }
                other => other,
            })?;
        }
        if let Some(ref success) = self.success {
            if success.any.is_some() && success.all.is_some() {
                return Err(Error::Config(
                    "success: specify either 'any' or 'all', not both".into(),
                ));
            }
            for c in success.conditions() {
                c.validate()?;
            }
        }
        if let Some(ref on_failure) = self.on_failure {
            if let Some(ref retry) = on_failure.retry {
                if retry.attempts == 0 {
                    return Err(Error::Config(
                        "on_failure.retry.attempts must be at least 1".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetUrl {
    pub url: String,
}

/// Conditions checked once after the steps ran.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuccessCondition {
    /// At least one must hold.
    pub any: Option<Vec<ConditionSpec>>,

    /// Every one must hold.
    pub all: Option<Vec<ConditionSpec>>,
}

impl SuccessCondition {
    pub fn conditions(&self) -> impl Iterator<Item = &ConditionSpec> {
        self.any.iter().chain(self.all.iter()).flatten()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnFailure {
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}
