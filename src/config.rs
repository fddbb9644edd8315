//! Timeout and interval defaults loaded from YAML.
//!
//! ```yaml
//! poll:
//!   timeout_ms: 10000
//!   interval_ms: 500
//! switch:
//!   timeout_ms: 5000
//!   interval_ms: 200
//! ```
//!
//! Both sections are optional. Values are validated while parsing, so a
//! loaded config always holds usable [`PollSpec`]s.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::poll::PollSpec;

/// Poll settings for plain waits and for new-window switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Used by condition waits.
    #[serde(default)]
    pub poll: PollSpec,
    /// Used while waiting for a new window to appear.
    #[serde(default)]
    pub switch: PollSpec,
}

impl SyncConfig {
    /// Load config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config from a YAML string. An empty document yields defaults.
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;

    #[test]
    fn test_parse_full() {
        let config = SyncConfig::parse(
            r#"
poll:
  timeout_ms: 2000
  interval_ms: 200
switch:
  timeout_ms: 5000
  interval_ms: 250
"#,
        )
        .unwrap();
        assert_eq!(config.poll.timeout(), Duration::from_secs(2));
        assert_eq!(config.switch.interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = SyncConfig::parse("poll:\n  timeout_ms: 3000\n").unwrap();
        assert_eq!(config.poll.timeout(), Duration::from_secs(3));
        assert_eq!(config.switch, PollSpec::default());
        assert_eq!(SyncConfig::parse("").unwrap(), SyncConfig::default());
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let err = SyncConfig::parse("poll:\n  timeout_ms: 100\n  interval_ms: 0\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
        assert!(err.to_string().contains("interval"), "{err}");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(SyncConfig::parse("pol:\n  timeout_ms: 100\n").is_err());
        assert!(SyncConfig::parse("poll:\n  timeout: 100\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = SyncConfig::load("/nonexistent/tabsync.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
