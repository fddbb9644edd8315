use super::condition::ConditionSpec;
use crate::{Error, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use tabsync::{Locator, PollSpec};

/// An element, by exactly one of CSS selector, XPath or id.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Target {
    /// CSS selector.
    pub selector: Option<String>,
    pub xpath: Option<String>,
    pub id: Option<String>,
}

impl Target {
    pub fn locator(&self) -> Result<Locator> {
        match (&self.selector, &self.xpath, &self.id) {
            (Some(css), None, None) => Ok(Locator::css(css.as_str())),
            (None, Some(xpath), None) => Ok(Locator::xpath(xpath.as_str())),
            (None, None, Some(id)) => Ok(Locator::id(id.as_str())),
            (None, None, None) => Err(Error::Config(
                "target needs one of selector, xpath or id".into(),
            )),
            _ => Err(Error::Config(format!(
                "target must use exactly one of selector, xpath or id ({})",
                self
            ))),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            self.selector.as_ref().map(|s| format!("selector '{}'", s)),
            self.xpath.as_ref().map(|x| format!("xpath '{}'", x)),
            self.id.as_ref().map(|i| format!("id '{}'", i)),
        ]
        .into_iter()
        .flatten()
        .collect();
        if parts.is_empty() {
            write!(f, "unknown")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// One step of a scenario.
#[derive(Debug, Clone)]
pub enum Step {
    Goto(GotoStep),
    Click(Target),
    Fill(FillStep),

    /// Poll until a condition holds; fail on timeout.
    Wait(WaitStep),
    /// Poll until a condition holds; skip the scenario on timeout.
    SkipUnless(WaitStep),
    /// Check a condition once.
    Assert(ConditionSpec),

    /// Click something that opens a window, verify it, close it.
    NewWindow(NewWindowStep),

    Log(LogStep),
    Repeat(RepeatStep),
}

impl Step {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::Click(_) => "click",
            Self::Fill(_) => "fill",
            Self::Wait(_) => "wait",
            Self::SkipUnless(_) => "skip_unless",
            Self::Assert(_) => "assert",
            Self::NewWindow(_) => "new_window",
            Self::Log(_) => "log",
            Self::Repeat(_) => "repeat",
        }
    }

    /// Resolve every locator and pattern in this step and its children.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Goto(g) if g.url.is_empty() => Err(Error::Config("goto.url is empty".into())),
            Self::Goto(_) | Self::Log(_) => Ok(()),
            Self::Click(t) => t.locator().map(drop),
            Self::Fill(f) => f.target.locator().map(drop),
            Self::Wait(w) | Self::SkipUnless(w) => w.until.validate(),
            Self::Assert(c) => c.validate(),
            Self::NewWindow(n) => {
                n.click.locator()?;
                for c in &n.verify {
                    c.validate()?;
                }
                match &n.pick {
                    Some(pick) => pick.validate(),
                    None => Ok(()),
                }
            }
            Self::Repeat(r) => r.steps.iter().try_for_each(Step::validate),
        }
    }
}

const STEP_NAMES: &[&str] = &[
    "goto",
    "click",
    "fill",
    "wait",
    "skip_unless",
    "assert",
    "new_window",
    "log",
    "repeat",
];

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(StepVisitor)
    }
}

struct StepVisitor;

impl<'de> Visitor<'de> for StepVisitor {
    type Value = Step;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a step map with a single key")
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected step type key"))?;

        let step = match key.as_str() {
            "goto" => Step::Goto(map.next_value()?),
            "click" => Step::Click(map.next_value()?),
            "fill" => Step::Fill(map.next_value()?),
            "wait" => Step::Wait(map.next_value()?),
            "skip_unless" => Step::SkipUnless(map.next_value()?),
            "assert" => Step::Assert(map.next_value()?),
            "new_window" => Step::NewWindow(map.next_value()?),
            "log" => Step::Log(map.next_value()?),
            "repeat" => Step::Repeat(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, STEP_NAMES)),
        };

        if let Some(extra) = map.next_key::<String>()? {
            return Err(de::Error::custom(format!(
                "step '{}' must be the only key (found '{}')",
                key, extra
            )));
        }
        Ok(step)
    }
}

// --- Step payloads ---

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GotoStep {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillStep {
    #[serde(flatten)]
    pub target: Target,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitStep {
    pub until: ConditionSpec,
    /// Overrides the scenario's `sync.poll`.
    pub poll: Option<PollSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewWindowStep {
    /// Element whose click opens the window.
    pub click: Target,
    /// Conditions awaited inside the new window.
    #[serde(default)]
    pub verify: Vec<ConditionSpec>,
    /// Chooses among several new windows.
    pub pick: Option<ConditionSpec>,
    /// Overrides the scenario's `sync.switch`.
    pub poll: Option<PollSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogStep {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepeatStep {
    pub times: u32,
    pub steps: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_display() {
        let t = Target {
            selector: Some("#a".into()),
            id: Some("a".into()),
            ..Default::default()
        };
        assert_eq!(t.to_string(), "selector '#a', id 'a'");
        assert_eq!(Target::default().to_string(), "unknown");
    }

    #[test]
    fn test_step_names_cover_parser() {
        let yaml = r##"
- goto: { url: "https://a.test" }
- click: { id: "b" }
- fill: { selector: "#c", value: "d" }
- wait: { until: { url_contains: "e" } }
- skip_unless: { until: { title_contains: "f" } }
- assert: { window_count_is: 1 }
- new_window: { click: { selector: "a" } }
- log: { message: "g" }
- repeat: { times: 1, steps: [] }
"##;
        let steps: Vec<Step> = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<&str> = steps.iter().map(Step::name).collect();
        assert_eq!(names, STEP_NAMES);
    }

    #[test]
    fn test_validate_descends_into_repeat() {
        let yaml = "repeat:\n  times: 2\n  steps:\n    - click: {}\n";
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(step.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_wait_rejects_unknown_fields() {
        let yaml = "wait:\n  until:\n    url_contains: a\n  timeout_ms: 100\n";
        assert!(serde_yaml::from_str::<Step>(yaml).is_err());
    }
}
