use super::steps::Target;
use crate::Result;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;
use tabsync::{
    AttributeContains, Condition, Elapsed, ElementCountAtLeast, ElementHidden, ElementPresent,
    ElementVisible, TextContains, TitleContains, TitleIs, UrlContains, UrlIs, UrlMatches,
    WindowCountAtLeast, WindowCountIs,
};

/// A condition as written in a scenario: a map with a single key.
///
/// ```yaml
/// all:
///   - url_contains: "/inventory"
///   - not:
///       visible: { selector: ".error" }
/// ```
#[derive(Debug, Clone)]
pub enum ConditionSpec {
    UrlContains(String),
    UrlIs(String),
    UrlMatches(String),
    TitleContains(String),
    TitleIs(String),
    Present(Target),
    Visible(Target),
    Hidden(Target),
    CountAtLeast(CountSpec),
    Text(TextSpec),
    Attribute(AttributeSpec),
    WindowCountAtLeast(usize),
    WindowCountIs(usize),
    /// Fixed delay. Prefer a real condition.
    ElapsedMs(u64),
    All(Vec<ConditionSpec>),
    Any(Vec<ConditionSpec>),
    Not(Box<ConditionSpec>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountSpec {
    #[serde(flatten)]
    pub target: Target,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextSpec {
    #[serde(flatten)]
    pub target: Target,
    pub contains: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeSpec {
    #[serde(flatten)]
    pub target: Target,
    pub name: String,
    pub contains: String,
}

impl ConditionSpec {
    /// Build the runtime condition. `elapsed_ms` starts counting here.
    pub fn build(&self) -> Result<Box<dyn Condition>> {
        let condition: Box<dyn Condition> = match self {
            Self::UrlContains(s) => Box::new(UrlContains::new(s.as_str())),
            Self::UrlIs(s) => Box::new(UrlIs::new(s.as_str())),
            Self::UrlMatches(p) => Box::new(UrlMatches::new(p)?),
            Self::TitleContains(s) => Box::new(TitleContains::new(s.as_str())),
            Self::TitleIs(s) => Box::new(TitleIs::new(s.as_str())),
            Self::Present(t) => Box::new(ElementPresent::new(t.locator()?)),
            Self::Visible(t) => Box::new(ElementVisible::new(t.locator()?)),
            Self::Hidden(t) => Box::new(ElementHidden::new(t.locator()?)),
            Self::CountAtLeast(c) => Box::new(ElementCountAtLeast::new(c.target.locator()?, c.count)),
            Self::Text(t) => Box::new(TextContains::new(t.target.locator()?, t.contains.as_str())),
            Self::Attribute(a) => Box::new(AttributeContains::new(
                a.target.locator()?,
                a.name.as_str(),
                a.contains.as_str(),
            )),
            Self::WindowCountAtLeast(n) => Box::new(WindowCountAtLeast(*n)),
            Self::WindowCountIs(n) => Box::new(WindowCountIs(*n)),
            Self::ElapsedMs(ms) => Box::new(Elapsed::new(Duration::from_millis(*ms))),
            Self::All(children) => Box::new(tabsync::all(build_all(children)?)),
            Self::Any(children) => Box::new(tabsync::any(build_all(children)?)),
            Self::Not(inner) => Box::new(tabsync::not(inner.build()?)),
        };
        Ok(condition)
    }

    /// Check locators and patterns without building anything stateful.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::UrlMatches(p) => UrlMatches::new(p).map(drop)?,
            Self::Present(t) | Self::Visible(t) | Self::Hidden(t) => t.locator().map(drop)?,
            Self::CountAtLeast(CountSpec { target, .. })
            | Self::Text(TextSpec { target, .. })
            | Self::Attribute(AttributeSpec { target, .. }) => target.locator().map(drop)?,
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.validate()?;
                }
            }
            Self::Not(inner) => inner.validate()?,
            _ => {}
        }
        Ok(())
    }
}

pub(crate) fn build_all(specs: &[ConditionSpec]) -> Result<Vec<Box<dyn Condition>>> {
    specs.iter().map(ConditionSpec::build).collect()
}

const CONDITION_NAMES: &[&str] = &[
    "url_contains",
    "url_is",
    "url_matches",
    "title_contains",
    "title_is",
    "present",
    "visible",
    "hidden",
    "count_at_least",
    "text",
    "attribute",
    "window_count_at_least",
    "window_count_is",
    "elapsed_ms",
    "all",
    "any",
    "not",
];

impl<'de> Deserialize<'de> for ConditionSpec {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ConditionVisitor)
    }
}

struct ConditionVisitor;

impl<'de> Visitor<'de> for ConditionVisitor {
    type Value = ConditionSpec;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a condition map with a single key")
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected condition type key"))?;

        let spec = match key.as_str() {
            "url_contains" => ConditionSpec::UrlContains(map.next_value()?),
            "url_is" => ConditionSpec::UrlIs(map.next_value()?),
            "url_matches" => ConditionSpec::UrlMatches(map.next_value()?),
            "title_contains" => ConditionSpec::TitleContains(map.next_value()?),
            "title_is" => ConditionSpec::TitleIs(map.next_value()?),
            "present" => ConditionSpec::Present(map.next_value()?),
            "visible" => ConditionSpec::Visible(map.next_value()?),
            "hidden" => ConditionSpec::Hidden(map.next_value()?),
            "count_at_least" => ConditionSpec::CountAtLeast(map.next_value()?),
            "text" => ConditionSpec::Text(map.next_value()?),
            "attribute" => ConditionSpec::Attribute(map.next_value()?),
            "window_count_at_least" => ConditionSpec::WindowCountAtLeast(map.next_value()?),
            "window_count_is" => ConditionSpec::WindowCountIs(map.next_value()?),
            "elapsed_ms" => ConditionSpec::ElapsedMs(map.next_value()?),
            "all" => ConditionSpec::All(map.next_value()?),
            "any" => ConditionSpec::Any(map.next_value()?),
            "not" => ConditionSpec::Not(Box::new(map.next_value()?)),
            other => return Err(de::Error::unknown_variant(other, CONDITION_NAMES)),
        };

        if let Some(extra) = map.next_key::<String>()? {
            return Err(de::Error::custom(format!(
                "condition '{}' must be the only key (found '{}')",
                key, extra
            )));
        }
        Ok(spec)
    }
}
