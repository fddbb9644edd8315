//! The slice of a browser driver that tabsync needs.
//!
//! Bindings implement [`Driver`] for their connection type. The engine only
//! ever calls the window methods and `current_url`; element queries exist so
//! that [`Condition`](crate::Condition)s can look at the page.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DriverError;

/// Result type for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Opaque identifier of one browser window or tab.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Handle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Handle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How to find elements. Interpretation is up to the binding.
///
/// Deserializes from a map with a single key: `css: "#btn"`,
/// `xpath: "//a"` or `id: "login"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
    Id(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// CSS equivalent, when one exists.
    pub fn to_css(&self) -> Option<String> {
        match self {
            Self::Css(s) => Some(s.clone()),
            Self::Id(id) => Some(format!("[id=\"{}\"]", id.replace('"', "\\\""))),
            Self::XPath(_) => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css '{}'", s),
            Self::XPath(x) => write!(f, "xpath '{}'", x),
            Self::Id(id) => write!(f, "id '{}'", id),
        }
    }
}

const LOCATOR_KINDS: &[&str] = &["css", "xpath", "id"];

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(LocatorVisitor)
    }
}

struct LocatorVisitor;

impl<'de> Visitor<'de> for LocatorVisitor {
    type Value = Locator;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a locator map with one of css, xpath or id")
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let kind: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected locator kind key"))?;

        let locator = match kind.as_str() {
            "css" => Locator::Css(map.next_value()?),
            "xpath" => Locator::XPath(map.next_value()?),
            "id" => Locator::Id(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, LOCATOR_KINDS)),
        };

        if let Some(extra) = map.next_key::<String>()? {
            return Err(de::Error::custom(format!(
                "locator '{}' must be the only key (found '{}')",
                kind, extra
            )));
        }
        Ok(locator)
    }
}

/// Reference to the `index`-th match of `locator` at lookup time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub locator: Locator,
    pub index: usize,
}

impl ElementRef {
    pub fn new(locator: Locator, index: usize) -> Self {
        Self { locator, index }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.locator, self.index)
    }
}

/// Read-only view of a remote browser, plus window switching.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Handle of the window commands currently target.
    async fn current_window_handle(&self) -> DriverResult<Handle>;

    /// Every open window or tab.
    async fn all_window_handles(&self) -> DriverResult<BTreeSet<Handle>>;

    /// Retarget commands to `handle`. Fails with `NoSuchWindow` if it is gone.
    async fn switch_to_window(&self, handle: &Handle) -> DriverResult<()>;

    /// Close `handle`. May fail with `NoSuchWindow`; callers treat that as done.
    async fn close_window(&self, handle: &Handle) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;

    async fn title(&self) -> DriverResult<String>;

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementRef>>;

    async fn is_displayed(&self, element: &ElementRef) -> DriverResult<bool>;

    async fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>>;

    /// Rendered text of the element.
    async fn text(&self, element: &ElementRef) -> DriverResult<String>;
}

/// Page interactions used by flows. The engine never calls these.
#[async_trait]
pub trait Interact: Driver {
    async fn goto(&self, url: &str) -> DriverResult<()>;

    async fn click(&self, locator: &Locator) -> DriverResult<()>;

    async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()>;
}
