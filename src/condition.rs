//! Predicates over remote browser state.
//!
//! A [`Condition`] looks, it never touches: evaluating one must not click,
//! type or navigate. Every condition carries a description that ends up in
//! timeout errors, so a failing wait says what it was waiting for instead of
//! "element not found".
//!
//! Leaves cover URLs, titles, elements and window counts. [`All`], [`Any`]
//! and [`Not`] compose them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::warn;

use crate::driver::{Driver, DriverResult, Locator};
use crate::error::{DriverError, Error, Result};

/// One evaluation: whether the condition holds and what was seen.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub satisfied: bool,
    pub observed: Value,
}

impl Check {
    pub fn met(observed: impl Into<Value>) -> Self {
        Self {
            satisfied: true,
            observed: observed.into(),
        }
    }

    pub fn unmet(observed: impl Into<Value>) -> Self {
        Self {
            satisfied: false,
            observed: observed.into(),
        }
    }

    fn from_bool(satisfied: bool, observed: impl Into<Value>) -> Self {
        Self {
            satisfied,
            observed: observed.into(),
        }
    }
}

/// A named, side-effect-free predicate.
#[async_trait]
pub trait Condition: Send + Sync {
    /// Human-readable text for diagnostics.
    fn describe(&self) -> String;

    /// Evaluate once against the window the driver currently targets.
    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check>;
}

#[async_trait]
impl<C: Condition + ?Sized> Condition for Box<C> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        (**self).check(driver).await
    }
}

#[async_trait]
impl<C: Condition + ?Sized> Condition for Arc<C> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        (**self).check(driver).await
    }
}

/// Combinator helpers available on every sized condition.
pub trait ConditionExt: Condition + Sized + 'static {
    fn boxed(self) -> Box<dyn Condition> {
        Box::new(self)
    }

    fn and<C: Condition + 'static>(self, other: C) -> All {
        All::new(vec![self.boxed(), other.boxed()])
    }

    fn or<C: Condition + 'static>(self, other: C) -> Any {
        Any::new(vec![self.boxed(), other.boxed()])
    }

    fn negate(self) -> Not {
        Not::new(self)
    }
}

impl<C: Condition + Sized + 'static> ConditionExt for C {}

// =============================================================================
// Combinators
// =============================================================================

fn describe_children(children: &[Box<dyn Condition>]) -> String {
    children
        .iter()
        .map(|c| c.describe())
        .collect::<Vec<_>>()
        .join(", ")
}

fn error_value(err: &DriverError) -> Value {
    json!({ "error": err.to_string() })
}

/// Holds when every child holds. Stops at the first child that does not.
pub struct All {
    children: Vec<Box<dyn Condition>>,
}

impl All {
    pub fn new(children: Vec<Box<dyn Condition>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Condition for All {
    fn describe(&self) -> String {
        format!("all of [{}]", describe_children(&self.children))
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let mut observed = Vec::with_capacity(self.children.len());
        let mut first_error = None;
        let mut errors = 0;

        for child in &self.children {
            match child.check(driver).await {
                Ok(check) if !check.satisfied => {
                    observed.push(check.observed);
                    return Ok(Check::unmet(observed));
                }
                Ok(check) => observed.push(check.observed),
                Err(e) => {
                    errors += 1;
                    observed.push(error_value(&e));
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if errors == self.children.len() => Err(e),
            Some(_) => Ok(Check::unmet(observed)),
            None => Ok(Check::met(observed)),
        }
    }
}

/// Holds when any child holds. Stops at the first child that does.
pub struct Any {
    children: Vec<Box<dyn Condition>>,
}

impl Any {
    pub fn new(children: Vec<Box<dyn Condition>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Condition for Any {
    fn describe(&self) -> String {
        format!("any of [{}]", describe_children(&self.children))
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let mut observed = Vec::with_capacity(self.children.len());
        let mut first_error = None;
        let mut errors = 0;

        for child in &self.children {
            match child.check(driver).await {
                Ok(check) if check.satisfied => {
                    observed.push(check.observed);
                    return Ok(Check::met(observed));
                }
                Ok(check) => observed.push(check.observed),
                Err(e) => {
                    errors += 1;
                    observed.push(error_value(&e));
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if errors == self.children.len() => Err(e),
            _ => Ok(Check::unmet(observed)),
        }
    }
}

/// Inverts its child. Errors pass through untouched.
pub struct Not {
    inner: Box<dyn Condition>,
}

impl Not {
    pub fn new(inner: impl Condition + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

#[async_trait]
impl Condition for Not {
    fn describe(&self) -> String {
        format!("not ({})", self.inner.describe())
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let check = self.inner.check(driver).await?;
        Ok(Check::from_bool(!check.satisfied, check.observed))
    }
}

pub fn all(children: Vec<Box<dyn Condition>>) -> All {
    All::new(children)
}

pub fn any(children: Vec<Box<dyn Condition>>) -> Any {
    Any::new(children)
}

pub fn not(inner: impl Condition + 'static) -> Not {
    Not::new(inner)
}

// =============================================================================
// URL and title
// =============================================================================

#[derive(Debug, Clone)]
pub struct UrlContains(pub String);

impl UrlContains {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self(fragment.into())
    }
}

#[async_trait]
impl Condition for UrlContains {
    fn describe(&self) -> String {
        format!("url contains '{}'", self.0)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let url = driver.current_url().await?;
        Ok(Check::from_bool(url.contains(&self.0), url))
    }
}

#[derive(Debug, Clone)]
pub struct UrlIs(pub String);

impl UrlIs {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }
}

#[async_trait]
impl Condition for UrlIs {
    fn describe(&self) -> String {
        format!("url is '{}'", self.0)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let url = driver.current_url().await?;
        Ok(Check::from_bool(url == self.0, url))
    }
}

#[derive(Debug, Clone)]
pub struct UrlMatches(Regex);

impl UrlMatches {
    pub fn new(pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid url pattern '{}': {}", pattern, e)))?;
        Ok(Self(re))
    }
}

#[async_trait]
impl Condition for UrlMatches {
    fn describe(&self) -> String {
        format!("url matches /{}/", self.0.as_str())
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let url = driver.current_url().await?;
        Ok(Check::from_bool(self.0.is_match(&url), url))
    }
}

#[derive(Debug, Clone)]
pub struct TitleContains(pub String);

impl TitleContains {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self(fragment.into())
    }
}

#[async_trait]
impl Condition for TitleContains {
    fn describe(&self) -> String {
        format!("title contains '{}'", self.0)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let title = driver.title().await?;
        Ok(Check::from_bool(title.contains(&self.0), title))
    }
}

#[derive(Debug, Clone)]
pub struct TitleIs(pub String);

impl TitleIs {
    pub fn new(title: impl Into<String>) -> Self {
        Self(title.into())
    }
}

#[async_trait]
impl Condition for TitleIs {
    fn describe(&self) -> String {
        format!("title is '{}'", self.0)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let title = driver.title().await?;
        Ok(Check::from_bool(title == self.0, title))
    }
}

// =============================================================================
// Elements
// =============================================================================

/// At least one element matches.
#[derive(Debug, Clone)]
pub struct ElementPresent(pub Locator);

impl ElementPresent {
    pub fn new(locator: Locator) -> Self {
        Self(locator)
    }
}

#[async_trait]
impl Condition for ElementPresent {
    fn describe(&self) -> String {
        format!("{} is present", self.0)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let found = driver.find_elements(&self.0).await?.len();
        Ok(Check::from_bool(found > 0, json!({ "found": found })))
    }
}

/// The first match exists and is displayed.
#[derive(Debug, Clone)]
pub struct ElementVisible(pub Locator);

impl ElementVisible {
    pub fn new(locator: Locator) -> Self {
        Self(locator)
    }
}

#[async_trait]
impl Condition for ElementVisible {
    fn describe(&self) -> String {
        format!("{} is visible", self.0)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let elements = driver.find_elements(&self.0).await?;
        let Some(first) = elements.first() else {
            return Ok(Check::unmet(json!({ "found": 0 })));
        };
        let displayed = driver.is_displayed(first).await?;
        Ok(Check::from_bool(
            displayed,
            json!({ "found": elements.len(), "displayed": displayed }),
        ))
    }
}

/// No match, or the first match is not displayed. A match that goes stale
/// mid-check counts as gone.
#[derive(Debug, Clone)]
pub struct ElementHidden(pub Locator);

impl ElementHidden {
    pub fn new(locator: Locator) -> Self {
        Self(locator)
    }
}

#[async_trait]
impl Condition for ElementHidden {
    fn describe(&self) -> String {
        format!("{} is hidden", self.0)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let elements = driver.find_elements(&self.0).await?;
        let Some(first) = elements.first() else {
            return Ok(Check::met(json!({ "found": 0 })));
        };
        match driver.is_displayed(first).await {
            Ok(displayed) => Ok(Check::from_bool(
                !displayed,
                json!({ "found": elements.len(), "displayed": displayed }),
            )),
            Err(DriverError::StaleElement) | Err(DriverError::NoSuchElement(_)) => {
                Ok(Check::met(json!({ "found": 0 })))
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElementCountAtLeast {
    pub locator: Locator,
    pub count: usize,
}

impl ElementCountAtLeast {
    pub fn new(locator: Locator, count: usize) -> Self {
        Self { locator, count }
    }
}

#[async_trait]
impl Condition for ElementCountAtLeast {
    fn describe(&self) -> String {
        format!("at least {} of {}", self.count, self.locator)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let found = driver.find_elements(&self.locator).await?.len();
        Ok(Check::from_bool(found >= self.count, found))
    }
}

/// The first match's rendered text contains `text`.
#[derive(Debug, Clone)]
pub struct TextContains {
    pub locator: Locator,
    pub text: String,
}

impl TextContains {
    pub fn new(locator: Locator, text: impl Into<String>) -> Self {
        Self {
            locator,
            text: text.into(),
        }
    }
}

#[async_trait]
impl Condition for TextContains {
    fn describe(&self) -> String {
        format!("{} text contains '{}'", self.locator, self.text)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let elements = driver.find_elements(&self.locator).await?;
        let Some(first) = elements.first() else {
            return Ok(Check::unmet(Value::Null));
        };
        let text = driver.text(first).await?;
        Ok(Check::from_bool(text.contains(&self.text), text))
    }
}

#[derive(Debug, Clone)]
pub struct AttributeContains {
    pub locator: Locator,
    pub name: String,
    pub value: String,
}

impl AttributeContains {
    pub fn new(locator: Locator, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            locator,
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Condition for AttributeContains {
    fn describe(&self) -> String {
        format!(
            "{} attribute '{}' contains '{}'",
            self.locator, self.name, self.value
        )
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let elements = driver.find_elements(&self.locator).await?;
        let Some(first) = elements.first() else {
            return Ok(Check::unmet(Value::Null));
        };
        let attr = driver.attribute(first, &self.name).await?;
        let satisfied = attr.as_deref().is_some_and(|v| v.contains(&self.value));
        Ok(Check::from_bool(satisfied, attr))
    }
}

// =============================================================================
// Windows
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct WindowCountAtLeast(pub usize);

#[async_trait]
impl Condition for WindowCountAtLeast {
    fn describe(&self) -> String {
        format!("window count >= {}", self.0)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let count = driver.all_window_handles().await?.len();
        Ok(Check::from_bool(count >= self.0, count))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowCountIs(pub usize);

#[async_trait]
impl Condition for WindowCountIs {
    fn describe(&self) -> String {
        format!("window count == {}", self.0)
    }

    async fn check(&self, driver: &dyn Driver) -> DriverResult<Check> {
        let count = driver.all_window_handles().await?.len();
        Ok(Check::from_bool(count == self.0, count))
    }
}

// =============================================================================
// Time
// =============================================================================

/// Holds once `delay` has passed since construction.
///
/// This is a fixed sleep in disguise. Prefer waiting on the state the delay
/// was meant to cover; every construction is logged.
#[derive(Debug, Clone, Copy)]
pub struct Elapsed {
    since: Instant,
    delay: Duration,
}

impl Elapsed {
    pub fn new(delay: Duration) -> Self {
        warn!(
            "fixed delay of {:?} used as a wait condition; wait on page state instead",
            delay
        );
        Self {
            since: Instant::now(),
            delay,
        }
    }
}

#[async_trait]
impl Condition for Elapsed {
    fn describe(&self) -> String {
        format!("{:?} elapsed", self.delay)
    }

    async fn check(&self, _driver: &dyn Driver) -> DriverResult<Check> {
        let elapsed = self.since.elapsed();
        Ok(Check::from_bool(
            elapsed >= self.delay,
            elapsed.as_millis() as u64,
        ))
    }
}

impl fmt::Debug for All {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Debug for Any {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Debug for Not {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBrowser, FakeElement};

    /// Always fails with the given error.
    struct Failing(DriverError);

    #[async_trait]
    impl Condition for Failing {
        fn describe(&self) -> String {
            "failing".into()
        }

        async fn check(&self, _driver: &dyn Driver) -> DriverResult<Check> {
            Err(self.0.clone())
        }
    }

    /// Counts evaluations so short-circuiting is observable.
    struct Counting {
        result: bool,
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl Condition for Counting {
        fn describe(&self) -> String {
            format!("counting({})", self.result)
        }

        async fn check(&self, _driver: &dyn Driver) -> DriverResult<Check> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Check::from_bool(self.result, self.result))
        }
    }

    fn counting(result: bool) -> (Counting, Arc<std::sync::atomic::AtomicUsize>) {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        (
            Counting {
                result,
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn stale() -> Failing {
        Failing(DriverError::StaleElement)
    }

    #[tokio::test]
    async fn test_url_contains_reports_url() {
        let browser = FakeBrowser::new("https://shop.example/inventory.html");
        let check = UrlContains::new("inventory").check(&browser).await.unwrap();
        assert!(check.satisfied);
        assert_eq!(check.observed, json!("https://shop.example/inventory.html"));

        let check = UrlContains::new("dashboard").check(&browser).await.unwrap();
        assert!(!check.satisfied);
    }

    #[tokio::test]
    async fn test_url_matches() {
        let browser = FakeBrowser::new("https://shop.example/item/42");
        let cond = UrlMatches::new(r"/item/\d+$").unwrap();
        assert!(cond.check(&browser).await.unwrap().satisfied);
        assert!(UrlMatches::new("(").is_err());
    }

    #[tokio::test]
    async fn test_element_visibility() {
        let browser = FakeBrowser::new("https://a.example");
        let w0 = browser.first_handle();
        let menu = Locator::id("menu");
        let spinner = Locator::css(".spinner");

        assert!(!ElementVisible::new(menu.clone()).check(&browser).await.unwrap().satisfied);
        assert!(ElementHidden::new(menu.clone()).check(&browser).await.unwrap().satisfied);

        browser.add_element(&w0, FakeElement::new(menu.clone()));
        browser.add_element(&w0, FakeElement::new(spinner.clone()).hidden());

        assert!(ElementVisible::new(menu.clone()).check(&browser).await.unwrap().satisfied);
        assert!(ElementPresent::new(spinner.clone()).check(&browser).await.unwrap().satisfied);
        assert!(!ElementVisible::new(spinner.clone()).check(&browser).await.unwrap().satisfied);
        assert!(ElementHidden::new(spinner).check(&browser).await.unwrap().satisfied);
    }

    #[tokio::test]
    async fn test_text_and_attribute() {
        let browser = FakeBrowser::new("https://a.example");
        let badge = Locator::css(".cart-badge");
        browser.add_element(
            &browser.first_handle(),
            FakeElement::new(badge.clone())
                .with_text("3 items")
                .with_attribute("class", "cart-badge active"),
        );

        let text = TextContains::new(badge.clone(), "3 items");
        assert!(text.check(&browser).await.unwrap().satisfied);

        let attr = AttributeContains::new(badge.clone(), "class", "active");
        assert!(attr.check(&browser).await.unwrap().satisfied);

        let missing = AttributeContains::new(badge, "href", "x");
        assert!(!missing.check(&browser).await.unwrap().satisfied);
    }

    #[tokio::test]
    async fn test_window_counts() {
        let browser = FakeBrowser::new("https://a.example");
        assert!(WindowCountIs(1).check(&browser).await.unwrap().satisfied);
        assert!(!WindowCountAtLeast(2).check(&browser).await.unwrap().satisfied);
        browser.open_window("https://b.example");
        assert!(WindowCountAtLeast(2).check(&browser).await.unwrap().satisfied);
        assert_eq!(
            WindowCountAtLeast(2).check(&browser).await.unwrap().observed,
            json!(2)
        );
    }

    #[tokio::test]
    async fn test_all_short_circuits_on_first_false() {
        let browser = FakeBrowser::new("https://a.example");
        let (first, _) = counting(false);
        let (second, second_calls) = counting(true);
        let check = first.and(second).check(&browser).await.unwrap();
        assert!(!check.satisfied);
        assert_eq!(second_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_any_short_circuits_on_first_true() {
        let browser = FakeBrowser::new("https://a.example");
        let (first, _) = counting(true);
        let (second, second_calls) = counting(false);
        let check = first.or(second).check(&browser).await.unwrap();
        assert!(check.satisfied);
        assert_eq!(second_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_composites_propagate_error_when_every_child_errors() {
        let browser = FakeBrowser::new("https://a.example");

        let both = all(vec![stale().boxed(), Failing(DriverError::Command("x".into())).boxed()]);
        assert_eq!(both.check(&browser).await.unwrap_err(), DriverError::StaleElement);

        let either = any(vec![stale().boxed(), stale().boxed()]);
        assert_eq!(either.check(&browser).await.unwrap_err(), DriverError::StaleElement);
    }

    #[tokio::test]
    async fn test_composites_with_some_errors_are_unsatisfied_not_errors() {
        let browser = FakeBrowser::new("https://a.example");

        let check = stale().and(UrlContains::new("a.example")).check(&browser).await.unwrap();
        assert!(!check.satisfied);

        let check = stale().or(UrlContains::new("zzz")).check(&browser).await.unwrap();
        assert!(!check.satisfied);

        let check = stale().or(UrlContains::new("a.example")).check(&browser).await.unwrap();
        assert!(check.satisfied);
    }

    #[tokio::test]
    async fn test_empty_composites() {
        let browser = FakeBrowser::new("https://a.example");
        assert!(all(vec![]).check(&browser).await.unwrap().satisfied);
        assert!(!any(vec![]).check(&browser).await.unwrap().satisfied);
    }

    #[tokio::test]
    async fn test_not_inverts_and_passes_errors() {
        let browser = FakeBrowser::new("https://a.example");
        let check = not(UrlContains::new("login")).check(&browser).await.unwrap();
        assert!(check.satisfied);
        assert!(not(stale()).check(&browser).await.is_err());
    }

    #[test]
    fn test_descriptions_nest() {
        let cond = UrlContains::new("cart").and(ElementVisible::new(Locator::id("checkout")).negate());
        assert_eq!(
            cond.describe(),
            "all of [url contains 'cart', not (id 'checkout' is visible)]"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_holds_after_delay() {
        let browser = FakeBrowser::new("https://a.example");
        let delay = Elapsed::new(Duration::from_millis(300));
        assert!(!delay.check(&browser).await.unwrap().satisfied);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(delay.check(&browser).await.unwrap().satisfied);
    }
}
