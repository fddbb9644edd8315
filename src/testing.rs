//! Scripted in-memory browser for exercising waits and window switches.
//!
//! `FakeBrowser` keeps windows, URLs and elements in memory. Changes can be
//! scheduled relative to the tokio clock, so a test on a paused runtime can
//! say "a window opens 600ms from now" and observe exact timings.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::driver::{Driver, DriverResult, ElementRef, Handle, Interact, Locator};
use crate::error::DriverError;

/// An element living in a fake window.
#[derive(Debug, Clone)]
pub struct FakeElement {
    pub locator: Locator,
    pub displayed: bool,
    pub text: String,
    pub attributes: HashMap<String, String>,
}

impl FakeElement {
    /// A displayed element with no text.
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            displayed: true,
            text: String::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// What clicking an element does.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Open a new window at `url` after `after`.
    OpenWindow { url: String, after: Duration },
    /// Navigate the clicked window after `after`.
    Navigate { url: String, after: Duration },
}

#[derive(Debug, Clone, Default)]
struct Window {
    url: String,
    title: String,
    elements: Vec<FakeElement>,
}

#[derive(Debug)]
enum Change {
    Open { handle: Handle, url: String },
    Close(Handle),
    Navigate { handle: Handle, url: String },
    AddElement { handle: Handle, element: FakeElement },
    SetDisplayed { handle: Handle, locator: Locator, displayed: bool },
}

#[derive(Debug, Default)]
struct State {
    windows: BTreeMap<Handle, Window>,
    current: Option<Handle>,
    scheduled: Vec<(Instant, Change)>,
    next_id: usize,
    clicks: HashMap<Locator, Vec<ClickEffect>>,
    disconnected: bool,
    switches: Vec<Handle>,
}

impl State {
    fn allocate(&mut self) -> Handle {
        let handle = Handle::new(format!("w{}", self.next_id));
        self.next_id += 1;
        handle
    }

    fn apply_due(&mut self) {
        let now = Instant::now();
        let mut pending = Vec::with_capacity(self.scheduled.len());
        let mut due = Vec::new();
        for (at, change) in self.scheduled.drain(..) {
            if at <= now {
                due.push((at, change));
            } else {
                pending.push((at, change));
            }
        }
        self.scheduled = pending;
        due.sort_by_key(|(at, _)| *at);
        for (_, change) in due {
            self.apply(change);
        }
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::Open { handle, url } => {
                self.windows.insert(
                    handle,
                    Window {
                        url,
                        ..Window::default()
                    },
                );
            }
            Change::Close(handle) => {
                self.windows.remove(&handle);
            }
            Change::Navigate { handle, url } => {
                if let Some(window) = self.windows.get_mut(&handle) {
                    window.url = url;
                }
            }
            Change::AddElement { handle, element } => {
                if let Some(window) = self.windows.get_mut(&handle) {
                    window.elements.push(element);
                }
            }
            Change::SetDisplayed {
                handle,
                locator,
                displayed,
            } => {
                if let Some(window) = self.windows.get_mut(&handle) {
                    for el in window.elements.iter_mut().filter(|e| e.locator == locator) {
                        el.displayed = displayed;
                    }
                }
            }
        }
    }

    fn schedule(&mut self, after: Duration, change: Change) {
        if after.is_zero() {
            self.apply(change);
        } else {
            self.scheduled.push((Instant::now() + after, change));
        }
    }

    fn check_connected(&self) -> DriverResult<()> {
        if self.disconnected {
            return Err(DriverError::Disconnected("fake browser went away".into()));
        }
        Ok(())
    }

    fn current_window(&self) -> DriverResult<(&Handle, &Window)> {
        let handle = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::Command("no current window".into()))?;
        let window = self
            .windows
            .get(handle)
            .ok_or_else(|| DriverError::NoSuchWindow(handle.clone()))?;
        Ok((handle, window))
    }

    fn matches(&self, locator: &Locator) -> DriverResult<Vec<&FakeElement>> {
        let (_, window) = self.current_window()?;
        Ok(window
            .elements
            .iter()
            .filter(|e| &e.locator == locator)
            .collect())
    }

    fn element(&self, element: &ElementRef) -> DriverResult<&FakeElement> {
        self.matches(&element.locator)?
            .into_iter()
            .nth(element.index)
            .ok_or(DriverError::StaleElement)
    }
}

/// In-memory browser implementing [`Driver`] and [`Interact`].
///
/// Clones share state, so a test keeps one clone to script changes while the
/// session owns another.
#[derive(Debug, Clone)]
pub struct FakeBrowser {
    state: Arc<Mutex<State>>,
}

impl FakeBrowser {
    /// One window (`w0`) open at `url` and current.
    pub fn new(url: impl Into<String>) -> Self {
        let mut state = State::default();
        let handle = state.allocate();
        state.windows.insert(
            handle.clone(),
            Window {
                url: url.into(),
                ..Window::default()
            },
        );
        state.current = Some(handle);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.apply_due();
        state
    }

    /// Handle of the first window.
    pub fn first_handle(&self) -> Handle {
        Handle::new("w0")
    }

    /// Open a window immediately, without focusing it.
    pub fn open_window(&self, url: impl Into<String>) -> Handle {
        self.open_window_after(Duration::ZERO, url)
    }

    /// Open a window `after` from now. The handle is reserved right away.
    pub fn open_window_after(&self, after: Duration, url: impl Into<String>) -> Handle {
        let mut state = self.lock();
        let handle = state.allocate();
        state.schedule(
            after,
            Change::Open {
                handle: handle.clone(),
                url: url.into(),
            },
        );
        handle
    }

    pub fn close_window_after(&self, after: Duration, handle: &Handle) {
        self.lock().schedule(after, Change::Close(handle.clone()));
    }

    pub fn navigate_after(&self, after: Duration, handle: &Handle, url: impl Into<String>) {
        self.lock().schedule(
            after,
            Change::Navigate {
                handle: handle.clone(),
                url: url.into(),
            },
        );
    }

    pub fn set_title(&self, handle: &Handle, title: impl Into<String>) {
        if let Some(window) = self.lock().windows.get_mut(handle) {
            window.title = title.into();
        }
    }

    pub fn add_element(&self, handle: &Handle, element: FakeElement) {
        self.add_element_after(Duration::ZERO, handle, element);
    }

    pub fn add_element_after(&self, after: Duration, handle: &Handle, element: FakeElement) {
        self.lock().schedule(
            after,
            Change::AddElement {
                handle: handle.clone(),
                element,
            },
        );
    }

    pub fn set_displayed_after(
        &self,
        after: Duration,
        handle: &Handle,
        locator: &Locator,
        displayed: bool,
    ) {
        self.lock().schedule(
            after,
            Change::SetDisplayed {
                handle: handle.clone(),
                locator: locator.clone(),
                displayed,
            },
        );
    }

    /// Register what clicking `locator` does. The element must exist in the
    /// current window at click time.
    pub fn on_click(&self, locator: Locator, effect: ClickEffect) {
        self.lock().clicks.entry(locator).or_default().push(effect);
    }

    /// Every further call fails with `Disconnected`.
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    pub fn is_open(&self, handle: &Handle) -> bool {
        self.lock().windows.contains_key(handle)
    }

    pub fn handles(&self) -> BTreeSet<Handle> {
        self.lock().windows.keys().cloned().collect()
    }

    /// Window the driver currently targets.
    pub fn focused(&self) -> Option<Handle> {
        self.lock().current.clone()
    }

    pub fn url_of(&self, handle: &Handle) -> Option<String> {
        self.lock().windows.get(handle).map(|w| w.url.clone())
    }

    /// Every successful `switch_to_window` call, in order.
    pub fn switch_log(&self) -> Vec<Handle> {
        self.lock().switches.clone()
    }
}

#[async_trait]
impl Driver for FakeBrowser {
    async fn current_window_handle(&self) -> DriverResult<Handle> {
        let state = self.lock();
        state.check_connected()?;
        state
            .current
            .clone()
            .ok_or_else(|| DriverError::Command("no current window".into()))
    }

    async fn all_window_handles(&self) -> DriverResult<BTreeSet<Handle>> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.windows.keys().cloned().collect())
    }

    async fn switch_to_window(&self, handle: &Handle) -> DriverResult<()> {
        let mut state = self.lock();
        state.check_connected()?;
        if !state.windows.contains_key(handle) {
            return Err(DriverError::NoSuchWindow(handle.clone()));
        }
        state.current = Some(handle.clone());
        state.switches.push(handle.clone());
        Ok(())
    }

    async fn close_window(&self, handle: &Handle) -> DriverResult<()> {
        let mut state = self.lock();
        state.check_connected()?;
        if state.windows.remove(handle).is_none() {
            return Err(DriverError::NoSuchWindow(handle.clone()));
        }
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.current_window()?.1.url.clone())
    }

    async fn title(&self) -> DriverResult<String> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.current_window()?.1.title.clone())
    }

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementRef>> {
        let state = self.lock();
        state.check_connected()?;
        let count = state.matches(locator)?.len();
        Ok((0..count)
            .map(|i| ElementRef::new(locator.clone(), i))
            .collect())
    }

    async fn is_displayed(&self, element: &ElementRef) -> DriverResult<bool> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.element(element)?.displayed)
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.element(element)?.attributes.get(name).cloned())
    }

    async fn text(&self, element: &ElementRef) -> DriverResult<String> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.element(element)?.text.clone())
    }
}

#[async_trait]
impl Interact for FakeBrowser {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        let mut state = self.lock();
        state.check_connected()?;
        let handle = state.current_window()?.0.clone();
        state.apply(Change::Navigate {
            handle,
            url: url.to_string(),
        });
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> DriverResult<()> {
        let mut state = self.lock();
        state.check_connected()?;
        let clickable = state.matches(locator)?.iter().any(|e| e.displayed);
        if !clickable {
            return Err(DriverError::NoSuchElement(locator.to_string()));
        }
        let handle = state.current_window()?.0.clone();
        let effects = state.clicks.get(locator).cloned().unwrap_or_default();
        for effect in effects {
            match effect {
                ClickEffect::OpenWindow { url, after } => {
                    let new = state.allocate();
                    state.schedule(after, Change::Open { handle: new, url });
                }
                ClickEffect::Navigate { url, after } => {
                    state.schedule(
                        after,
                        Change::Navigate {
                            handle: handle.clone(),
                            url,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()> {
        let mut state = self.lock();
        state.check_connected()?;
        let (handle, _) = state.current_window()?;
        let handle = handle.clone();
        let window = state
            .windows
            .get_mut(&handle)
            .ok_or_else(|| DriverError::NoSuchWindow(handle.clone()))?;
        let el = window
            .elements
            .iter_mut()
            .find(|e| &e.locator == locator)
            .ok_or_else(|| DriverError::NoSuchElement(locator.to_string()))?;
        el.attributes.insert("value".into(), value.to_string());
        Ok(())
    }
}
