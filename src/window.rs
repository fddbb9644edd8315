//! Window handle snapshots and their differences.

use std::collections::BTreeSet;

use crate::driver::{Driver, DriverResult, Handle};

/// The set of open handles at one instant, plus the handle that was current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    handles: BTreeSet<Handle>,
    current: Option<Handle>,
}

impl WindowSnapshot {
    pub fn new(handles: BTreeSet<Handle>, current: Option<Handle>) -> Self {
        Self { handles, current }
    }

    /// Query every open handle once. `current` is left unset; the session
    /// fills it from its own tracking.
    pub async fn capture(driver: &dyn Driver) -> DriverResult<Self> {
        let handles = driver.all_window_handles().await?;
        Ok(Self {
            handles,
            current: None,
        })
    }

    pub fn with_current(mut self, current: Option<Handle>) -> Self {
        self.current = current;
        self
    }

    pub fn handles(&self) -> &BTreeSet<Handle> {
        &self.handles
    }

    pub fn current(&self) -> Option<&Handle> {
        self.current.as_ref()
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.handles.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Handles that appeared and disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowDiff {
    pub opened: BTreeSet<Handle>,
    pub closed: BTreeSet<Handle>,
}

impl WindowDiff {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty()
    }

    /// The opened handle, if exactly one opened.
    pub fn single_opened(&self) -> Option<&Handle> {
        match self.opened.len() {
            1 => self.opened.iter().next(),
            _ => None,
        }
    }
}

/// `opened = after - before`, `closed = before - after`.
pub fn diff(before: &WindowSnapshot, after: &WindowSnapshot) -> WindowDiff {
    WindowDiff {
        opened: after.handles.difference(&before.handles).cloned().collect(),
        closed: before.handles.difference(&after.handles).cloned().collect(),
    }
}
