//! The single owner of a browser connection.
//!
//! A [`Session`] tracks which window its commands target. Mutating calls take
//! `&mut self`, so two window switches can never be in flight on one session.
//! Independent sessions share nothing.

use std::future::Future;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::condition::Condition;
use crate::driver::{Driver, DriverResult, Handle};
use crate::error::{DriverError, Error, Result};
use crate::poll::{PollSpec, Poller, Probe};
use crate::switcher::{BoxFut, ContextSwitchResult, ContextSwitcher};
use crate::window::WindowSnapshot;

/// Set once restoring the origin window failed.
#[derive(Debug, Clone)]
struct Corruption {
    origin: Handle,
    reason: String,
}

/// A browser connection plus the handle its commands currently target.
#[derive(Debug)]
pub struct Session<D> {
    driver: D,
    current: Option<Handle>,
    cancel: CancellationToken,
    corrupted: Option<Corruption>,
}

impl<D: Driver> Session<D> {
    /// Take ownership of `driver` and record its current window.
    pub async fn attach(driver: D) -> Result<Self> {
        let current = driver.current_window_handle().await?;
        debug!("Session attached on window {}", current);
        Ok(Self {
            driver,
            current: Some(current),
            cancel: CancellationToken::new(),
            corrupted: None,
        })
    }

    /// Every wait on this session also observes `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Handle the session believes is current. `None` after the current
    /// window was closed through this session.
    pub fn current_handle(&self) -> Option<&Handle> {
        self.current.as_ref()
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted.is_some()
    }

    /// Ask the driver which window is current and remember it.
    pub async fn refresh_current(&mut self) -> Result<Handle> {
        self.ensure_usable()?;
        let handle = self.driver.current_window_handle().await?;
        self.current = Some(handle.clone());
        Ok(handle)
    }

    /// Retarget commands to `handle`.
    pub async fn switch_to(&mut self, handle: &Handle) -> Result<()> {
        self.ensure_usable()?;
        match self.driver.switch_to_window(handle).await {
            Ok(()) => {
                debug!("Switched to window {}", handle);
                self.current = Some(handle.clone());
                Ok(())
            }
            Err(DriverError::NoSuchWindow(h)) => Err(Error::NoSuchWindow(h)),
            Err(e) => Err(e.into()),
        }
    }

    /// Close `handle`. Closing a window that is already gone succeeds.
    pub async fn close(&mut self, handle: &Handle) -> Result<()> {
        self.ensure_usable()?;
        match self.driver.close_window(handle).await {
            Ok(()) => debug!("Closed window {}", handle),
            Err(DriverError::NoSuchWindow(_)) => debug!("Window {} already closed", handle),
            Err(e) => return Err(e.into()),
        }
        if self.current.as_ref() == Some(handle) {
            self.current = None;
        }
        Ok(())
    }

    /// All open handles, with this session's current handle.
    pub async fn snapshot(&self) -> Result<WindowSnapshot> {
        self.ensure_usable()?;
        let snapshot = WindowSnapshot::capture(&self.driver).await?;
        Ok(snapshot.with_current(self.current.clone()))
    }

    /// A poller for `spec` that observes this session's cancellation.
    pub fn poller(&self, spec: PollSpec) -> Poller {
        Poller::new(spec).with_cancellation(self.cancel.clone())
    }

    /// Wait until `condition` holds in the current window and return what it
    /// observed.
    pub async fn wait<C>(&self, condition: &C, spec: PollSpec) -> Result<Value>
    where
        C: Condition + ?Sized,
    {
        self.ensure_usable()?;
        Ok(self.poller(spec).wait(&self.driver, condition).await?)
    }

    /// Wait on an arbitrary probe built from the driver.
    pub async fn wait_until<'a, T, F, Fut>(
        &'a self,
        description: &str,
        spec: PollSpec,
        probe: F,
    ) -> Result<T>
    where
        F: FnMut(&'a D) -> Fut,
        Fut: Future<Output = DriverResult<Probe<T>>>,
    {
        self.ensure_usable()?;
        let driver = &self.driver;
        let mut probe = probe;
        Ok(self
            .poller(spec)
            .until(description, move || probe(driver))
            .await?)
    }

    /// Run `action`, switch into the single window it opens, run `verify`
    /// there, then close that window and return to the original one.
    ///
    /// See [`ContextSwitcher`] for disambiguation and the exact guarantees.
    pub async fn with_new_context<T, A, V>(
        &mut self,
        action: A,
        verify: V,
        spec: PollSpec,
    ) -> Result<ContextSwitchResult<T>>
    where
        A: for<'a> FnOnce(&'a Session<D>) -> BoxFut<'a, anyhow::Result<()>>,
        V: for<'a> FnOnce(&'a Session<D>) -> BoxFut<'a, anyhow::Result<T>>,
    {
        ContextSwitcher::new(spec).run(self, action, verify).await
    }

    pub(crate) fn ensure_usable(&self) -> Result<()> {
        match &self.corrupted {
            Some(c) => Err(Error::SessionCorrupted {
                origin: c.origin.clone(),
                reason: c.reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// The driver moved windows behind the session's back.
    pub(crate) fn forget_current(&mut self) {
        self.current = None;
    }

    /// Mark the session unusable and return the error to surface.
    pub(crate) fn poison(&mut self, origin: &Handle, reason: String) -> Error {
        error!(
            "Session corrupted: could not return to window {}: {}",
            origin, reason
        );
        self.current = None;
        let corruption = Corruption {
            origin: origin.clone(),
            reason,
        };
        self.corrupted = Some(corruption.clone());
        Error::SessionCorrupted {
            origin: corruption.origin,
            reason: corruption.reason,
        }
    }

    /// Log the session target at info level.
    pub(crate) fn announce(&self, what: &str) {
        match &self.current {
            Some(h) => info!("{} (window {})", what, h),
            None => info!("{} (no current window)", what),
        }
    }
}
