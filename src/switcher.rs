//! Hopping into a window opened by an action, and back out again.
//!
//! [`ContextSwitcher::run`] walks a fixed sequence of phases:
//!
//! ```text
//! Idle -> ActionRunning -> AwaitingNewContext -> InNewContext -> Verifying -> Restoring -> Done
//! ```
//!
//! Every phase after the action has an edge into `Restoring`, and once the
//! action has succeeded the origin window is current again when `run`
//! returns, whatever happened in between. If switching back fails the session
//! is poisoned and `Error::SessionCorrupted` is returned instead.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::FutureExt;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::condition::Condition;
use crate::driver::{Driver, DriverResult, Handle};
use crate::error::{DriverError, Error, Result};
use crate::poll::{PollSpec, Probe};
use crate::session::Session;
use crate::window::{diff, WindowSnapshot};

/// Boxed future borrowing the session for `'a`.
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where a switch currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchPhase {
    Idle,
    ActionRunning,
    AwaitingNewContext,
    InNewContext,
    Verifying,
    Restoring,
    Done,
}

impl SwitchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ActionRunning => "action_running",
            Self::AwaitingNewContext => "awaiting_new_context",
            Self::InNewContext => "in_new_context",
            Self::Verifying => "verifying",
            Self::Restoring => "restoring",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for SwitchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a completed switch produced.
#[derive(Debug)]
pub struct ContextSwitchResult<T> {
    /// The window that was opened, verified and closed.
    pub opened: Handle,
    /// Outcome of the caller's verification.
    pub verification: anyhow::Result<T>,
}

impl<T> ContextSwitchResult<T> {
    pub fn is_verified(&self) -> bool {
        self.verification.is_ok()
    }

    /// Fold a failed verification into [`Error::Verification`].
    pub fn into_result(self) -> Result<T> {
        let opened = self.opened;
        self.verification
            .map_err(|error| Error::Verification { opened, error })
    }
}

/// The window the poll settled on.
#[derive(Debug)]
enum Found {
    One(Handle),
    Ambiguous(Vec<Handle>),
}

/// Configures and runs one switch into a newly opened window.
pub struct ContextSwitcher {
    spec: PollSpec,
    pick: Option<Box<dyn Condition>>,
}

impl ContextSwitcher {
    pub fn new(spec: PollSpec) -> Self {
        Self { spec, pick: None }
    }

    /// Choose among several new windows by the one where `condition` holds.
    ///
    /// Only consulted when more than one window opens. Each candidate is
    /// visited while polling; exactly one match wins, several matches are
    /// ambiguous, no match keeps polling.
    pub fn disambiguate(mut self, condition: impl Condition + 'static) -> Self {
        self.pick = Some(Box::new(condition));
        self
    }

    /// Run `action`, wait for the window it opens, run `verify` inside it,
    /// then close it and switch back.
    ///
    /// A failing `action` is returned as [`Error::Action`] with nothing
    /// restored, since nothing was switched. Every later failure restores the
    /// origin window before returning. A failing `verify` is not an error of
    /// `run`; it is reported in [`ContextSwitchResult::verification`], and so
    /// is a panicking one, such as a failed `assert!`.
    pub async fn run<D, T, A, V>(
        &self,
        session: &mut Session<D>,
        action: A,
        verify: V,
    ) -> Result<ContextSwitchResult<T>>
    where
        D: Driver,
        A: for<'a> FnOnce(&'a Session<D>) -> BoxFut<'a, anyhow::Result<()>>,
        V: for<'a> FnOnce(&'a Session<D>) -> BoxFut<'a, anyhow::Result<T>>,
    {
        let mut phase = SwitchPhase::Idle;
        let origin = session.refresh_current().await?;
        let before = session.snapshot().await?;
        debug!("Origin window {}, {} open", origin, before.len());

        transition(&mut phase, SwitchPhase::ActionRunning);
        action(&*session).await.map_err(Error::Action)?;

        transition(&mut phase, SwitchPhase::AwaitingNewContext);
        let found = self.await_new_window(session, &before).await;
        if self.pick.is_some() {
            session.forget_current();
        }
        let opened = match found {
            Ok(Found::One(handle)) => handle,
            Ok(Found::Ambiguous(opened)) => {
                warn!("{} windows opened, none singled out", opened.len());
                transition(&mut phase, SwitchPhase::Restoring);
                restore(session, &origin, None).await?;
                return Err(Error::AmbiguousContext { opened });
            }
            Err(e) => {
                transition(&mut phase, SwitchPhase::Restoring);
                restore(session, &origin, None).await?;
                return Err(e);
            }
        };

        transition(&mut phase, SwitchPhase::InNewContext);
        if let Err(e) = session.switch_to(&opened).await {
            transition(&mut phase, SwitchPhase::Restoring);
            restore(session, &origin, Some(&opened)).await?;
            return Err(e);
        }
        session.announce("Switched into new window");

        transition(&mut phase, SwitchPhase::Verifying);
        let verification = AssertUnwindSafe(verify(&*session)).catch_unwind().await;

        transition(&mut phase, SwitchPhase::Restoring);
        let restored = restore(session, &origin, Some(&opened)).await;

        let verification = verification.unwrap_or_else(|panic| {
            Err(anyhow::anyhow!("verification panicked: {}", panic_message(&*panic)))
        });
        restored?;

        transition(&mut phase, SwitchPhase::Done);
        match &verification {
            Ok(_) => info!("Verified window {}, back on {}", opened, origin),
            Err(e) => info!("Verification in window {} failed: {:#}", opened, e),
        }
        Ok(ContextSwitchResult {
            opened,
            verification,
        })
    }

    async fn await_new_window<D: Driver>(
        &self,
        session: &Session<D>,
        before: &WindowSnapshot,
    ) -> Result<Found> {
        let description = match &self.pick {
            Some(pick) => format!("a new window where {}", pick.describe()),
            None => "a new window to open".to_string(),
        };
        let driver: &dyn Driver = session.driver();
        let pick = self.pick.as_deref();
        let found = session
            .poller(self.spec)
            .until(&description, move || probe_new_window(driver, before, pick))
            .await?;
        Ok(found)
    }
}

impl fmt::Debug for ContextSwitcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSwitcher")
            .field("spec", &self.spec)
            .field("pick", &self.pick.as_ref().map(|p| p.describe()))
            .finish()
    }
}

fn transition(phase: &mut SwitchPhase, next: SwitchPhase) {
    debug!(from = %phase, to = %next, "Context switch phase");
    *phase = next;
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Re-snapshot, diff against `before`, and settle on a window if possible.
async fn probe_new_window(
    driver: &dyn Driver,
    before: &WindowSnapshot,
    pick: Option<&dyn Condition>,
) -> DriverResult<Probe<Found>> {
    let after = WindowSnapshot::capture(driver).await?;
    let d = diff(before, &after);

    if d.opened.is_empty() {
        return Ok(Probe::Pending(json!({ "windows": after.len(), "opened": [] })));
    }
    if let Some(handle) = d.single_opened() {
        return Ok(Probe::Ready(Found::One(handle.clone())));
    }

    let opened: Vec<Handle> = d.opened.iter().cloned().collect();
    let Some(pick) = pick else {
        return Ok(Probe::Ready(Found::Ambiguous(opened)));
    };

    let mut matched = Vec::new();
    for handle in &opened {
        match driver.switch_to_window(handle).await {
            Ok(()) => {}
            Err(DriverError::NoSuchWindow(_)) => continue,
            Err(e) => return Err(e),
        }
        match pick.check(driver).await {
            Ok(check) if check.satisfied => matched.push(handle.clone()),
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Disambiguator errored in window {}: {}", handle, e),
        }
    }

    match matched.len() {
        0 => Ok(Probe::Pending(json!({ "opened": opened, "matched": [] }))),
        1 => Ok(Probe::Ready(Found::One(matched.remove(0)))),
        _ => Ok(Probe::Ready(Found::Ambiguous(opened))),
    }
}

/// Close `opened` if given, then return to `origin`.
///
/// A failed close is logged and otherwise ignored. A failed return poisons
/// the session.
async fn restore<D: Driver>(
    session: &mut Session<D>,
    origin: &Handle,
    opened: Option<&Handle>,
) -> Result<()> {
    if let Some(handle) = opened {
        if let Err(e) = session.close(handle).await {
            warn!("Could not close window {}: {}", handle, e);
        }
    }
    match session.switch_to(origin).await {
        Ok(()) => {
            debug!("Restored window {}", origin);
            Ok(())
        }
        Err(e) => Err(session.poison(origin, e.to_string())),
    }
}
