use std::time::Duration;

use crate::driver::Handle;

/// Result type for tabsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by a browser driver binding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("no such window: {0}")]
    NoSuchWindow(Handle),

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("stale element reference")]
    StaleElement,

    #[error("unsupported by driver: {0}")]
    Unsupported(String),

    #[error("driver disconnected: {0}")]
    Disconnected(String),

    #[error("driver command failed: {0}")]
    Command(String),
}

impl DriverError {
    /// Whether the connection itself is gone. Waits stop immediately on
    /// fatal errors instead of burning the rest of their budget.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

/// Why a wait did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timed out after {elapsed:?} waiting for {description}{}", diagnostics(.last_observed, .last_error))]
    Timeout {
        description: String,
        elapsed: Duration,
        last_observed: Option<serde_json::Value>,
        last_error: Option<DriverError>,
    },

    #[error("cancelled after {elapsed:?} while waiting for {description}")]
    Cancelled {
        description: String,
        elapsed: Duration,
    },

    #[error("driver failed while waiting: {0}")]
    Driver(#[from] DriverError),
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

fn diagnostics(observed: &Option<serde_json::Value>, error: &Option<DriverError>) -> String {
    let mut out = String::new();
    if let Some(value) = observed {
        out.push_str(&format!(" (last observed: {value})"));
    }
    if let Some(err) = error {
        out.push_str(&format!(" (last error: {err})"));
    }
    out
}

/// Errors from session operations and window switching.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    /// The action meant to open a window failed. Nothing was switched, so
    /// nothing was restored.
    #[error("action failed: {0:#}")]
    Action(anyhow::Error),

    /// Verification inside a new window failed. The origin window is
    /// current again.
    #[error("verification in window {opened} failed: {error:#}")]
    Verification { opened: Handle, error: anyhow::Error },

    #[error("no such window: {0}")]
    NoSuchWindow(Handle),

    /// Several windows opened and none (or more than one) matched the
    /// disambiguator. The origin window is current again.
    #[error("ambiguous new window: {} opened ({})", .opened.len(), join(.opened))]
    AmbiguousContext { opened: Vec<Handle> },

    /// Switching back to the origin failed. The session no longer knows
    /// which window its commands target and must be discarded.
    #[error("session corrupted: could not return to window {origin}: {reason}")]
    SessionCorrupted { origin: Handle, reason: String },
}

impl Error {
    /// Only a corrupted session is fatal; everything else leaves the
    /// session on its origin window.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionCorrupted { .. })
    }
}

fn join(handles: &[Handle]) -> String {
    handles
        .iter()
        .map(Handle::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
