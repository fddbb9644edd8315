//! # tabsync
//!
//! Condition polling and safe window/tab switching for browser-driven
//! end-to-end tests.
//!
//! Waits are bounded, report what they were waiting for, and stop on
//! cancellation. Following a link that opens a new tab goes through
//! [`Session::with_new_context`], which always puts the session back on the
//! window it started from.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabsync::{ConditionExt, ElementVisible, Interact, Locator, PollSpec, Session, UrlContains};
//!
//! # async fn run<D: Interact>(driver: D) -> tabsync::Result<()> {
//! let mut session = Session::attach(driver).await?;
//! let spec = PollSpec::default();
//!
//! // Wait for the page instead of sleeping
//! session
//!     .wait(&UrlContains::new("inventory").and(ElementVisible::new(Locator::id("cart"))), spec)
//!     .await?;
//!
//! // Follow an external link and check where it went
//! let result = session
//!     .with_new_context(
//!         |s| Box::pin(async move {
//!             s.driver().click(&Locator::css("a.social-twitter")).await?;
//!             Ok(())
//!         }),
//!         |s| Box::pin(async move {
//!             let url = s.driver().current_url().await?;
//!             anyhow::ensure!(url.contains("twitter.com"), "landed on {url}");
//!             Ok(url)
//!         }),
//!         spec,
//!     )
//!     .await?;
//! println!("verified {}", result.opened);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod condition;
pub mod config;
pub mod driver;
mod error;
pub mod flow;
pub mod poll;
pub mod session;
pub mod switcher;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod window;

pub use clock::Deadline;
pub use condition::{
    all, any, not, All, Any, AttributeContains, Check, Condition, ConditionExt, Elapsed,
    ElementCountAtLeast, ElementHidden, ElementPresent, ElementVisible, Not, TextContains,
    TitleContains, TitleIs, UrlContains, UrlIs, UrlMatches, WindowCountAtLeast, WindowCountIs,
};
pub use config::SyncConfig;
pub use driver::{Driver, DriverResult, ElementRef, Handle, Interact, Locator};
pub use error::{DriverError, Error, Result, WaitError};
pub use flow::{skip_unless, Outcome};
pub use poll::{PollSpec, Poller, Probe};
pub use session::Session;
pub use switcher::{BoxFut, ContextSwitchResult, ContextSwitcher, SwitchPhase};
pub use window::{diff, WindowDiff, WindowSnapshot};
