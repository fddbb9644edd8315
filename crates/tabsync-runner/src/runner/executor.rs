use crate::config::condition::build_all;
use crate::config::steps::{NewWindowStep, WaitStep};
use crate::config::Step;
use crate::{Error, Result};
use std::ops::ControlFlow;
use tabsync::{skip_unless, ContextSwitcher, Interact, Outcome, Session, SyncConfig};
use tracing::{debug, info};

/// Execute one step. `Break` ends the attempt with that outcome.
pub(crate) async fn execute<D: Interact>(
    session: &mut Session<D>,
    step: &Step,
    sync: &SyncConfig,
) -> Result<ControlFlow<Outcome>> {
    match step {
        Step::Goto(g) => {
            info!("Navigating to: {}", g.url);
            session.driver().goto(&g.url).await?;
        }

        Step::Click(target) => {
            let locator = target.locator()?;
            info!("Clicking: {}", locator);
            session.driver().click(&locator).await?;
        }

        Step::Fill(f) => {
            let locator = f.target.locator()?;
            info!("Filling: {}", locator);
            session.driver().fill(&locator, &f.value).await?;
        }

        Step::Wait(w) => {
            wait(session, w, sync).await?;
        }

        Step::SkipUnless(w) => {
            if let ControlFlow::Break(outcome) = skip_unless(wait(session, w, sync).await)? {
                return Ok(ControlFlow::Break(outcome));
            }
        }

        Step::Assert(spec) => {
            let condition = spec.build()?;
            let check = condition.check(session.driver()).await?;
            if !check.satisfied {
                return Err(Error::AssertionFailed(format!(
                    "{} (observed: {})",
                    condition.describe(),
                    check.observed
                )));
            }
            debug!("Assertion held: {}", condition.describe());
        }

        Step::NewWindow(n) => new_window(session, n, sync).await?,

        Step::Log(l) => {
            info!("[LOG] {}", l.message);
        }

        Step::Repeat(r) => {
            debug!("Repeating {} times", r.times);
            for i in 0..r.times {
                debug!("Repeat iteration {}/{}", i + 1, r.times);
                for s in &r.steps {
                    if let ControlFlow::Break(outcome) = Box::pin(execute(session, s, sync)).await? {
                        return Ok(ControlFlow::Break(outcome));
                    }
                }
            }
        }
    }

    Ok(ControlFlow::Continue(()))
}

/// Wait in the current window; the tabsync error is kept whole so a timeout
/// can still become a skip.
async fn wait<D: Interact>(
    session: &Session<D>,
    step: &WaitStep,
    sync: &SyncConfig,
) -> tabsync::Result<serde_json::Value> {
    let condition = step
        .until
        .build()
        .map_err(|e| tabsync::Error::Config(e.to_string()))?;
    let spec = step.poll.unwrap_or(sync.poll);
    debug!("Waiting up to {:?} for {}", spec.timeout(), condition.describe());
    let observed = session.wait(&*condition, spec).await?;
    debug!("Condition met: {} ({})", condition.describe(), observed);
    Ok(observed)
}

async fn new_window<D: Interact>(
    session: &mut Session<D>,
    step: &NewWindowStep,
    sync: &SyncConfig,
) -> Result<()> {
    let locator = step.click.locator()?;
    let verify = tabsync::all(build_all(&step.verify)?);
    let verify_spec = sync.poll;

    let mut switcher = ContextSwitcher::new(step.poll.unwrap_or(sync.switch));
    if let Some(pick) = &step.pick {
        switcher = switcher.disambiguate(pick.build()?);
    }

    info!("Opening new window via {}", locator);
    let result = switcher
        .run(
            session,
            move |s| {
                Box::pin(async move {
                    s.driver().click(&locator).await?;
                    Ok(())
                })
            },
            move |s| {
                Box::pin(async move {
                    let observed = s.wait(&verify, verify_spec).await?;
                    Ok(observed)
                })
            },
        )
        .await?;

    let opened = result.opened.clone();
    let observed = result.into_result()?;
    info!("Verified window {} ({})", opened, observed);
    Ok(())
}
