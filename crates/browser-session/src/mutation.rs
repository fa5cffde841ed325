//! DOM mutation detection.
//!
//! Each tracked page carries a `MutationTracker`: an injected
//! `MutationObserver` counts DOM mutations into a window-scoped counter, and
//! a navigation listener re-arms the observer after every document load while
//! bumping a generation number on a watch channel. Tools snapshot the tracker
//! before acting and ask it afterwards whether anything changed. Detection is
//! a heuristic: the observer is given a short settle delay, not a
//! consistency barrier.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::EventDomContentEventFired;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::SessionError;

/// Delay granted to the observer before mutation counters are inspected.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

const OBSERVER_SCRIPT: &str = r#"
(() => {
    if (window.__webpilotObserver) {
        return;
    }
    window.__webpilotMutations = 0;
    const observer = new MutationObserver((records) => {
        window.__webpilotMutations += records.length;
    });
    observer.observe(document, {
        subtree: true,
        childList: true,
        attributes: true,
        characterData: true,
    });
    window.__webpilotObserver = observer;
})()
"#;

/// Snapshot of the mutation state before an action runs.
#[derive(Clone, Copy, Debug)]
pub struct MutationProbe {
    count: u64,
    generation: u64,
}

pub struct MutationTracker {
    generation: watch::Receiver<u64>,
    listener: JoinHandle<()>,
}

impl MutationTracker {
    /// Arm the observer on the page and start the navigation listener that
    /// re-arms it after each document load. Installed once per tracked page.
    pub async fn install(page: &Page) -> Result<Self, SessionError> {
        arm_observer(page).await?;

        let (tx, rx) = watch::channel(0u64);
        let mut navigations = page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|err| SessionError::page(format!("navigation listener: {err}")))?;
        let page = page.clone();
        let listener = tokio::spawn(async move {
            let mut generation = 0u64;
            while navigations.next().await.is_some() {
                generation += 1;
                if tx.send(generation).is_err() {
                    break;
                }
                if let Err(err) = arm_observer(&page).await {
                    debug!(error = %err, "failed to re-arm mutation observer after navigation");
                }
            }
        });

        Ok(Self {
            generation: rx,
            listener,
        })
    }

    /// Read the current counter and navigation generation.
    pub async fn probe(&self, page: &Page) -> MutationProbe {
        MutationProbe {
            count: read_counter(page).await,
            generation: *self.generation.borrow(),
        }
    }

    /// Wait out the settle delay, then report whether the page navigated or
    /// mutated since the probe was taken.
    pub async fn changed_since(&self, page: &Page, probe: MutationProbe) -> bool {
        tokio::time::sleep(SETTLE_DELAY).await;
        if *self.generation.borrow() != probe.generation {
            return true;
        }
        read_counter(page).await > probe.count
    }
}

impl Drop for MutationTracker {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn arm_observer(page: &Page) -> Result<(), SessionError> {
    page.evaluate(OBSERVER_SCRIPT)
        .await
        .map_err(|err| SessionError::page(format!("mutation observer install: {err}")))?;
    Ok(())
}

async fn read_counter(page: &Page) -> u64 {
    page.evaluate("window.__webpilotMutations || 0")
        .await
        .ok()
        .and_then(|result| result.into_value::<u64>().ok())
        .unwrap_or(0)
}
