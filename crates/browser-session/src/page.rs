//! Single-page tracking and the concrete page operations tools rely on.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::mutation::MutationTracker;

/// Attribute an external controller stamps onto a page body so the engine
/// can rebind to that tab.
const TAB_TAG_PROBE: &str =
    "document.body && document.body.getAttribute('data-webpilot-tab-id')";

/// Url and title of the tracked page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// Result of a tab-binding request. `fallback` records that a requested tab
/// id did not match any open page and the session fell back to the existing
/// or a fresh page.
#[derive(Clone, Debug)]
pub struct PageBinding {
    pub fallback: bool,
    pub detail: String,
}

/// Feedback returned by page-mutating operations.
#[derive(Clone, Copy, Debug)]
pub struct ActionFeedback {
    pub dom_changed: bool,
}

struct TrackedPage {
    page: Page,
    mutations: Arc<MutationTracker>,
}

impl TrackedPage {
    async fn adopt(page: Page) -> Result<Self, SessionError> {
        let mutations = Arc::new(MutationTracker::install(&page).await?);
        Ok(Self { page, mutations })
    }
}

/// Tracks exactly one current page and exposes the operations the tool set
/// needs. Shared process-wide; there is no per-task isolation.
pub struct PageSession {
    browser: Arc<Mutex<Browser>>,
    home_url: String,
    screenshots_dir: Option<PathBuf>,
    screenshot_capture: bool,
    current: Mutex<Option<TrackedPage>>,
}

impl PageSession {
    pub fn new(browser: Arc<Mutex<Browser>>, config: &SessionConfig) -> Self {
        Self {
            browser,
            home_url: config.home_url.clone(),
            screenshots_dir: config.screenshots_dir.clone(),
            screenshot_capture: config.screenshot_capture,
            current: Mutex::new(None),
        }
    }

    /// Bind the current page. With a tab id, search open pages for one tagged
    /// with it; on no match fall back (observably) to the existing page, or a
    /// fresh page at the home url.
    pub async fn set_current_page(
        &self,
        tab_id: Option<&str>,
    ) -> Result<PageBinding, SessionError> {
        let mut fallback = false;
        if let Some(wanted) = tab_id {
            let pages = { self.browser.lock().await.pages().await? };
            for page in pages {
                let url = page.url().await.ok().flatten().unwrap_or_default();
                if is_internal_url(&url) {
                    continue;
                }
                let tag = page
                    .evaluate(TAB_TAG_PROBE)
                    .await
                    .ok()
                    .and_then(|result| result.into_value::<Option<String>>().ok())
                    .flatten();
                if tag.as_deref() == Some(wanted) {
                    let tracked = TrackedPage::adopt(page).await?;
                    *self.current.lock().await = Some(tracked);
                    return Ok(PageBinding {
                        fallback: false,
                        detail: url,
                    });
                }
            }
            warn!(tab_id = wanted, "no open page carries the requested tab id, falling back");
            fallback = true;
        }

        if let Some(tracked) = self.current.lock().await.as_ref() {
            let detail = tracked.page.url().await.ok().flatten().unwrap_or_default();
            return Ok(PageBinding { fallback, detail });
        }

        let page = {
            self.browser
                .lock()
                .await
                .new_page(self.home_url.as_str())
                .await?
        };
        let _ = page.bring_to_front().await;
        let tracked = TrackedPage::adopt(page).await?;
        *self.current.lock().await = Some(tracked);
        Ok(PageBinding {
            fallback,
            detail: self.home_url.clone(),
        })
    }

    pub async fn page_info(&self) -> Result<PageInfo, SessionError> {
        let (page, _) = self.tracked().await?;
        let url = page.url().await?.unwrap_or_default();
        let title = page.get_title().await?.unwrap_or_default();
        Ok(PageInfo { url, title })
    }

    /// Navigate the tracked page. A navigation that does not settle within
    /// `wait` is tolerated: the load frequently completes afterwards.
    pub async fn navigate(&self, url: &str, wait: Duration) -> Result<PageInfo, SessionError> {
        let (page, _) = self.tracked().await?;
        let current = page.url().await.ok().flatten().unwrap_or_default();
        if current == url {
            debug!(url, "page already on requested url, skipping navigation");
            return self.page_info().await;
        }
        self.screenshot("open_url_start").await;
        match tokio::time::timeout(wait, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                return Err(SessionError::page(format!("navigation to {url} failed: {err}")));
            }
            Err(_) => {
                warn!(url, timeout = ?wait, "navigation did not settle in time, continuing");
            }
        }
        self.screenshot("open_url_end").await;
        self.page_info().await
    }

    pub async fn click(&self, selector: &str) -> Result<ActionFeedback, SessionError> {
        let (page, mutations) = self.tracked().await?;
        self.highlight(selector).await;
        let probe = mutations.probe(&page).await;
        let element = page.find_element(selector).await.map_err(|err| {
            SessionError::page(format!("element '{selector}' not found: {err}"))
        })?;
        element.click().await.map_err(|err| {
            SessionError::page(format!("click on '{selector}' failed: {err}"))
        })?;
        let dom_changed = mutations.changed_since(&page, probe).await;
        self.screenshot("click").await;
        Ok(ActionFeedback { dom_changed })
    }

    pub async fn type_text(
        &self,
        selector: &str,
        text: &str,
        submit: bool,
    ) -> Result<ActionFeedback, SessionError> {
        let (page, mutations) = self.tracked().await?;
        self.highlight(selector).await;
        let probe = mutations.probe(&page).await;
        let element = page.find_element(selector).await.map_err(|err| {
            SessionError::page(format!("element '{selector}' not found: {err}"))
        })?;
        element.focus().await.map_err(|err| {
            SessionError::page(format!("focus on '{selector}' failed: {err}"))
        })?;
        element.type_str(text).await.map_err(|err| {
            SessionError::page(format!("typing into '{selector}' failed: {err}"))
        })?;
        if submit {
            element.press_key("Enter").await.map_err(|err| {
                SessionError::page(format!("submitting '{selector}' failed: {err}"))
            })?;
        }
        let dom_changed = mutations.changed_since(&page, probe).await;
        self.screenshot("enter_text").await;
        Ok(ActionFeedback { dom_changed })
    }

    /// Dispatch a key combination such as `Enter` or `Control+A` to the page.
    pub async fn press_keys(&self, combo: &str) -> Result<ActionFeedback, SessionError> {
        let (page, mutations) = self.tracked().await?;
        let probe = mutations.probe(&page).await;
        let (modifiers, key) = parse_key_combo(combo);
        if key.is_empty() {
            return Err(SessionError::page(format!(
                "key combination '{combo}' has no main key"
            )));
        }
        dispatch_key(&page, DispatchKeyEventType::KeyDown, &key, modifiers).await?;
        dispatch_key(&page, DispatchKeyEventType::KeyUp, &key, modifiers).await?;
        let dom_changed = mutations.changed_since(&page, probe).await;
        Ok(ActionFeedback { dom_changed })
    }

    /// Visible text of the page body.
    pub async fn dom_text(&self) -> Result<String, SessionError> {
        let (page, _) = self.tracked().await?;
        page.evaluate("document.body ? document.body.innerText : ''")
            .await?
            .into_value::<String>()
            .map_err(|err| SessionError::page(format!("reading page text failed: {err}")))
    }

    /// Flash an outline around the element so a watching user can follow
    /// along. Never fails the surrounding operation.
    pub async fn highlight(&self, selector: &str) {
        let Ok((page, _)) = self.tracked().await else {
            return;
        };
        let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({quoted});
                if (!el) return;
                const original = el.style.outline;
                el.style.outline = '2px solid #ff8800';
                setTimeout(() => {{ el.style.outline = original; }}, 1200);
            }})()"#
        );
        if let Err(err) = page.evaluate(script).await {
            debug!(selector, error = %err, "highlight failed");
        }
    }

    /// Capture a timestamped screenshot when capture is enabled. Failures
    /// are logged, never raised.
    pub async fn screenshot(&self, name: &str) -> Option<PathBuf> {
        if !self.screenshot_capture {
            return None;
        }
        let dir = self.screenshots_dir.clone()?;
        let (page, _) = self.tracked().await.ok()?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        match page.screenshot(params).await {
            Ok(bytes) => {
                let path = dir.join(format!("{}_{name}.png", Utc::now().timestamp_micros()));
                match tokio::fs::write(&path, bytes).await {
                    Ok(()) => {
                        debug!(path = %path.display(), "screenshot saved");
                        Some(path)
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to save screenshot");
                        None
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to capture screenshot");
                None
            }
        }
    }

    /// Release the tracked page. Called during session teardown.
    pub async fn close_page(&self) {
        if let Some(tracked) = self.current.lock().await.take() {
            if let Err(err) = tracked.page.close().await {
                debug!(error = %err, "closing tracked page failed");
            }
        }
    }

    async fn tracked(&self) -> Result<(Page, Arc<MutationTracker>), SessionError> {
        {
            let guard = self.current.lock().await;
            if let Some(tracked) = guard.as_ref() {
                return Ok((tracked.page.clone(), Arc::clone(&tracked.mutations)));
            }
        }
        self.set_current_page(None).await?;
        let guard = self.current.lock().await;
        guard
            .as_ref()
            .map(|tracked| (tracked.page.clone(), Arc::clone(&tracked.mutations)))
            .ok_or(SessionError::NotInitialized)
    }
}

fn is_internal_url(url: &str) -> bool {
    url.starts_with("chrome-extension://")
        || url.starts_with("chrome://")
        || url.starts_with("edge://")
        || url.starts_with("devtools://")
}

fn parse_key_combo(combo: &str) -> (i64, String) {
    let mut modifiers = 0i64;
    let mut key = String::new();
    for part in combo.split('+') {
        let trimmed = part.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "alt" => modifiers |= 1,
            "control" | "ctrl" => modifiers |= 2,
            "meta" | "command" | "cmd" => modifiers |= 4,
            "shift" => modifiers |= 8,
            "" => {}
            _ => key = trimmed.to_string(),
        }
    }
    (modifiers, key)
}

async fn dispatch_key(
    page: &Page,
    kind: DispatchKeyEventType,
    key: &str,
    modifiers: i64,
) -> Result<(), SessionError> {
    let include_text = key.chars().count() == 1 && matches!(kind, DispatchKeyEventType::KeyDown);
    let mut builder = DispatchKeyEventParams::builder()
        .r#type(kind)
        .key(key)
        .modifiers(modifiers);
    if include_text {
        builder = builder.text(key);
    }
    let params = builder
        .build()
        .map_err(|err| SessionError::page(format!("building key event failed: {err}")))?;
    page.execute(params)
        .await
        .map_err(|err| SessionError::page(format!("dispatching '{key}' failed: {err}")))?;
    Ok(())
}
