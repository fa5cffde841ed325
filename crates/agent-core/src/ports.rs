//! Port onto the live browser. The engine, roles and tools consume this
//! seam; the binary wires it to the real session layer, tests to a stub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::AgentError;

/// Url and title of the active page, annotated onto every role turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// Result of binding the session to an externally supplied tab id.
/// `fallback` is set when no open page matched and the session degraded to
/// the existing or a fresh page.
#[derive(Clone, Debug)]
pub struct TabBinding {
    pub fallback: bool,
    pub detail: String,
}

/// Feedback from a page-mutating operation: whether DOM side effects were
/// observed after the settle delay.
#[derive(Clone, Copy, Debug)]
pub struct ActionOutcome {
    pub dom_changed: bool,
}

#[async_trait]
pub trait BrowserPort: Send + Sync {
    async fn page_info(&self) -> Result<PageInfo, AgentError>;

    async fn bind_tab(&self, tab_id: Option<&str>) -> Result<TabBinding, AgentError>;

    /// Navigate; a load that does not settle within `wait` is tolerated.
    async fn navigate(&self, url: &str, wait: Duration) -> Result<PageInfo, AgentError>;

    async fn click(&self, selector: &str) -> Result<ActionOutcome, AgentError>;

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        submit: bool,
    ) -> Result<ActionOutcome, AgentError>;

    async fn press_keys(&self, combo: &str) -> Result<ActionOutcome, AgentError>;

    /// Visible text of the page body.
    async fn dom_text(&self) -> Result<String, AgentError>;
}

/// In-memory port used by tests and offline development. Operations
/// succeed, report DOM changes, and are recorded for assertions.
pub struct StubBrowserPort {
    info: Mutex<PageInfo>,
    calls: Mutex<Vec<String>>,
}

impl StubBrowserPort {
    pub fn new(url: &str, title: &str) -> Arc<Self> {
        Arc::new(Self {
            info: Mutex::new(PageInfo {
                url: url.to_string(),
                title: title.to_string(),
            }),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: String) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl BrowserPort for StubBrowserPort {
    async fn page_info(&self) -> Result<PageInfo, AgentError> {
        Ok(self.info.lock().await.clone())
    }

    async fn bind_tab(&self, tab_id: Option<&str>) -> Result<TabBinding, AgentError> {
        self.record(format!("bind_tab:{}", tab_id.unwrap_or("-"))).await;
        Ok(TabBinding {
            fallback: false,
            detail: self.info.lock().await.url.clone(),
        })
    }

    async fn navigate(&self, url: &str, _wait: Duration) -> Result<PageInfo, AgentError> {
        self.record(format!("navigate:{url}")).await;
        let mut info = self.info.lock().await;
        info.url = url.to_string();
        Ok(info.clone())
    }

    async fn click(&self, selector: &str) -> Result<ActionOutcome, AgentError> {
        self.record(format!("click:{selector}")).await;
        Ok(ActionOutcome { dom_changed: true })
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        submit: bool,
    ) -> Result<ActionOutcome, AgentError> {
        self.record(format!("type_text:{selector}:{text}:{submit}")).await;
        Ok(ActionOutcome { dom_changed: true })
    }

    async fn press_keys(&self, combo: &str) -> Result<ActionOutcome, AgentError> {
        self.record(format!("press_keys:{combo}")).await;
        Ok(ActionOutcome { dom_changed: false })
    }

    async fn dom_text(&self) -> Result<String, AgentError> {
        self.record("dom_text".to_string()).await;
        Ok("stub page text".to_string())
    }
}
