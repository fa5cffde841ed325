//! Bridges the execution core's browser seam onto the live session layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use agent_core::{ActionOutcome, AgentError, BrowserPort, PageInfo, TabBinding};
use browser_session::BrowserSession;

pub struct SessionBrowserPort {
    session: Arc<BrowserSession>,
}

impl SessionBrowserPort {
    pub fn new(session: Arc<BrowserSession>) -> Arc<Self> {
        Arc::new(Self { session })
    }

    async fn pages(&self) -> Result<Arc<browser_session::PageSession>, AgentError> {
        self.session
            .pages()
            .await
            .map_err(|err| AgentError::browser(err.to_string()))
    }
}

#[async_trait]
impl BrowserPort for SessionBrowserPort {
    async fn page_info(&self) -> Result<PageInfo, AgentError> {
        let info = self
            .pages()
            .await?
            .page_info()
            .await
            .map_err(|err| AgentError::browser(err.to_string()))?;
        Ok(PageInfo {
            url: info.url,
            title: info.title,
        })
    }

    async fn bind_tab(&self, tab_id: Option<&str>) -> Result<TabBinding, AgentError> {
        let binding = self
            .pages()
            .await?
            .set_current_page(tab_id)
            .await
            .map_err(|err| AgentError::browser(err.to_string()))?;
        Ok(TabBinding {
            fallback: binding.fallback,
            detail: binding.detail,
        })
    }

    async fn navigate(&self, url: &str, wait: Duration) -> Result<PageInfo, AgentError> {
        let info = self
            .pages()
            .await?
            .navigate(url, wait)
            .await
            .map_err(|err| AgentError::browser(err.to_string()))?;
        Ok(PageInfo {
            url: info.url,
            title: info.title,
        })
    }

    async fn click(&self, selector: &str) -> Result<ActionOutcome, AgentError> {
        let feedback = self
            .pages()
            .await?
            .click(selector)
            .await
            .map_err(|err| AgentError::browser(err.to_string()))?;
        Ok(ActionOutcome {
            dom_changed: feedback.dom_changed,
        })
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        submit: bool,
    ) -> Result<ActionOutcome, AgentError> {
        let feedback = self
            .pages()
            .await?
            .type_text(selector, text, submit)
            .await
            .map_err(|err| AgentError::browser(err.to_string()))?;
        Ok(ActionOutcome {
            dom_changed: feedback.dom_changed,
        })
    }

    async fn press_keys(&self, combo: &str) -> Result<ActionOutcome, AgentError> {
        let feedback = self
            .pages()
            .await?
            .press_keys(combo)
            .await
            .map_err(|err| AgentError::browser(err.to_string()))?;
        Ok(ActionOutcome {
            dom_changed: feedback.dom_changed,
        })
    }

    async fn dom_text(&self) -> Result<String, AgentError> {
        self.pages()
            .await?
            .dom_text()
            .await
            .map_err(|err| AgentError::browser(err.to_string()))
    }
}
