//! Read-only page tools. These do not mutate the page and emit no act
//! events.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolCtx};
use crate::errors::AgentError;

const MAX_URL_LEN: usize = 250;
const MAX_DOM_TEXT_LEN: usize = 8_000;

/// Reports the url and title of the current page.
pub struct GetPageUrlTool;

#[async_trait]
impl Tool for GetPageUrlTool {
    fn name(&self) -> &'static str {
        "get_page_url"
    }

    fn description(&self) -> &'static str {
        "Return the full URL and title of the browser's active page."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, ctx: &ToolCtx, _args: Value) -> Result<String, AgentError> {
        let info = ctx.browser.page_info().await?;
        let url = truncate(&info.url, MAX_URL_LEN);
        if info.title.is_empty() {
            Ok(format!("Current page: {url}"))
        } else {
            Ok(format!("Current page: {url}, Title: {}", info.title))
        }
    }
}

/// Returns the visible text of the current page so the decision service can
/// answer questions about its content.
pub struct GetDomTextTool;

#[async_trait]
impl Tool for GetDomTextTool {
    fn name(&self) -> &'static str {
        "get_dom_text"
    }

    fn description(&self) -> &'static str {
        "Return the visible text content of the current page. Use this to answer questions about the page."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, ctx: &ToolCtx, _args: Value) -> Result<String, AgentError> {
        let text = ctx.browser.dom_text().await?;
        Ok(truncate(&text, MAX_DOM_TEXT_LEN))
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_text_alone() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_cuts_long_text() {
        let long = "x".repeat(300);
        let cut = truncate(&long, 250);
        assert_eq!(cut.chars().count(), 253);
        assert!(cut.ends_with("..."));
    }
}
