use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, Tool, ToolCtx};
use crate::errors::AgentError;
use crate::events::ExecutionState;

const NAME: &str = "open_url";

#[derive(Debug, Deserialize)]
struct OpenUrlArgs {
    url: String,
    /// Seconds granted to the navigation before it is allowed to settle in
    /// the background.
    #[serde(default)]
    timeout: Option<u64>,
}

/// Opens a url in the tracked page. Navigation timeouts are tolerated; the
/// load usually completes afterwards.
pub struct OpenUrlTool;

#[async_trait]
impl Tool for OpenUrlTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Open the specified URL in the active browser page and report the loaded page's URL and title."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to navigate to. https:// is assumed when the protocol is missing."
                },
                "timeout": {
                    "type": "integer",
                    "description": "Seconds to wait for the navigation to settle. Default 3."
                }
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, ctx: &ToolCtx, args: Value) -> Result<String, AgentError> {
        let args: OpenUrlArgs = parse_args(NAME, args)?;
        let url = ensure_protocol(&args.url);
        ctx.emit_act(ExecutionState::ActStart, NAME, format!("Opening URL: {url}"))
            .await?;

        let wait = Duration::from_secs(args.timeout.unwrap_or(3).max(1));
        let info = ctx.browser.navigate(&url, wait).await?;

        let message = format!("Page loaded: {}, Title: {}", info.url, info.title);
        ctx.emit_act(ExecutionState::ActOk, NAME, message.clone())
            .await?;
        Ok(message)
    }
}

fn ensure_protocol(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_is_added_when_missing() {
        assert_eq!(ensure_protocol("example.com"), "https://example.com");
        assert_eq!(ensure_protocol("http://example.com"), "http://example.com");
        assert_eq!(
            ensure_protocol("https://example.com"),
            "https://example.com"
        );
    }
}
