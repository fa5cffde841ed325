//! Element interaction tools: click, text entry, key dispatch.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{feedback_suffix, parse_args, Tool, ToolCtx};
use crate::errors::AgentError;
use crate::events::ExecutionState;

fn selector_property(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

#[derive(Debug, Deserialize)]
struct ClickArgs {
    selector: String,
}

/// Clicks the element matching a CSS selector.
pub struct ClickTool;

#[async_trait]
impl Tool for ClickTool {
    fn name(&self) -> &'static str {
        "click_element"
    }

    fn description(&self) -> &'static str {
        "Click the element matching the given CSS selector on the current page."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "selector": selector_property("CSS selector of the element to click.")
            },
            "required": ["selector"]
        })
    }

    async fn invoke(&self, ctx: &ToolCtx, args: Value) -> Result<String, AgentError> {
        let args: ClickArgs = parse_args(self.name(), args)?;
        ctx.emit_act(
            ExecutionState::ActStart,
            self.name(),
            format!("Clicking element '{}'", args.selector),
        )
        .await?;

        let outcome = ctx.browser.click(&args.selector).await?;
        let message = format!(
            "Clicked element '{}'.{}",
            args.selector,
            feedback_suffix(&outcome)
        );
        ctx.emit_act(ExecutionState::ActOk, self.name(), message.clone())
            .await?;
        Ok(message)
    }
}

#[derive(Debug, Deserialize)]
struct EnterTextArgs {
    selector: String,
    text: String,
    /// Press Enter after typing; intended for search fields.
    #[serde(default)]
    submit: bool,
}

/// Types text into the element matching a CSS selector.
pub struct EnterTextTool;

#[async_trait]
impl Tool for EnterTextTool {
    fn name(&self) -> &'static str {
        "enter_text"
    }

    fn description(&self) -> &'static str {
        "Focus the element matching the CSS selector and type the given text into it. \
         Set submit to true to press Enter afterwards (search fields)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "selector": selector_property("CSS selector of the input element."),
                "text": { "type": "string", "description": "Text to type." },
                "submit": { "type": "boolean", "description": "Press Enter after typing. Default false." }
            },
            "required": ["selector", "text"]
        })
    }

    async fn invoke(&self, ctx: &ToolCtx, args: Value) -> Result<String, AgentError> {
        let args: EnterTextArgs = parse_args(self.name(), args)?;
        ctx.emit_act(
            ExecutionState::ActStart,
            self.name(),
            format!("Entering text into '{}'", args.selector),
        )
        .await?;

        let outcome = ctx
            .browser
            .type_text(&args.selector, &args.text, args.submit)
            .await?;
        let message = format!(
            "Entered \"{}\" into '{}'.{}",
            args.text,
            args.selector,
            feedback_suffix(&outcome)
        );
        ctx.emit_act(ExecutionState::ActOk, self.name(), message.clone())
            .await?;
        Ok(message)
    }
}

#[derive(Debug, Deserialize)]
struct EnterTextAndClickArgs {
    text_selector: String,
    text: String,
    click_selector: String,
}

/// Types text into one element, then clicks another; the common
/// fill-then-submit form interaction as one call.
pub struct EnterTextAndClickTool;

#[async_trait]
impl Tool for EnterTextAndClickTool {
    fn name(&self) -> &'static str {
        "enter_text_and_click"
    }

    fn description(&self) -> &'static str {
        "Type text into the element matching text_selector, then click the element matching click_selector."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text_selector": selector_property("CSS selector of the input element."),
                "text": { "type": "string", "description": "Text to type." },
                "click_selector": selector_property("CSS selector of the element to click afterwards.")
            },
            "required": ["text_selector", "text", "click_selector"]
        })
    }

    async fn invoke(&self, ctx: &ToolCtx, args: Value) -> Result<String, AgentError> {
        let args: EnterTextAndClickArgs = parse_args(self.name(), args)?;
        ctx.emit_act(
            ExecutionState::ActStart,
            self.name(),
            format!(
                "Entering text into '{}' and clicking '{}'",
                args.text_selector, args.click_selector
            ),
        )
        .await?;

        ctx.browser
            .type_text(&args.text_selector, &args.text, false)
            .await?;
        let outcome = ctx.browser.click(&args.click_selector).await?;
        let message = format!(
            "Entered \"{}\" into '{}' and clicked '{}'.{}",
            args.text,
            args.text_selector,
            args.click_selector,
            feedback_suffix(&outcome)
        );
        ctx.emit_act(ExecutionState::ActOk, self.name(), message.clone())
            .await?;
        Ok(message)
    }
}

#[derive(Debug, Deserialize)]
struct PressKeyArgs {
    keys: String,
}

/// Dispatches a key or key combination to the page.
pub struct PressKeyTool;

#[async_trait]
impl Tool for PressKeyTool {
    fn name(&self) -> &'static str {
        "press_key_combination"
    }

    fn description(&self) -> &'static str {
        "Press a key or key combination on the current page, e.g. \"Enter\" or \"Control+A\"."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keys": {
                    "type": "string",
                    "description": "Key or '+'-joined combination, e.g. \"Enter\", \"Control+A\"."
                }
            },
            "required": ["keys"]
        })
    }

    async fn invoke(&self, ctx: &ToolCtx, args: Value) -> Result<String, AgentError> {
        let args: PressKeyArgs = parse_args(self.name(), args)?;
        ctx.emit_act(
            ExecutionState::ActStart,
            self.name(),
            format!("Pressing '{}'", args.keys),
        )
        .await?;

        let outcome = ctx.browser.press_keys(&args.keys).await?;
        let message = format!("Pressed '{}'.{}", args.keys, feedback_suffix(&outcome));
        ctx.emit_act(ExecutionState::ActOk, self.name(), message.clone())
            .await?;
        Ok(message)
    }
}
