//! Browser tool set exposed to the navigator's decision service.
//!
//! The registry is a static, explicit mapping from tool name to
//! implementation, validated when the engine is constructed.

mod interact;
mod open_url;
mod read_page;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use webpilot_core_types::Actor;

use crate::bus::ExecutionBus;
use crate::context::SharedContext;
use crate::errors::AgentError;
use crate::events::{Event, EventData, ExecutionState};
use crate::ports::{ActionOutcome, BrowserPort};

pub use interact::{ClickTool, EnterTextAndClickTool, EnterTextTool, PressKeyTool};
pub use open_url::OpenUrlTool;
pub use read_page::{GetDomTextTool, GetPageUrlTool};

/// Description of a tool as handed to the decision service.
#[derive(Clone, Debug, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Execution context handed to each tool invocation.
pub struct ToolCtx {
    pub context: SharedContext,
    pub browser: Arc<dyn BrowserPort>,
    pub bus: Arc<ExecutionBus>,
}

impl ToolCtx {
    /// Emit an act-scoped event stamped with the current counters.
    pub async fn emit_act(
        &self,
        state: ExecutionState,
        tool: &str,
        details: impl Into<String>,
    ) -> Result<(), AgentError> {
        let snapshot = self.context.snapshot().await;
        self.bus
            .emit(Event::create(
                state,
                Actor::Navigator,
                EventData::new(snapshot.task_id, snapshot.step)
                    .with_tool_round(snapshot.tool_round)
                    .with_tool(tool)
                    .with_details(details),
            ))
            .await
    }
}

/// A capability performing one concrete browser action and returning a
/// human-readable result string.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    async fn invoke(&self, ctx: &ToolCtx, args: Value) -> Result<String, AgentError>;
}

/// Static tool registry. Lookup is case-insensitive because decision
/// services are sloppy about casing.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The standard browser tool set.
    pub fn standard() -> Result<Self, AgentError> {
        Self::with_tools(vec![
            Arc::new(OpenUrlTool),
            Arc::new(ClickTool),
            Arc::new(EnterTextTool),
            Arc::new(EnterTextAndClickTool),
            Arc::new(PressKeyTool),
            Arc::new(GetPageUrlTool),
            Arc::new(GetDomTextTool),
        ])
    }

    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Result<Self, AgentError> {
        let mut seen = HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name().to_ascii_lowercase()) {
                return Err(AgentError::invalid_request(format!(
                    "duplicate tool name: {}",
                    tool.name()
                )));
            }
        }
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|tool| tool.name().eq_ignore_ascii_case(name))
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }
}

/// Sentence appended to action results so the decision service learns
/// whether the action had visible side effects.
pub(crate) fn feedback_suffix(outcome: &ActionOutcome) -> &'static str {
    if outcome.dom_changed {
        " As a result, changes to the page were observed."
    } else {
        " No changes to the page were observed."
    }
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    tool: &str,
    args: Value,
) -> Result<T, AgentError> {
    serde_json::from_value(args)
        .map_err(|err| AgentError::invalid_request(format!("bad arguments for {tool}: {err}")))
}
