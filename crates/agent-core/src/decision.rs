//! Seam to the external reasoning capability consumed by both roles.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::errors::AgentError;
use crate::history::ChatMessage;
use crate::tools::ToolSpec;

/// Result of a structured invocation. `parsed` is absent when the service
/// returned output that did not match the requested schema; callers decide
/// whether to retry.
#[derive(Clone, Debug)]
pub struct StructuredDecision {
    pub parsed: Option<Value>,
    pub raw: String,
}

/// One tool invocation requested by the service.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Result of a tool-bound invocation: either a batch of tool calls or a
/// terminal text.
#[derive(Clone, Debug, Default)]
pub struct ToolDecision {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

/// Stateless request/response reasoning capability. Implementations wrap a
/// concrete model vendor; the engine never sees past this trait.
#[async_trait]
pub trait DecisionService: Send + Sync {
    /// Ask for output matching a JSON schema.
    async fn invoke_structured(
        &self,
        messages: &[ChatMessage],
        schema: &Value,
    ) -> Result<StructuredDecision, AgentError>;

    /// Ask for either tool calls against the given tool set or a terminal
    /// text.
    async fn invoke_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ToolDecision, AgentError>;
}

/// Deterministic service used by tests and offline development: responses
/// are drained from scripted queues, falling back to optional defaults.
#[derive(Default)]
pub struct ScriptedDecisionService {
    structured: Mutex<VecDeque<StructuredDecision>>,
    tool: Mutex<VecDeque<ToolDecision>>,
    default_structured: Option<StructuredDecision>,
    default_tool: Option<ToolDecision>,
}

impl ScriptedDecisionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repeat this structured decision once the queue is drained.
    pub fn with_default_structured(mut self, decision: StructuredDecision) -> Self {
        self.default_structured = Some(decision);
        self
    }

    /// Repeat this tool decision once the queue is drained.
    pub fn with_default_tool(mut self, decision: ToolDecision) -> Self {
        self.default_tool = Some(decision);
        self
    }

    pub async fn push_structured(&self, decision: StructuredDecision) {
        self.structured.lock().await.push_back(decision);
    }

    pub async fn push_tool(&self, decision: ToolDecision) {
        self.tool.lock().await.push_back(decision);
    }

    /// Scripted planner continuation.
    pub fn continue_with(plan: Option<&str>, next_step: &str) -> StructuredDecision {
        let mut value = serde_json::json!({
            "terminated": false,
            "next_step": next_step,
        });
        if let Some(plan) = plan {
            value["plan"] = Value::String(plan.to_string());
        }
        StructuredDecision {
            raw: value.to_string(),
            parsed: Some(value),
        }
    }

    /// Scripted planner termination.
    pub fn terminate_with(final_response: &str) -> StructuredDecision {
        let value = serde_json::json!({
            "terminated": true,
            "final_response": final_response,
        });
        StructuredDecision {
            raw: value.to_string(),
            parsed: Some(value),
        }
    }

    /// Scripted unparseable output.
    pub fn unparseable(raw: &str) -> StructuredDecision {
        StructuredDecision {
            parsed: None,
            raw: raw.to_string(),
        }
    }

    /// Scripted terminal navigator text.
    pub fn text(text: &str) -> ToolDecision {
        ToolDecision {
            text: Some(text.to_string()),
            tool_calls: Vec::new(),
        }
    }

    /// Scripted single tool call.
    pub fn tool_call(name: &str, arguments: Value) -> ToolDecision {
        ToolDecision {
            text: None,
            tool_calls: vec![ToolInvocation {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                arguments,
            }],
        }
    }
}

#[async_trait]
impl DecisionService for ScriptedDecisionService {
    async fn invoke_structured(
        &self,
        _messages: &[ChatMessage],
        _schema: &Value,
    ) -> Result<StructuredDecision, AgentError> {
        if let Some(decision) = self.structured.lock().await.pop_front() {
            return Ok(decision);
        }
        self.default_structured
            .clone()
            .ok_or_else(|| AgentError::decision("scripted structured responses exhausted"))
    }

    async fn invoke_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ToolDecision, AgentError> {
        if let Some(decision) = self.tool.lock().await.pop_front() {
            return Ok(decision);
        }
        self.default_tool
            .clone()
            .ok_or_else(|| AgentError::decision("scripted tool responses exhausted"))
    }
}
