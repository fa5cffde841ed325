//! OpenAI-compatible chat-completions client implementing the decision
//! service seam. Works against any endpoint speaking that dialect
//! (hosted APIs, local gateways).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use agent_core::{
    AgentError, ChatMessage, ChatRole, DecisionService, StructuredDecision, ToolDecision,
    ToolInvocation, ToolSpec,
};

use crate::config::ModelConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiCompatService {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f64>,
}

impl OpenAiCompatService {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(env_name) => Some(
                std::env::var(env_name)
                    .with_context(|| format!("missing API key environment variable {env_name}"))?,
            ),
            None => None,
        };
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<ResponseMessage, AgentError> {
        let url = format!("{}/chat/completions", self.api_base);
        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| AgentError::decision(format!("request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::decision(format!(
                "endpoint returned {status}: {body}"
            )));
        }
        let mut parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| AgentError::decision(format!("unexpected response shape: {err}")))?;
        if parsed.choices.is_empty() {
            return Err(AgentError::decision("response contained no choices"));
        }
        Ok(parsed.choices.remove(0).message)
    }
}

#[async_trait]
impl DecisionService for OpenAiCompatService {
    async fn invoke_structured(
        &self,
        messages: &[ChatMessage],
        schema: &Value,
    ) -> Result<StructuredDecision, AgentError> {
        let request = ChatRequest {
            model: &self.model,
            messages: wire_messages(messages),
            temperature: self.temperature,
            tools: None,
            response_format: Some(json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "planner_decision",
                    "schema": schema,
                }
            })),
        };
        let message = self.chat(&request).await?;
        let raw = message.content.unwrap_or_default();
        // unparseable content is reported as absent, not as an error; the
        // caller's retry combinator owns that decision
        let parsed = serde_json::from_str::<Value>(&raw).ok();
        Ok(StructuredDecision { parsed, raw })
    }

    async fn invoke_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ToolDecision, AgentError> {
        let request = ChatRequest {
            model: &self.model,
            messages: wire_messages(messages),
            temperature: self.temperature,
            tools: Some(
                tools
                    .iter()
                    .map(|spec| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": spec.name,
                                "description": spec.description,
                                "parameters": spec.parameters,
                            }
                        })
                    })
                    .collect(),
            ),
            response_format: None,
        };
        let message = self.chat(&request).await?;
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolInvocation {
                id: call.id.unwrap_or_else(|| "call-0".to_string()),
                name: call.function.name,
                arguments: parse_arguments(call.function.arguments),
            })
            .collect();
        Ok(ToolDecision {
            text: message.content,
            tool_calls,
        })
    }
}

/// Tool-call arguments arrive as a JSON-encoded string on OpenAI-compatible
/// endpoints, but some local gateways inline the object.
fn parse_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(json!({})),
        Value::Null => json!({}),
        other => other,
    }
}

fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|message| WireMessage {
            role: match message.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::Tool => "tool",
            },
            content: message.content.clone(),
            tool_call_id: message.tool_call_id.clone(),
            tool_calls: message.tool_calls.clone(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}
