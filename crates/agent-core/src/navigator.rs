//! Navigator role: executes one sub-task through bounded rounds of tool
//! invocation.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use webpilot_core_types::Actor;

use crate::bus::ExecutionBus;
use crate::context::SharedContext;
use crate::decision::{DecisionService, ToolInvocation};
use crate::errors::AgentError;
use crate::events::{Event, EventData, ExecutionState};
use crate::history::{ChatMessage, ConversationHistory};
use crate::ports::BrowserPort;
use crate::prompts::{NavigatorPrompt, ROUND_REVIEW_PROMPT, TERMINATE_SENTINEL};
use crate::tools::{ToolCtx, ToolRegistry, ToolSpec};

pub struct Navigator {
    decision: Arc<dyn DecisionService>,
    browser: Arc<dyn BrowserPort>,
    bus: Arc<ExecutionBus>,
    context: SharedContext,
    prompt: NavigatorPrompt,
    registry: Arc<ToolRegistry>,
    history: Mutex<ConversationHistory>,
}

impl Navigator {
    pub fn new(
        decision: Arc<dyn DecisionService>,
        browser: Arc<dyn BrowserPort>,
        bus: Arc<ExecutionBus>,
        context: SharedContext,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            decision,
            browser,
            bus,
            context,
            prompt: NavigatorPrompt,
            registry,
            history: Mutex::new(ConversationHistory::new()),
        }
    }

    pub async fn reset(&self) {
        self.history.lock().await.clear();
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.history.lock().await.to_vec()
    }

    /// Execute one sub-task. The conversation is cleared on entry: the
    /// navigator is stateless across sub-tasks and sees only the sub-task
    /// text plus the live page info.
    pub async fn step(&self, sub_task: &str) -> Result<String, AgentError> {
        let step = self.context.begin_navigation().await;
        let task_id = self.context.snapshot().await.task_id;
        debug!(step, sub_task, "navigating");

        if let Err(err) = self
            .bus
            .emit(Event::create(
                ExecutionState::StepStart,
                Actor::Navigator,
                EventData::new(task_id.clone(), step).with_details(sub_task),
            ))
            .await
        {
            return Err(self
                .fail_step(
                    EventData::new(task_id, step).with_details(err.to_string()),
                    err,
                )
                .await);
        }

        {
            let mut history = self.history.lock().await;
            history.clear();
            history.push(ChatMessage::system(self.prompt.system_prompt()));
        }
        let info = match self.browser.page_info().await {
            Ok(info) => info,
            Err(err) => {
                return Err(self
                    .fail_step(
                        EventData::new(task_id, step).with_details(err.to_string()),
                        err,
                    )
                    .await);
            }
        };
        self.history.lock().await.push(ChatMessage::user(
            self.prompt
                .user_prompt(sub_task, Some(&info.url), Some(&info.title)),
        ));

        let specs: Vec<ToolSpec> = self.registry.specs();
        let token = self.context.cancel_token().await;
        let snapshot = self.context.snapshot().await;
        let mut rounds_left = snapshot.max_tool_rounds;
        let tool_ctx = ToolCtx {
            context: self.context.clone(),
            browser: Arc::clone(&self.browser),
            bus: Arc::clone(&self.bus),
        };

        loop {
            if token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if rounds_left == 0 {
                let round = self.context.snapshot().await.tool_round;
                let err = AgentError::decision("too many rounds of tool calls in subtask");
                return Err(self
                    .fail_step(
                        EventData::new(task_id, step)
                            .with_tool_round(round)
                            .with_details(err.to_string()),
                        err,
                    )
                    .await);
            }

            let messages = self.history.lock().await.to_vec();
            let decision = match self.decision.invoke_with_tools(&messages, &specs).await {
                Ok(decision) => decision,
                Err(err) => {
                    let round = self.context.snapshot().await.tool_round;
                    return Err(self
                        .fail_step(
                            EventData::new(task_id, step)
                                .with_tool_round(round)
                                .with_details(err.to_string()),
                            err,
                        )
                        .await);
                }
            };

            if decision.tool_calls.is_empty() {
                // terminal text; strip the sentinel before reporting upstream
                let text = decision
                    .text
                    .unwrap_or_default()
                    .replace(TERMINATE_SENTINEL, "")
                    .trim()
                    .to_string();
                let round = self.context.snapshot().await.tool_round;
                let data = EventData::new(task_id, step)
                    .with_tool_round(round)
                    .with_details(text.clone())
                    .final_response();
                if let Err(err) = self
                    .bus
                    .emit(Event::create(
                        ExecutionState::StepOk,
                        Actor::Navigator,
                        data.clone(),
                    ))
                    .await
                {
                    return Err(self.fail_step(data.with_details(err.to_string()), err).await);
                }
                return Ok(text);
            }

            let round = self.context.begin_tool_round().await;
            debug!(round, calls = decision.tool_calls.len(), "executing tool round");
            self.history.lock().await.push(ChatMessage::assistant_tool_calls(
                decision.text.clone().unwrap_or_default(),
                raw_tool_calls(&decision.tool_calls),
            ));

            // strictly sequential: later calls may depend on DOM state
            // mutated by earlier ones in the same round
            for call in &decision.tool_calls {
                if token.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                let result = self.run_tool(&tool_ctx, call).await;
                self.history
                    .lock()
                    .await
                    .push(ChatMessage::tool(call.id.clone(), result));
            }

            // ask the service to judge sub-task completion against the
            // fresh page state
            let info = match self.browser.page_info().await {
                Ok(info) => info,
                Err(err) => {
                    return Err(self
                        .fail_step(
                            EventData::new(task_id, step)
                                .with_tool_round(round)
                                .with_details(err.to_string()),
                            err,
                        )
                        .await);
                }
            };
            self.history.lock().await.push(ChatMessage::user(
                self.prompt
                    .user_prompt(ROUND_REVIEW_PROMPT, Some(&info.url), Some(&info.title)),
            ));

            rounds_left -= 1;
        }
    }

    /// Run one tool call, converting failures into readable result strings
    /// handed back to the decision service.
    async fn run_tool(&self, tool_ctx: &ToolCtx, call: &ToolInvocation) -> String {
        let Some(tool) = self.registry.get(&call.name) else {
            let message = format!("Tool '{}' is not registered", call.name);
            self.emit_act_fail(tool_ctx, &call.name, &message).await;
            return message;
        };
        match tool.invoke(tool_ctx, call.arguments.clone()).await {
            Ok(result) => result,
            Err(err) => {
                let message = format!("Tool '{}' failed: {err}", call.name);
                self.emit_act_fail(tool_ctx, &call.name, &message).await;
                message
            }
        }
    }

    async fn emit_act_fail(&self, tool_ctx: &ToolCtx, tool: &str, details: &str) {
        if let Err(err) = tool_ctx
            .emit_act(ExecutionState::ActFail, tool, details.to_string())
            .await
        {
            warn!(error = %err, "failed to emit act.fail");
        }
    }

    async fn fail_step(&self, data: EventData, err: AgentError) -> AgentError {
        self.context.record_error().await;
        if let Err(bus_err) = self
            .bus
            .emit(Event::create(
                ExecutionState::StepFail,
                Actor::Navigator,
                data,
            ))
            .await
        {
            warn!(error = %bus_err, "failed to emit step.fail");
        }
        err
    }
}

/// Tool calls of an assistant turn in the shape the decision service expects
/// them to be replayed.
fn raw_tool_calls(calls: &[ToolInvocation]) -> serde_json::Value {
    json!(calls
        .iter()
        .map(|call| {
            json!({
                "id": call.id,
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": call.arguments.to_string(),
                }
            })
        })
        .collect::<Vec<_>>())
}
