//! Planner role: proposes the next sub-task or the final answer.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use webpilot_core_types::Actor;

use crate::bus::ExecutionBus;
use crate::context::SharedContext;
use crate::decision::DecisionService;
use crate::errors::AgentError;
use crate::events::{Event, EventData, ExecutionState};
use crate::history::{ChatMessage, ConversationHistory};
use crate::ports::BrowserPort;
use crate::prompts::PlannerPrompt;
use crate::retry::{self, RetryPolicy};

/// Structured output requested from the decision service.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PlannerDecision {
    /// True when the task is complete or impossible.
    #[serde(default)]
    pub terminated: bool,
    /// High-level plan, present at task start or when revised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// The next immediate sub-task for the navigator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    /// Final answer to the user, set when terminating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,
}

/// What the engine does next.
#[derive(Clone, Debug, PartialEq)]
pub enum PlannerVerdict {
    Terminate {
        final_response: String,
    },
    Continue {
        plan: Option<String>,
        next_step: String,
    },
}

pub struct Planner {
    decision: Arc<dyn DecisionService>,
    browser: Arc<dyn BrowserPort>,
    bus: Arc<ExecutionBus>,
    context: SharedContext,
    prompt: PlannerPrompt,
    retry: RetryPolicy,
    history: Mutex<ConversationHistory>,
    schema: Value,
}

impl Planner {
    pub fn new(
        decision: Arc<dyn DecisionService>,
        browser: Arc<dyn BrowserPort>,
        bus: Arc<ExecutionBus>,
        context: SharedContext,
        retry: RetryPolicy,
    ) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(PlannerDecision))
            .unwrap_or_else(|_| serde_json::json!({ "type": "object" }));
        Self {
            decision,
            browser,
            bus,
            context,
            prompt: PlannerPrompt,
            retry,
            history: Mutex::new(ConversationHistory::new()),
            schema,
        }
    }

    /// Clear the conversation. Called between tasks, never within one.
    pub async fn reset(&self) {
        self.history.lock().await.clear();
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.history.lock().await.to_vec()
    }

    /// One planner decision cycle.
    pub async fn step(&self, input: &str) -> Result<PlannerVerdict, AgentError> {
        let step = self.context.begin_step().await;
        let task_id = self.context.snapshot().await.task_id;
        debug!(step, input, "planning");

        if let Err(err) = self
            .bus
            .emit(Event::create(
                ExecutionState::StepStart,
                Actor::Planner,
                EventData::new(task_id.clone(), step).with_details(input),
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

        let follow_up = step > 1;
        {
            let mut history = self.history.lock().await;
            // one system message per task, added on the first step only
            if history.is_empty() {
                history.push(ChatMessage::system(self.prompt.system_prompt()));
            }
        }
        let info = match self.browser.page_info().await {
            Ok(info) => info,
            Err(err) => {
                return Err(self
                    .fail_step(EventData::new(task_id, step).with_details(err.to_string()), err)
                    .await);
            }
        };
        let messages = {
            let mut history = self.history.lock().await;
            history.push(ChatMessage::user(self.prompt.user_prompt(
                input,
                Some(&info.url),
                Some(&info.title),
                follow_up,
            )));
            history.to_vec()
        };

        let token = self.context.cancel_token().await;
        let decision = match retry::bounded(self.retry, &token, || {
            let messages = messages.clone();
            async move {
                let result = self
                    .decision
                    .invoke_structured(&messages, &self.schema)
                    .await?;
                Ok::<_, AgentError>(match result.parsed {
                    Some(value) => serde_json::from_value::<PlannerDecision>(value).ok(),
                    None => None,
                })
            }
        })
        .await
        {
            Ok(decision) => decision,
            Err(err) => {
                return Err(self
                    .fail_step(
                        EventData::new(task_id, step).with_details(err.to_string()),
                        err,
                    )
                    .await);
            }
        };

        if token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let Some(decision) = decision else {
            let err = AgentError::decision("planner returned no parseable decision after retries");
            return Err(self
                .fail_step(
                    EventData::new(task_id, step).with_details(err.to_string()),
                    err,
                )
                .await);
        };

        {
            let mut history = self.history.lock().await;
            history.push(ChatMessage::assistant(
                serde_json::to_string(&decision).unwrap_or_default(),
            ));
        }

        let mut data = EventData::new(task_id, step);
        if decision.terminated {
            let final_response = decision.final_response.unwrap_or_default();
            data = data.with_details(final_response.clone()).final_response();
            if let Err(err) = self
                .bus
                .emit(Event::create(ExecutionState::StepOk, Actor::Planner, data.clone()))
                .await
            {
                return Err(self.fail_step(data.with_details(err.to_string()), err).await);
            }
            return Ok(PlannerVerdict::Terminate { final_response });
        }

        if let Some(plan) = &decision.plan {
            data = data.with_plan(plan.clone());
        }
        let Some(next_step) = decision.next_step else {
            // recoverable: the planner produced a plan but no next step
            let err = AgentError::decision("plan provided without a next step");
            return Err(self.fail_step(data.with_details(err.to_string()), err).await);
        };

        data = data.with_details(next_step.clone());
        if let Err(err) = self
            .bus
            .emit(Event::create(ExecutionState::StepOk, Actor::Planner, data.clone()))
            .await
        {
            return Err(self.fail_step(data.with_details(err.to_string()), err).await);
        }
        Ok(PlannerVerdict::Continue {
            plan: decision.plan,
            next_step,
        })
    }

    /// Count the error against the budget and report the step failure.
    async fn fail_step(&self, data: EventData, err: AgentError) -> AgentError {
        self.context.record_error().await;
        if let Err(bus_err) = self
            .bus
            .emit(Event::create(ExecutionState::StepFail, Actor::Planner, data))
            .await
        {
            warn!(error = %bus_err, "failed to emit step.fail");
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_schema_exposes_all_fields() {
        let schema = serde_json::to_value(schemars::schema_for!(PlannerDecision)).unwrap();
        let text = schema.to_string();
        for field in ["terminated", "plan", "next_step", "final_response"] {
            assert!(text.contains(field), "schema is missing {field}");
        }
    }

    #[test]
    fn decision_deserializes_with_defaults() {
        let decision: PlannerDecision = serde_json::from_str("{}").unwrap();
        assert!(!decision.terminated);
        assert!(decision.next_step.is_none());
    }
}
