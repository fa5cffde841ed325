//! Execution event model.
//!
//! States are `<scope>.<status>`: scopes {task, step, act}, statuses
//! {start, ok, fail, cancel}. Nesting is implicit through the shared
//! task_id/step/tool_round fields, not parent references.

use serde::{Deserialize, Serialize};
use webpilot_core_types::{current_timestamp, Actor, TaskId};

/// Subscription topics. Only execution events exist today.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Execution,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ExecutionState {
    #[serde(rename = "task.start")]
    TaskStart,
    #[serde(rename = "task.ok")]
    TaskOk,
    #[serde(rename = "task.fail")]
    TaskFail,
    #[serde(rename = "task.cancel")]
    TaskCancel,

    #[serde(rename = "step.start")]
    StepStart,
    #[serde(rename = "step.ok")]
    StepOk,
    #[serde(rename = "step.fail")]
    StepFail,
    #[serde(rename = "step.cancel")]
    StepCancel,

    #[serde(rename = "act.start")]
    ActStart,
    #[serde(rename = "act.ok")]
    ActOk,
    #[serde(rename = "act.fail")]
    ActFail,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskStart => "task.start",
            Self::TaskOk => "task.ok",
            Self::TaskFail => "task.fail",
            Self::TaskCancel => "task.cancel",
            Self::StepStart => "step.start",
            Self::StepOk => "step.ok",
            Self::StepFail => "step.fail",
            Self::StepCancel => "step.cancel",
            Self::ActStart => "act.start",
            Self::ActOk => "act.ok",
            Self::ActFail => "act.fail",
        }
    }

    /// Terminal states finalize the task document.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TaskOk | Self::TaskFail | Self::TaskCancel)
    }
}

/// Payload shared by every execution event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub task_id: TaskId,
    /// Step number of the task where the event occurred.
    pub step: u32,
    /// Tool round within the step, 0 outside navigator tool loops.
    #[serde(default)]
    pub tool_round: u32,
    #[serde(default)]
    pub details: String,
    /// Set when the event carries the actor's final response.
    #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
    /// Present when the planner made or revised a plan at this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Tool name for act-scoped events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl EventData {
    pub fn new(task_id: TaskId, step: u32) -> Self {
        Self {
            task_id,
            step,
            tool_round: 0,
            details: String::new(),
            is_final: None,
            plan: None,
            tool: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_tool_round(mut self, tool_round: u32) -> Self {
        self.tool_round = tool_round;
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn final_response(mut self) -> Self {
        self.is_final = Some(true);
        self
    }
}

/// One immutable record of a state transition during task execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub state: ExecutionState,
    pub actor: Actor,
    pub data: EventData,
    pub timestamp: String,
}

impl Event {
    pub fn create(state: ExecutionState, actor: Actor, data: EventData) -> Self {
        Self {
            kind: EventType::Execution,
            state,
            actor,
            data,
            timestamp: current_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_serialize_in_scope_dot_status_form() {
        assert_eq!(
            serde_json::to_string(&ExecutionState::TaskStart).unwrap(),
            "\"task.start\""
        );
        assert_eq!(
            serde_json::to_string(&ExecutionState::StepFail).unwrap(),
            "\"step.fail\""
        );
    }

    #[test]
    fn terminal_states_are_task_scoped() {
        assert!(ExecutionState::TaskOk.is_terminal());
        assert!(ExecutionState::TaskCancel.is_terminal());
        assert!(!ExecutionState::StepFail.is_terminal());
        assert!(!ExecutionState::ActOk.is_terminal());
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = Event::create(
            ExecutionState::StepOk,
            Actor::Planner,
            EventData::new(TaskId::new("t1"), 2)
                .with_details("open the weather site")
                .with_plan("1. open site\n2. read temperature"),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
        assert!(json.contains("\"type\":\"execution\""));
    }
}
