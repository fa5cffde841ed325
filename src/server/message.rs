//! Control-channel message shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agent_core::{Event, EventData, ExecutionState};
use webpilot_core_types::{current_timestamp, Actor};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Application-level heartbeat.
    Hb,
    /// Heartbeat acknowledgment.
    Ack,
    /// Create a new task.
    Create,
    /// Cancel the running task.
    Cancel,
    /// Task state update pushed to the client.
    State,
    /// Error report.
    Error,
    /// Request the current running task id.
    GetTask,
    /// Response carrying the current running task id.
    CurrentTask,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WsMessage {
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WsMessage {
    pub fn new(kind: MessageKind, data: Option<Value>) -> Self {
        Self { kind, data }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTask {
    pub task_id: String,
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// External tab to rebind the page session to, when the controller
    /// tracks tabs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CancelTask {
    pub task_id: String,
}

/// Execution event as pushed over the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub state: ExecutionState,
    pub actor: Actor,
    pub data: EventData,
    pub timestamp: String,
}

impl TaskState {
    pub fn from_event(event: &Event) -> Self {
        Self {
            task_id: event.data.task_id.to_string(),
            state: event.state,
            actor: event.actor,
            data: event.data.clone(),
            timestamp: event.timestamp.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorReport {
    pub task_id: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorReport {
    pub fn new(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            message: message.into(),
            timestamp: current_timestamp(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurrentTask {
    pub task_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_use_wire_names() {
        assert_eq!(serde_json::to_string(&MessageKind::Hb).unwrap(), "\"hb\"");
        assert_eq!(
            serde_json::to_string(&MessageKind::GetTask).unwrap(),
            "\"get_task\""
        );
    }

    #[test]
    fn create_message_round_trips() {
        let json = r#"{"kind":"create","data":{"task_id":"t1","intent":"do it"}}"#;
        let message: WsMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.kind, MessageKind::Create);
        let create: CreateTask = serde_json::from_value(message.data.unwrap()).unwrap();
        assert_eq!(create.task_id, "t1");
        assert!(create.tab_id.is_none());
    }
}
