//! Task documents: the ordered event record of each execution, persisted as
//! one JSON file per task id when the task reaches a terminal state.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use webpilot_core_types::TaskId;
use webpilot_event_bus::{BusError, EventSink};

use crate::errors::AgentError;
use crate::events::Event;

/// One end-to-end goal execution and its ordered event history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    #[serde(default)]
    pub events: Vec<Event>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tracks the single current task and finalizes it on terminal events.
pub struct TaskManager {
    tasks_dir: PathBuf,
    current: Mutex<Option<Task>>,
}

impl TaskManager {
    pub fn new(tasks_dir: PathBuf) -> Result<Self, AgentError> {
        std::fs::create_dir_all(&tasks_dir)
            .map_err(|err| AgentError::persistence(format!("creating tasks dir: {err}")))?;
        Ok(Self {
            tasks_dir,
            current: Mutex::new(None),
        })
    }

    /// Register a new current task. Rejects empty ids/intents and refuses to
    /// displace a running task.
    pub async fn create_task(
        &self,
        id: TaskId,
        intent: &str,
        args: Option<serde_json::Value>,
    ) -> Result<Task, AgentError> {
        if id.is_empty() || intent.trim().is_empty() {
            return Err(AgentError::invalid_request(
                "task id and intent cannot be empty",
            ));
        }
        let mut current = self.current.lock().await;
        if let Some(task) = current.as_ref() {
            return Err(AgentError::AlreadyRunning(task.id.clone()));
        }
        let now = Utc::now();
        let task = Task {
            id,
            intent: intent.trim().to_string(),
            args,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        *current = Some(task.clone());
        Ok(task)
    }

    pub async fn current_task_id(&self) -> Option<TaskId> {
        self.current.lock().await.as_ref().map(|task| task.id.clone())
    }

    /// Append an execution event to the current task; terminal events
    /// persist the document and clear the slot. Returns false when the
    /// event belongs to a task this manager is not tracking.
    pub async fn record_event(&self, event: &Event) -> Result<bool, AgentError> {
        let mut guard = self.current.lock().await;
        let Some(task) = guard.as_mut() else {
            return Ok(false);
        };
        if task.id != event.data.task_id {
            return Ok(false);
        }
        task.events.push(event.clone());
        task.updated_at = Utc::now();

        if event.state.is_terminal() {
            let task = guard.take();
            drop(guard);
            if let Some(task) = task {
                self.persist(&task).await?;
            }
        }
        Ok(true)
    }

    /// Persist and clear the current task regardless of state. Used when a
    /// run is torn down externally.
    pub async fn close_task(&self) -> Result<(), AgentError> {
        let task = self.current.lock().await.take();
        if let Some(task) = task {
            self.persist(&task).await?;
        }
        Ok(())
    }

    async fn persist(&self, task: &Task) -> Result<(), AgentError> {
        let path = self.tasks_dir.join(format!("{}.json", task.id));
        let json = serde_json::to_string_pretty(task)
            .map_err(|err| AgentError::persistence(format!("serializing task: {err}")))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|err| AgentError::persistence(format!("writing {}: {err}", path.display())))?;
        debug!(path = %path.display(), "task document persisted");
        Ok(())
    }

    /// Reload a persisted task document.
    pub async fn load(&self, id: &TaskId) -> Result<Task, AgentError> {
        let path = self.tasks_dir.join(format!("{id}.json"));
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| AgentError::persistence(format!("reading {}: {err}", path.display())))?;
        serde_json::from_str(&json)
            .map_err(|err| AgentError::persistence(format!("parsing task document: {err}")))
    }
}

/// Bus sink: mirrors every execution event into the task record. Events for
/// untracked tasks are logged and swallowed; a bookkeeping mismatch must not
/// poison the emit.
#[async_trait]
impl EventSink<Event> for TaskManager {
    async fn handle(&self, event: &Event) -> Result<(), BusError> {
        match self.record_event(event).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(task_id = %event.data.task_id, "event for untracked task ignored");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "failed to record event");
                Err(BusError::sink(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventData, ExecutionState};
    use webpilot_core_types::Actor;

    fn event(task_id: &str, state: ExecutionState, step: u32) -> Event {
        Event::create(
            state,
            Actor::Manager,
            EventData::new(TaskId::new(task_id), step).with_details("detail"),
        )
    }

    #[tokio::test]
    async fn persisted_task_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TaskManager::new(dir.path().to_path_buf()).unwrap();
        let id = TaskId::new("t1");
        manager
            .create_task(id.clone(), "find weather in Paris", None)
            .await
            .unwrap();

        manager
            .record_event(&event("t1", ExecutionState::TaskStart, 0))
            .await
            .unwrap();
        manager
            .record_event(&event("t1", ExecutionState::StepOk, 1))
            .await
            .unwrap();
        manager
            .record_event(&event("t1", ExecutionState::TaskOk, 1))
            .await
            .unwrap();

        // terminal event cleared the slot
        assert!(manager.current_task_id().await.is_none());

        let loaded = manager.load(&id).await.unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.intent, "find weather in Paris");
        assert_eq!(loaded.events.len(), 3);
        assert_eq!(loaded.events[0].state, ExecutionState::TaskStart);
        assert_eq!(loaded.events[2].state, ExecutionState::TaskOk);
    }

    #[tokio::test]
    async fn second_task_is_rejected_while_one_is_current() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TaskManager::new(dir.path().to_path_buf()).unwrap();
        manager
            .create_task(TaskId::new("t1"), "first", None)
            .await
            .unwrap();
        let err = manager
            .create_task(TaskId::new("t2"), "second", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::AlreadyRunning(id) if id == TaskId::new("t1")));
    }

    #[tokio::test]
    async fn empty_intent_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TaskManager::new(dir.path().to_path_buf()).unwrap();
        assert!(manager
            .create_task(TaskId::new("t1"), "   ", None)
            .await
            .is_err());
        assert!(manager
            .create_task(TaskId::new(""), "intent", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn events_for_other_tasks_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TaskManager::new(dir.path().to_path_buf()).unwrap();
        manager
            .create_task(TaskId::new("t1"), "first", None)
            .await
            .unwrap();
        let recorded = manager
            .record_event(&event("t9", ExecutionState::TaskStart, 0))
            .await
            .unwrap();
        assert!(!recorded);
    }
}
