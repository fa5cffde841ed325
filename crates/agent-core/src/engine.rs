//! The task execution engine: single-flight gate, plan/act supervisory
//! loop, budget stops, transcript persistence.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};
use webpilot_core_types::{Actor, TaskId};

use crate::bus::ExecutionBus;
use crate::context::{Budgets, SharedContext};
use crate::errors::AgentError;
use crate::events::{Event, EventData, ExecutionState};
use crate::navigator::Navigator;
use crate::planner::{Planner, PlannerVerdict};
use crate::ports::BrowserPort;

/// Engine construction options.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    pub budgets: Budgets,
    /// Directory for per-(task, role) transcript documents; `None` disables
    /// transcript persistence.
    pub messages_dir: Option<PathBuf>,
}

/// Owns the plan/act loop. Guarantees exactly one task in flight: a second
/// `run` while one is bound fails fast, no queueing.
pub struct TaskExecutionEngine {
    planner: Planner,
    navigator: Navigator,
    context: SharedContext,
    bus: Arc<ExecutionBus>,
    browser: Arc<dyn BrowserPort>,
    current: Mutex<Option<TaskId>>,
    config: EngineConfig,
}

impl TaskExecutionEngine {
    pub fn new(
        planner: Planner,
        navigator: Navigator,
        context: SharedContext,
        bus: Arc<ExecutionBus>,
        browser: Arc<dyn BrowserPort>,
        config: EngineConfig,
    ) -> Self {
        Self {
            planner,
            navigator,
            context,
            bus,
            browser,
            current: Mutex::new(None),
            config,
        }
    }

    pub fn bus(&self) -> Arc<ExecutionBus> {
        Arc::clone(&self.bus)
    }

    /// Id of the currently bound task, if any.
    pub async fn current_task(&self) -> Option<TaskId> {
        self.current.lock().await.clone()
    }

    /// Request cooperative cancellation of the bound task. The loop observes
    /// the token at its defined yield points.
    pub async fn cancel(&self) {
        self.context.cancel_token().await.cancel();
    }

    /// Execute one task to completion. Returns an error only for rejected
    /// runs (already running, empty input); the outcome of an accepted run
    /// is reported through events.
    pub async fn run(
        &self,
        task: &str,
        task_id: TaskId,
        tab_id: Option<&str>,
    ) -> Result<(), AgentError> {
        if task.trim().is_empty() || task_id.is_empty() {
            return Err(AgentError::invalid_request(
                "task text and task id must not be empty",
            ));
        }

        // check-and-bind under the gate; no queueing
        {
            let mut current = self.current.lock().await;
            if let Some(running) = current.as_ref() {
                let running = running.clone();
                let detail = format!(
                    "Another task is currently running. Please wait for it to complete. Task ID: {running}"
                );
                warn!(%task_id, %running, "rejecting concurrent run");
                if let Err(err) = self
                    .bus
                    .emit(Event::create(
                        ExecutionState::TaskFail,
                        Actor::Manager,
                        EventData::new(task_id, 0).with_details(detail),
                    ))
                    .await
                {
                    warn!(error = %err, "failed to emit rejection event");
                }
                return Err(AgentError::AlreadyRunning(running));
            }
            *current = Some(task_id.clone());
        }

        self.context
            .bind(task_id.clone(), self.config.budgets)
            .await;
        self.planner.reset().await;
        self.navigator.reset().await;

        info!(%task_id, "task started");
        if let Err(err) = self.execute(task, &task_id, tab_id).await {
            error!(%task_id, error = %err, "task failed with error");
            let step = self.context.snapshot().await.step;
            if let Err(emit_err) = self
                .bus
                .emit(Event::create(
                    ExecutionState::TaskFail,
                    Actor::Manager,
                    EventData::new(task_id.clone(), step).with_details(err.to_string()),
                ))
                .await
            {
                warn!(error = %emit_err, "failed to emit task.fail");
            }
        }

        self.persist_transcripts(&task_id).await;
        *self.current.lock().await = None;
        Ok(())
    }

    /// The plan/act loop. Terminal outcomes (ok/fail/cancel) are emitted
    /// here and return `Ok`; an `Err` means an unexpected failure the
    /// caller converts into `task.fail`.
    async fn execute(
        &self,
        task: &str,
        task_id: &TaskId,
        tab_id: Option<&str>,
    ) -> Result<(), AgentError> {
        // best-effort rebind to a caller-supplied tab; the fallback is
        // observable in the task.start detail
        let mut start_detail = task.to_string();
        let binding = self.browser.bind_tab(tab_id).await?;
        if binding.fallback {
            warn!(?tab_id, detail = %binding.detail, "tab rebinding fell back");
            start_detail = format!("{task} [tab binding fell back to {}]", binding.detail);
        }

        self.bus
            .emit(Event::create(
                ExecutionState::TaskStart,
                Actor::Manager,
                EventData::new(task_id.clone(), 0).with_details(start_detail),
            ))
            .await?;

        let token = self.context.cancel_token().await;
        let mut next_input = task.to_string();
        loop {
            let snapshot = self.context.snapshot().await;

            if token.is_cancelled() {
                self.bus
                    .emit(Event::create(
                        ExecutionState::TaskCancel,
                        Actor::Manager,
                        EventData::new(task_id.clone(), snapshot.step)
                            .with_details("task cancelled by caller"),
                    ))
                    .await?;
                return Ok(());
            }
            if snapshot.step >= snapshot.max_steps {
                self.bus
                    .emit(Event::create(
                        ExecutionState::TaskFail,
                        Actor::Manager,
                        EventData::new(task_id.clone(), snapshot.step).with_details(format!(
                            "Task failed with max steps reached: {}",
                            snapshot.step
                        )),
                    ))
                    .await?;
                return Ok(());
            }
            if snapshot.error >= snapshot.max_errors {
                self.bus
                    .emit(Event::create(
                        ExecutionState::TaskFail,
                        Actor::Manager,
                        EventData::new(task_id.clone(), snapshot.step).with_details(format!(
                            "Task failed with max errors encountered: {}",
                            snapshot.error
                        )),
                    ))
                    .await?;
                return Ok(());
            }

            match self.planner.step(&next_input).await {
                Ok(PlannerVerdict::Terminate { final_response }) => {
                    let step = self.context.snapshot().await.step;
                    self.bus
                        .emit(Event::create(
                            ExecutionState::TaskOk,
                            Actor::Manager,
                            EventData::new(task_id.clone(), step)
                                .with_details(final_response)
                                .final_response(),
                        ))
                        .await?;
                    return Ok(());
                }
                Ok(PlannerVerdict::Continue { next_step, .. }) => {
                    match self.navigator.step(&next_step).await {
                        Ok(output) => next_input = output,
                        Err(AgentError::Cancelled) => continue,
                        // navigator errors are fed back so the planner can
                        // self-correct; they already count against the
                        // error budget
                        Err(err) => next_input = err.to_string(),
                    }
                }
                Err(AgentError::Cancelled) => continue,
                Err(err) => next_input = err.to_string(),
            }
        }
    }

    /// Persist both role transcripts. Failures are logged, never fatal.
    async fn persist_transcripts(&self, task_id: &TaskId) {
        let Some(dir) = self.config.messages_dir.clone() else {
            return;
        };
        for (role, transcript) in [
            ("planner", self.planner.transcript().await),
            ("navigator", self.navigator.transcript().await),
        ] {
            let path = dir.join(format!("{task_id}-{role}.json"));
            match serde_json::to_string_pretty(&transcript) {
                Ok(json) => {
                    if let Err(err) = tokio::fs::write(&path, json).await {
                        warn!(path = %path.display(), error = %err, "failed to persist transcript");
                    }
                }
                Err(err) => warn!(error = %err, "failed to serialize transcript"),
            }
        }
    }
}
