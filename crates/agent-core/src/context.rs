//! Per-task execution state shared between the engine, both roles, and the
//! tool set.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use webpilot_core_types::TaskId;

pub const DEFAULT_MAX_STEPS: u32 = 100;
pub const DEFAULT_MAX_ERRORS: u32 = 20;
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 20;

/// Hard limits bounding one task. Exhaustion is fatal to the task, never the
/// process.
#[derive(Clone, Copy, Debug)]
pub struct Budgets {
    /// Planner decision cycles allowed per task.
    pub max_steps: u32,
    /// Recoverable step errors allowed per task.
    pub max_errors: u32,
    /// Tool-invocation rounds allowed per navigator step.
    pub max_tool_rounds: u32,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_errors: DEFAULT_MAX_ERRORS,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

impl Budgets {
    pub fn max_steps(mut self, value: u32) -> Self {
        self.max_steps = value;
        self
    }

    pub fn max_errors(mut self, value: u32) -> Self {
        self.max_errors = value;
        self
    }

    pub fn max_tool_rounds(mut self, value: u32) -> Self {
        self.max_tool_rounds = value;
        self
    }
}

/// Mutable state of the one live task. At most one is bound at a time; the
/// engine rebinds it per task and every reader goes through
/// [`SharedContext`].
#[derive(Debug)]
struct ExecutionContext {
    /// Meaningful only while a task is bound.
    task_id: TaskId,
    step: u32,
    tool_round: u32,
    error: u32,
    budgets: Budgets,
    cancel: CancellationToken,
}

/// Read-only view used when stamping counters into events.
#[derive(Clone, Debug)]
pub struct ContextSnapshot {
    pub task_id: TaskId,
    pub step: u32,
    pub tool_round: u32,
    pub error: u32,
    pub max_steps: u32,
    pub max_errors: u32,
    pub max_tool_rounds: u32,
}

/// Cloneable handle to the execution context.
#[derive(Clone)]
pub struct SharedContext {
    inner: Arc<Mutex<ExecutionContext>>,
}

impl SharedContext {
    pub fn new(budgets: Budgets) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ExecutionContext {
                task_id: TaskId::new(""),
                step: 0,
                tool_round: 0,
                error: 0,
                budgets,
                cancel: CancellationToken::new(),
            })),
        }
    }

    /// Bind a new task: reset every counter and hand out a fresh
    /// cancellation token.
    pub async fn bind(&self, task_id: TaskId, budgets: Budgets) -> CancellationToken {
        let mut ctx = self.inner.lock().await;
        ctx.task_id = task_id;
        ctx.step = 0;
        ctx.tool_round = 0;
        ctx.error = 0;
        ctx.budgets = budgets;
        ctx.cancel = CancellationToken::new();
        ctx.cancel.clone()
    }

    pub async fn snapshot(&self) -> ContextSnapshot {
        let ctx = self.inner.lock().await;
        ContextSnapshot {
            task_id: ctx.task_id.clone(),
            step: ctx.step,
            tool_round: ctx.tool_round,
            error: ctx.error,
            max_steps: ctx.budgets.max_steps,
            max_errors: ctx.budgets.max_errors,
            max_tool_rounds: ctx.budgets.max_tool_rounds,
        }
    }

    /// Start a planner decision cycle: bump the step counter and reset the
    /// tool round. A step is one planner cycle; the navigator works within
    /// the current step.
    pub async fn begin_step(&self) -> u32 {
        let mut ctx = self.inner.lock().await;
        ctx.step += 1;
        ctx.tool_round = 0;
        ctx.step
    }

    /// Start a navigator sub-task within the current step: only the tool
    /// round resets.
    pub async fn begin_navigation(&self) -> u32 {
        let mut ctx = self.inner.lock().await;
        ctx.tool_round = 0;
        ctx.step
    }

    pub async fn begin_tool_round(&self) -> u32 {
        let mut ctx = self.inner.lock().await;
        ctx.tool_round += 1;
        ctx.tool_round
    }

    pub async fn record_error(&self) -> u32 {
        let mut ctx = self.inner.lock().await;
        ctx.error += 1;
        ctx.error
    }

    pub async fn cancel_token(&self) -> CancellationToken {
        self.inner.lock().await.cancel.clone()
    }

    pub async fn is_cancelled(&self) -> bool {
        self.inner.lock().await.cancel.is_cancelled()
    }
}
