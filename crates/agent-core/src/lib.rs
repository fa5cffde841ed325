//! Plan/act execution core.
//!
//! A [`TaskExecutionEngine`] coordinates two decision roles against a live
//! browser: the [`Planner`] proposes the next sub-task or the final answer,
//! the [`Navigator`] executes one sub-task through bounded rounds of tool
//! invocation. Progress is reported as typed events over an
//! [`ExecutionBus`]; budgets bound the inherently open-ended loop.

pub mod bus;
pub mod context;
pub mod decision;
pub mod engine;
pub mod errors;
pub mod events;
pub mod history;
pub mod navigator;
pub mod planner;
pub mod ports;
pub mod prompts;
pub mod retry;
pub mod task_store;
pub mod tools;

pub use bus::ExecutionBus;
pub use context::{Budgets, ContextSnapshot, SharedContext};
pub use decision::{
    DecisionService, ScriptedDecisionService, StructuredDecision, ToolDecision, ToolInvocation,
};
pub use engine::{EngineConfig, TaskExecutionEngine};
pub use errors::AgentError;
pub use events::{Event, EventData, EventType, ExecutionState};
pub use history::{ChatMessage, ChatRole, ConversationHistory};
pub use navigator::Navigator;
pub use planner::{Planner, PlannerDecision, PlannerVerdict};
pub use ports::{ActionOutcome, BrowserPort, PageInfo, StubBrowserPort, TabBinding};
pub use prompts::{NavigatorPrompt, PlannerPrompt, ROUND_REVIEW_PROMPT, TERMINATE_SENTINEL};
pub use retry::RetryPolicy;
pub use task_store::{Task, TaskManager};
pub use tools::{Tool, ToolCtx, ToolRegistry, ToolSpec};
