//! End-to-end engine behavior against a scripted decision service and a
//! stub browser port.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use agent_core::{
    AgentError, Budgets, DecisionService, EngineConfig, Event, ExecutionBus, ExecutionState,
    Navigator, Planner, RetryPolicy, ScriptedDecisionService, SharedContext, StructuredDecision,
    StubBrowserPort, TaskExecutionEngine, ToolDecision, ToolRegistry, ToolSpec,
};
use agent_core::{BrowserPort, ChatMessage};
use tokio::sync::{mpsc, Notify};
use webpilot_core_types::TaskId;

fn retry_fast() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        backoff: Duration::ZERO,
    }
}

fn build_engine(
    decision: Arc<dyn DecisionService>,
    budgets: Budgets,
) -> (Arc<TaskExecutionEngine>, mpsc::Receiver<Event>) {
    let bus = Arc::new(ExecutionBus::new());
    let events = bus.subscribe_channel(1024);
    let port = StubBrowserPort::new("https://start.example", "Start");
    let browser: Arc<dyn BrowserPort> = port;
    let context = SharedContext::new(budgets);
    let planner = Planner::new(
        Arc::clone(&decision),
        Arc::clone(&browser),
        Arc::clone(&bus),
        context.clone(),
        retry_fast(),
    );
    let registry = Arc::new(ToolRegistry::standard().unwrap());
    let navigator = Navigator::new(
        decision,
        Arc::clone(&browser),
        Arc::clone(&bus),
        context.clone(),
        registry,
    );
    let engine = TaskExecutionEngine::new(
        planner,
        navigator,
        context,
        bus,
        browser,
        EngineConfig {
            budgets,
            messages_dir: None,
        },
    );
    (Arc::new(engine), events)
}

fn drain(events: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

fn assert_single_terminal(events: &[Event], task_id: &str) {
    let for_task: Vec<_> = events
        .iter()
        .filter(|event| event.data.task_id == TaskId::new(task_id))
        .collect();
    let starts = for_task
        .iter()
        .filter(|event| event.state == ExecutionState::TaskStart)
        .count();
    let terminals = for_task
        .iter()
        .filter(|event| event.state.is_terminal())
        .count();
    assert_eq!(starts, 1, "expected exactly one task.start");
    assert_eq!(terminals, 1, "expected exactly one terminal event");
}

/// Decision service wrapper that counts planner invocations.
struct CountingDecision {
    inner: ScriptedDecisionService,
    structured_calls: AtomicU32,
    tool_calls: AtomicU32,
}

impl CountingDecision {
    fn new(inner: ScriptedDecisionService) -> Arc<Self> {
        Arc::new(Self {
            inner,
            structured_calls: AtomicU32::new(0),
            tool_calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl DecisionService for CountingDecision {
    async fn invoke_structured(
        &self,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
    ) -> Result<StructuredDecision, AgentError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.invoke_structured(messages, schema).await
    }

    async fn invoke_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ToolDecision, AgentError> {
        self.tool_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.invoke_with_tools(messages, tools).await
    }
}

#[tokio::test]
async fn paris_weather_scenario_emits_expected_sequence() {
    let scripted = ScriptedDecisionService::new();
    scripted
        .push_structured(ScriptedDecisionService::continue_with(
            Some("1. open weather site\n2. read temperature"),
            "open weather site",
        ))
        .await;
    scripted
        .push_structured(ScriptedDecisionService::continue_with(
            None,
            "read temperature",
        ))
        .await;
    scripted
        .push_structured(ScriptedDecisionService::terminate_with("18°C"))
        .await;
    scripted
        .push_tool(ScriptedDecisionService::text(
            "Opened the weather site ##TERMINATE TASK##",
        ))
        .await;
    scripted
        .push_tool(ScriptedDecisionService::text(
            "The temperature is 18°C ##TERMINATE TASK##",
        ))
        .await;

    let budgets = Budgets::default().max_steps(5).max_errors(2);
    let (engine, mut events) = build_engine(Arc::new(scripted), budgets);
    engine
        .run("find weather in Paris", TaskId::new("t1"), None)
        .await
        .unwrap();

    let events = drain(&mut events);
    let states: Vec<&str> = events.iter().map(|event| event.state.as_str()).collect();
    assert_eq!(
        states,
        vec![
            "task.start",
            "step.start", // planner step 1
            "step.ok",
            "step.start", // navigator, step 1
            "step.ok",
            "step.start", // planner step 2
            "step.ok",
            "step.start", // navigator, step 2
            "step.ok",
            "step.start", // planner step 3, terminates
            "step.ok",
            "task.ok",
        ]
    );

    let task_ok = events.last().unwrap();
    assert_eq!(task_ok.data.details, "18°C");
    assert_eq!(task_ok.data.is_final, Some(true));
    assert_single_terminal(&events, "t1");

    // the sentinel never leaks into reported details
    assert!(events
        .iter()
        .all(|event| !event.data.details.contains("##TERMINATE TASK##")));

    // plan text rides on the first planner step.ok
    let first_plan = events
        .iter()
        .find(|event| event.data.plan.is_some())
        .unwrap();
    assert_eq!(first_plan.state, ExecutionState::StepOk);

    // engine stays usable afterwards
    scripted_second_run(&engine).await;
}

async fn scripted_second_run(engine: &Arc<TaskExecutionEngine>) {
    // second run is rejected only while a task is bound; after completion it
    // must be accepted again (and fail gracefully on script exhaustion)
    let result = engine.run("another", TaskId::new("t2"), None).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn step_budget_stops_after_exactly_n_planner_invocations() {
    let scripted = ScriptedDecisionService::new()
        .with_default_structured(ScriptedDecisionService::continue_with(None, "keep going"))
        .with_default_tool(ScriptedDecisionService::text("done ##TERMINATE TASK##"));
    let counting = CountingDecision::new(scripted);

    let budgets = Budgets::default().max_steps(3);
    let (engine, mut events) = build_engine(counting.clone(), budgets);
    engine
        .run("endless task", TaskId::new("t-steps"), None)
        .await
        .unwrap();

    assert_eq!(counting.structured_calls.load(Ordering::SeqCst), 3);

    let events = drain(&mut events);
    let terminal = events.last().unwrap();
    assert_eq!(terminal.state, ExecutionState::TaskFail);
    assert!(terminal.data.details.contains("max steps"));
    assert_single_terminal(&events, "t-steps");
}

#[tokio::test]
async fn error_budget_stops_consecutive_step_failures() {
    // every planner call yields unparseable output; each step burns the
    // local retries and then counts one error
    let scripted = ScriptedDecisionService::new()
        .with_default_structured(ScriptedDecisionService::unparseable("not json"));
    let counting = CountingDecision::new(scripted);

    let budgets = Budgets::default().max_steps(10).max_errors(2);
    let (engine, mut events) = build_engine(counting.clone(), budgets);
    engine
        .run("hopeless task", TaskId::new("t-errors"), None)
        .await
        .unwrap();

    // 2 planner steps, 3 structured attempts each
    assert_eq!(counting.structured_calls.load(Ordering::SeqCst), 6);

    let events = drain(&mut events);
    let step_fails = events
        .iter()
        .filter(|event| event.state == ExecutionState::StepFail)
        .count();
    assert_eq!(step_fails, 2);
    let terminal = events.last().unwrap();
    assert_eq!(terminal.state, ExecutionState::TaskFail);
    assert!(terminal.data.details.contains("max errors"));
    assert_single_terminal(&events, "t-errors");
}

/// Blocks the first planner call until released, so a second run can be
/// attempted while the first is in flight.
struct GatedDecision {
    gate: Notify,
    released: Notify,
}

#[async_trait]
impl DecisionService for GatedDecision {
    async fn invoke_structured(
        &self,
        _messages: &[ChatMessage],
        _schema: &serde_json::Value,
    ) -> Result<StructuredDecision, AgentError> {
        self.released.notify_one();
        self.gate.notified().await;
        Ok(ScriptedDecisionService::terminate_with("first task done"))
    }

    async fn invoke_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ToolDecision, AgentError> {
        Ok(ScriptedDecisionService::text("done"))
    }
}

#[tokio::test]
async fn second_run_is_rejected_and_first_is_unaffected() {
    let gated = Arc::new(GatedDecision {
        gate: Notify::new(),
        released: Notify::new(),
    });
    let (engine, mut events) = build_engine(gated.clone(), Budgets::default());

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run("first task", TaskId::new("t1"), None).await })
    };
    // wait until the first task is inside its planner call
    gated.released.notified().await;

    let rejected = engine.run("second task", TaskId::new("t2"), None).await;
    assert!(matches!(
        rejected,
        Err(AgentError::AlreadyRunning(id)) if id == TaskId::new("t1")
    ));

    gated.gate.notify_one();
    first.await.unwrap().unwrap();

    let events = drain(&mut events);
    // rejection surfaced as task.fail for t2, referencing the bound task
    let rejection = events
        .iter()
        .find(|event| event.data.task_id == TaskId::new("t2"))
        .unwrap();
    assert_eq!(rejection.state, ExecutionState::TaskFail);
    assert!(rejection.data.details.contains("t1"));

    // the first task still completed normally
    let first_terminal = events
        .iter()
        .find(|event| {
            event.data.task_id == TaskId::new("t1") && event.state.is_terminal()
        })
        .unwrap();
    assert_eq!(first_terminal.state, ExecutionState::TaskOk);
    assert_eq!(first_terminal.data.details, "first task done");
    assert_single_terminal(&events, "t1");
}

/// Cancels the bound task's token from inside a planner call.
struct CancellingDecision {
    context: SharedContext,
}

#[async_trait]
impl DecisionService for CancellingDecision {
    async fn invoke_structured(
        &self,
        _messages: &[ChatMessage],
        _schema: &serde_json::Value,
    ) -> Result<StructuredDecision, AgentError> {
        self.context.cancel_token().await.cancel();
        Ok(ScriptedDecisionService::continue_with(None, "next"))
    }

    async fn invoke_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ToolDecision, AgentError> {
        Ok(ScriptedDecisionService::text("done"))
    }
}

#[tokio::test]
async fn cancellation_terminates_with_task_cancel() {
    let bus = Arc::new(ExecutionBus::new());
    let mut events = bus.subscribe_channel(1024);
    let port = StubBrowserPort::new("https://start.example", "Start");
    let browser: Arc<dyn BrowserPort> = port;
    let context = SharedContext::new(Budgets::default());
    let decision: Arc<dyn DecisionService> = Arc::new(CancellingDecision {
        context: context.clone(),
    });
    let planner = Planner::new(
        Arc::clone(&decision),
        Arc::clone(&browser),
        Arc::clone(&bus),
        context.clone(),
        retry_fast(),
    );
    let registry = Arc::new(ToolRegistry::standard().unwrap());
    let navigator = Navigator::new(
        decision,
        Arc::clone(&browser),
        Arc::clone(&bus),
        context.clone(),
        registry,
    );
    let engine = TaskExecutionEngine::new(
        planner,
        navigator,
        context,
        bus,
        browser,
        EngineConfig::default(),
    );

    engine
        .run("cancellable task", TaskId::new("t-cancel"), None)
        .await
        .unwrap();

    let events = drain(&mut events);
    let terminal = events.last().unwrap();
    assert_eq!(terminal.state, ExecutionState::TaskCancel);
    assert_single_terminal(&events, "t-cancel");
}

#[tokio::test]
async fn planner_step_error_is_fed_back_as_next_input() {
    // step 1: plan without a next step (recoverable error); step 2 the
    // planner sees the error text and terminates
    let scripted = ScriptedDecisionService::new();
    let plan_only = serde_json::json!({ "terminated": false, "plan": "only a plan" });
    scripted
        .push_structured(StructuredDecision {
            raw: plan_only.to_string(),
            parsed: Some(plan_only),
        })
        .await;
    scripted
        .push_structured(ScriptedDecisionService::terminate_with("recovered"))
        .await;

    let (engine, mut events) = build_engine(
        Arc::new(scripted),
        Budgets::default().max_steps(5).max_errors(3),
    );
    engine
        .run("task with a stumble", TaskId::new("t-heal"), None)
        .await
        .unwrap();

    let events = drain(&mut events);
    let states: Vec<&str> = events.iter().map(|event| event.state.as_str()).collect();
    assert_eq!(
        states,
        vec![
            "task.start",
            "step.start",
            "step.fail", // plan without next step
            "step.start",
            "step.ok",
            "task.ok",
        ]
    );
    assert_eq!(events.last().unwrap().data.details, "recovered");
}

#[tokio::test]
async fn transcripts_are_persisted_per_role() {
    let dir = tempfile::tempdir().unwrap();
    let scripted = ScriptedDecisionService::new();
    scripted
        .push_structured(ScriptedDecisionService::terminate_with("done"))
        .await;

    let bus = Arc::new(ExecutionBus::new());
    let port = StubBrowserPort::new("https://start.example", "Start");
    let browser: Arc<dyn BrowserPort> = port;
    let context = SharedContext::new(Budgets::default());
    let decision: Arc<dyn DecisionService> = Arc::new(scripted);
    let planner = Planner::new(
        Arc::clone(&decision),
        Arc::clone(&browser),
        Arc::clone(&bus),
        context.clone(),
        retry_fast(),
    );
    let registry = Arc::new(ToolRegistry::standard().unwrap());
    let navigator = Navigator::new(
        decision,
        Arc::clone(&browser),
        Arc::clone(&bus),
        context.clone(),
        registry,
    );
    let engine = TaskExecutionEngine::new(
        planner,
        navigator,
        context,
        bus,
        browser,
        EngineConfig {
            budgets: Budgets::default(),
            messages_dir: Some(dir.path().to_path_buf()),
        },
    );

    engine
        .run("persisted task", TaskId::new("t-persist"), None)
        .await
        .unwrap();

    let planner_transcript = dir.path().join("t-persist-planner.json");
    let navigator_transcript = dir.path().join("t-persist-navigator.json");
    assert!(planner_transcript.exists());
    assert!(navigator_transcript.exists());

    let json = std::fs::read_to_string(planner_transcript).unwrap();
    let messages: Vec<ChatMessage> = serde_json::from_str(&json).unwrap();
    // system + user + assistant
    assert_eq!(messages.len(), 3);
}
