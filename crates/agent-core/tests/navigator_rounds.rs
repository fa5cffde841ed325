//! Navigator tool-loop behavior: round budgets, tool failure conversion,
//! cancellation.

use std::sync::Arc;

use async_trait::async_trait;
use agent_core::{
    AgentError, Budgets, BrowserPort, ChatMessage, DecisionService, Event, ExecutionBus,
    ExecutionState, Navigator, ScriptedDecisionService, SharedContext, StructuredDecision,
    StubBrowserPort, ToolDecision, ToolRegistry, ToolSpec,
};
use tokio::sync::mpsc;
use webpilot_core_types::TaskId;

fn build_navigator(
    decision: Arc<dyn DecisionService>,
    budgets: Budgets,
) -> (Navigator, SharedContext, mpsc::Receiver<Event>) {
    let bus = Arc::new(ExecutionBus::new());
    let events = bus.subscribe_channel(1024);
    let port = StubBrowserPort::new("https://start.example", "Start");
    let browser: Arc<dyn BrowserPort> = port;
    let context = SharedContext::new(budgets);
    let registry = Arc::new(ToolRegistry::standard().unwrap());
    let navigator = Navigator::new(decision, browser, bus, context.clone(), registry);
    (navigator, context, events)
}

fn drain(events: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn tool_round_budget_fails_step_after_exact_rounds() {
    let scripted = ScriptedDecisionService::new().with_default_tool(
        ScriptedDecisionService::tool_call(
            "click_element",
            serde_json::json!({ "selector": "#next" }),
        ),
    );
    let budgets = Budgets::default().max_tool_rounds(2);
    let (navigator, context, mut events) = build_navigator(Arc::new(scripted), budgets);
    context.bind(TaskId::new("t-rounds"), budgets).await;

    let result = navigator.step("click through the list").await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("too many rounds"));

    let events = drain(&mut events);
    let act_starts: Vec<&Event> = events
        .iter()
        .filter(|event| event.state == ExecutionState::ActStart)
        .collect();
    assert_eq!(act_starts.len(), 2, "exactly R tool rounds ran");
    assert_eq!(act_starts[0].data.tool_round, 1);
    assert_eq!(act_starts[1].data.tool_round, 2);
    assert_eq!(act_starts[0].data.tool.as_deref(), Some("click_element"));

    let terminal = events.last().unwrap();
    assert_eq!(terminal.state, ExecutionState::StepFail);
    assert!(terminal.data.details.contains("too many rounds"));
}

#[tokio::test]
async fn unregistered_tool_becomes_failure_string_not_error() {
    let scripted = ScriptedDecisionService::new();
    scripted
        .push_tool(ScriptedDecisionService::tool_call(
            "bogus_tool",
            serde_json::json!({}),
        ))
        .await;
    scripted
        .push_tool(ScriptedDecisionService::text(
            "could not do it ##TERMINATE TASK##",
        ))
        .await;

    let budgets = Budgets::default();
    let (navigator, context, mut events) = build_navigator(Arc::new(scripted), budgets);
    context.bind(TaskId::new("t-bogus"), budgets).await;

    let output = navigator.step("press the magic button").await.unwrap();
    assert_eq!(output, "could not do it");

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|event| event.state == ExecutionState::ActFail
            && event.data.details.contains("not registered")));
    assert_eq!(events.last().unwrap().state, ExecutionState::StepOk);

    // the failure string went back to the decision service as a tool message
    let transcript = navigator.transcript().await;
    assert!(transcript.iter().any(|message| {
        message.tool_call_id.is_some() && message.content.contains("not registered")
    }));
}

#[tokio::test]
async fn history_clears_between_sub_tasks() {
    let scripted = ScriptedDecisionService::new()
        .with_default_tool(ScriptedDecisionService::text("done ##TERMINATE TASK##"));
    let budgets = Budgets::default();
    let (navigator, context, _events) = build_navigator(Arc::new(scripted), budgets);
    context.bind(TaskId::new("t-stateless"), budgets).await;

    navigator.step("first sub-task").await.unwrap();
    navigator.step("second sub-task").await.unwrap();

    let transcript = navigator.transcript().await;
    // system + user + (no tool rounds): the first sub-task left no residue
    assert_eq!(transcript.len(), 2);
    assert!(transcript[1].content.contains("second sub-task"));
    assert!(!transcript
        .iter()
        .any(|message| message.content.contains("first sub-task")));
}

/// Cancels the bound token and then keeps requesting tool calls.
struct CancelThenToolCall {
    context: SharedContext,
}

#[async_trait]
impl DecisionService for CancelThenToolCall {
    async fn invoke_structured(
        &self,
        _messages: &[ChatMessage],
        _schema: &serde_json::Value,
    ) -> Result<StructuredDecision, AgentError> {
        Err(AgentError::decision("not used"))
    }

    async fn invoke_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ToolDecision, AgentError> {
        self.context.cancel_token().await.cancel();
        Ok(ScriptedDecisionService::tool_call(
            "click_element",
            serde_json::json!({ "selector": "#next" }),
        ))
    }
}

#[tokio::test]
async fn cancellation_aborts_before_tool_execution() {
    let bus = Arc::new(ExecutionBus::new());
    let mut events = bus.subscribe_channel(1024);
    let port = StubBrowserPort::new("https://start.example", "Start");
    let browser: Arc<dyn BrowserPort> = Arc::clone(&port) as Arc<dyn BrowserPort>;
    let budgets = Budgets::default();
    let context = SharedContext::new(budgets);
    context.bind(TaskId::new("t-cancel"), budgets).await;
    let decision: Arc<dyn DecisionService> = Arc::new(CancelThenToolCall {
        context: context.clone(),
    });
    let registry = Arc::new(ToolRegistry::standard().unwrap());
    let navigator = Navigator::new(
        decision,
        browser,
        bus,
        context.clone(),
        registry,
    );

    let err = navigator.step("doomed sub-task").await.unwrap_err();
    assert!(err.is_cancelled());

    // never reported as success, and the tool never ran
    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|event| event.state == ExecutionState::StepOk));
    assert!(port.calls().await.iter().all(|call| !call.starts_with("click")));
}
