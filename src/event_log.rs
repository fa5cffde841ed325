//! Bus sink that writes every execution event to the log.

use async_trait::async_trait;

use agent_core::Event;
use tracing::info;
use webpilot_event_bus::{BusError, EventSink};

pub struct TaskEventLogger;

#[async_trait]
impl EventSink<Event> for TaskEventLogger {
    async fn handle(&self, event: &Event) -> Result<(), BusError> {
        let data = &event.data;
        let mut details = vec![data.details.clone()];
        if data.is_final == Some(true) {
            details.push("final: true".to_string());
        }
        if let Some(plan) = &data.plan {
            details.push(format!("plan: {plan}"));
        }
        if let Some(tool) = &data.tool {
            details.push(format!("tool: {tool}"));
        }
        info!(
            "TASK[{}]: {}:{}: {} from {} - {}",
            data.task_id,
            data.step,
            data.tool_round,
            event.state.as_str(),
            event.actor,
            details.join(" | ")
        );
        Ok(())
    }
}
