//! Construction of the engine and its collaborators. All singletons are
//! built and owned here, at the process entry point.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use agent_core::{
    BrowserPort, DecisionService, EngineConfig, ExecutionBus, Navigator, Planner, RetryPolicy,
    SharedContext, TaskExecutionEngine, TaskManager, ToolRegistry,
};
use browser_session::BrowserSession;

use crate::bridge::SessionBrowserPort;
use crate::config::WebpilotConfig;
use crate::event_log::TaskEventLogger;
use crate::llm::OpenAiCompatService;
use crate::paths::PathManager;

pub struct App {
    pub engine: Arc<TaskExecutionEngine>,
    pub session: Arc<BrowserSession>,
    pub tasks: Arc<TaskManager>,
}

impl App {
    /// Build every service and acquire the browser. Acquisition failure is
    /// fatal: there is no partial-success mode.
    pub async fn build(config: &WebpilotConfig, paths: &PathManager) -> Result<App> {
        let session = Arc::new(BrowserSession::new(
            config.session_config(paths.screenshots.clone()),
        ));
        session
            .acquire()
            .await
            .context("failed to acquire a browser session")?;

        let browser: Arc<dyn BrowserPort> = SessionBrowserPort::new(Arc::clone(&session));
        let bus = Arc::new(ExecutionBus::new());
        if config.log_events {
            bus.subscribe(Arc::new(TaskEventLogger));
        }

        let planner_service: Arc<dyn DecisionService> =
            Arc::new(OpenAiCompatService::new(&config.planner).context("planner model")?);
        let navigator_service: Arc<dyn DecisionService> =
            Arc::new(OpenAiCompatService::new(&config.navigator).context("navigator model")?);

        let budgets = config.budgets();
        let context = SharedContext::new(budgets);
        let registry = Arc::new(
            ToolRegistry::standard().map_err(|err| anyhow!("tool registry: {err}"))?,
        );

        let planner = Planner::new(
            planner_service,
            Arc::clone(&browser),
            Arc::clone(&bus),
            context.clone(),
            RetryPolicy::default(),
        );
        let navigator = Navigator::new(
            navigator_service,
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
                messages_dir: config.save_chat_history.then(|| paths.messages.clone()),
            },
        );

        let tasks = Arc::new(
            TaskManager::new(paths.tasks.clone())
                .map_err(|err| anyhow!("task store: {err}"))?,
        );

        Ok(App {
            engine: Arc::new(engine),
            session,
            tasks,
        })
    }

    pub async fn shutdown(&self) {
        self.session.close().await;
    }
}
