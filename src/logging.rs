//! Tracing setup: console layer plus a daily-rolling file layer under the
//! logs directory.

use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. The returned guard must be held for
/// the lifetime of the process so buffered file output is flushed.
pub fn init(log_level: &str, logs_dir: &Path) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("webpilot={log_level},agent_core={log_level},browser_session={log_level}")));

    let file_appender = tracing_appender::rolling::daily(logs_dir, "webpilot.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|err| anyhow::anyhow!("initializing tracing: {err}"))?;

    Ok(guard)
}
