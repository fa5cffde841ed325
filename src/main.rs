use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::error;
use webpilot_core_types::TaskId;

use webpilot::app::App;
use webpilot::config::WebpilotConfig;
use webpilot::paths::PathManager;
use webpilot::{logging, server};

#[derive(Parser)]
#[command(
    name = "webpilot",
    about = "Two-role browser task execution engine",
    version
)]
struct Cli {
    /// Path to the YAML config file; defaults to config.yaml in the current
    /// directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the WebSocket control server (default).
    Serve,
    /// Run an interactive prompt loop.
    Cmd,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => {
            let default = PathBuf::from("config.yaml");
            anyhow::ensure!(
                default.exists(),
                "no config file specified and no config.yaml found in the current directory; \
                 pass one with -c/--config"
            );
            default
        }
    };

    let config = WebpilotConfig::from_yaml(&config_path)?;
    let paths = PathManager::new(&config.base_dir)?;
    let _log_guard = logging::init(&config.log_level, &paths.logs)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, paths).await,
        Command::Cmd => command_loop(config, paths).await,
    }
}

async fn serve(config: WebpilotConfig, paths: PathManager) -> Result<()> {
    let app = App::build(&config, &paths).await?;
    let result = server::serve(
        &config.server.host,
        config.server.port,
        app.engine.clone(),
        app.tasks.clone(),
    )
    .await;
    app.shutdown().await;
    result
}

async fn command_loop(config: WebpilotConfig, paths: PathManager) -> Result<()> {
    let app = App::build(&config, &paths).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    stdout
        .write_all(b"Interactive web automation. Type 'quit' to exit.\n")
        .await
        .context("writing prompt")?;
    loop {
        stdout.write_all(b"> ").await.context("writing prompt")?;
        stdout.flush().await.context("flushing prompt")?;
        let Some(line) = lines.next_line().await.context("reading stdin")? else {
            break;
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command.eq_ignore_ascii_case("quit") {
            break;
        }
        let task_id = TaskId::generate();
        if let Err(err) = app.engine.run(command, task_id, None).await {
            error!(error = %err, "task rejected");
        }
    }

    app.shutdown().await;
    Ok(())
}
