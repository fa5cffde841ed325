//! Browser acquisition: owned launch, or attach over the remote-debugging
//! protocol (spawning the external browser first when nothing is listening).

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, DEFAULT_CHROME_ARGS};
use crate::error::SessionError;
use crate::page::PageSession;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const SPAWN_PROBE_DEADLINE: Duration = Duration::from_secs(10);

struct SessionState {
    browser: Arc<Mutex<Browser>>,
    pages: Arc<PageSession>,
    handler: JoinHandle<()>,
    external: Option<Child>,
    /// True when we launched the browser ourselves and own its lifetime.
    owned: bool,
}

/// Process-wide browser handle. `acquire` is idempotent under an init lock;
/// `reinitialize` is the caller-invoked recovery path for a dropped
/// connection.
pub struct BrowserSession {
    config: SessionConfig,
    state: Mutex<Option<SessionState>>,
}

impl BrowserSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Acquire the browser. Safe to call repeatedly; only the first call
    /// does work.
    pub async fn acquire(&self) -> Result<(), SessionError> {
        let mut guard = self.state.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(self.connect().await?);
        Ok(())
    }

    pub async fn is_acquired(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// The page session bound to this browser.
    pub async fn pages(&self) -> Result<Arc<PageSession>, SessionError> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|state| Arc::clone(&state.pages))
            .ok_or(SessionError::NotInitialized)
    }

    /// Tear down and redo acquisition. Recovery path for a dropped
    /// connection; never invoked automatically.
    pub async fn reinitialize(&self) -> Result<(), SessionError> {
        let mut guard = self.state.lock().await;
        if let Some(state) = guard.take() {
            teardown(state).await;
        }
        *guard = Some(self.connect().await?);
        Ok(())
    }

    /// Release the page, the browser connection/process, and any external
    /// process we spawned.
    pub async fn close(&self) {
        let mut guard = self.state.lock().await;
        if let Some(state) = guard.take() {
            teardown(state).await;
        }
    }

    async fn connect(&self) -> Result<SessionState, SessionError> {
        let (browser, handler, external, owned) = match &self.config.chrome_path {
            None => {
                info!("launching owned browser");
                let (browser, handler) = Browser::launch(self.launch_config()?)
                    .await
                    .map_err(|err| SessionError::launch(err.to_string()))?;
                (browser, handler, None, true)
            }
            Some(path) => {
                let port = self.config.cdp_port;
                let mut external = None;
                if !probe_endpoint(port).await {
                    info!(path = %path.display(), port, "no attachable browser, spawning one");
                    let child = spawn_external(path, port)?;
                    if !wait_for_endpoint(port, SPAWN_PROBE_DEADLINE).await {
                        let mut child = child;
                        let _ = child.kill().await;
                        return Err(SessionError::attach(
                            "spawned browser did not expose the debugging endpoint; \
                             close any existing browser instances and try again",
                        ));
                    }
                    external = Some(child);
                } else {
                    info!(port, "attaching to already-running browser");
                }
                let ws_url = fetch_debugger_url(port).await?;
                let (browser, handler) = Browser::connect(ws_url)
                    .await
                    .map_err(|err| SessionError::attach(err.to_string()))?;
                (browser, handler, external, false)
            }
        };

        let handler = tokio::spawn(async move {
            let mut handler = handler;
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("cdp handler stream ended");
                    break;
                }
            }
        });

        let browser = Arc::new(Mutex::new(browser));
        let pages = Arc::new(PageSession::new(Arc::clone(&browser), &self.config));
        Ok(SessionState {
            browser,
            pages,
            handler,
            external,
            owned,
        })
    }

    fn launch_config(&self) -> Result<BrowserConfig, SessionError> {
        let mut builder = BrowserConfig::builder().no_sandbox();
        for arg in DEFAULT_CHROME_ARGS {
            builder = builder.arg(*arg);
        }
        builder = builder.arg("--disable-blink-features=AutomationControlled");
        if !self.config.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(SessionError::launch)
    }
}

async fn teardown(state: SessionState) {
    state.pages.close_page().await;
    if state.owned {
        let mut browser = state.browser.lock().await;
        if let Err(err) = browser.close().await {
            debug!(error = %err, "closing owned browser failed");
        }
    }
    state.handler.abort();
    if let Some(mut child) = state.external {
        if let Err(err) = child.kill().await {
            warn!(error = %err, "killing spawned browser failed");
        }
    }
}

fn spawn_external(path: &Path, port: u16) -> Result<Child, SessionError> {
    let mut command = Command::new(path);
    command.arg(format!("--remote-debugging-port={port}"));
    command.args(DEFAULT_CHROME_ARGS);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    command
        .spawn()
        .map_err(|err| SessionError::spawn(err.to_string()))
}

async fn probe_endpoint(port: u16) -> bool {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let Ok(client) = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() else {
        return false;
    };
    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

async fn wait_for_endpoint(port: u16, deadline: Duration) -> bool {
    let until = Instant::now() + deadline;
    loop {
        if probe_endpoint(port).await {
            return true;
        }
        if Instant::now() >= until {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

async fn fetch_debugger_url(port: u16) -> Result<String, SessionError> {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|err| SessionError::attach(err.to_string()))?;
    let info: VersionInfo = client
        .get(&url)
        .send()
        .await
        .map_err(|err| SessionError::attach(err.to_string()))?
        .json()
        .await
        .map_err(|err| SessionError::attach(format!("unexpected version payload: {err}")))?;
    Ok(info.web_socket_debugger_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn operations_before_acquire_report_not_initialized() {
        let session = BrowserSession::new(SessionConfig::default());
        assert!(!session.is_acquired().await);
        assert!(matches!(
            session.pages().await,
            Err(SessionError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn probe_on_unused_port_fails_fast() {
        // Port 1 is never a Chrome debugging endpoint.
        assert!(!probe_endpoint(1).await);
    }
}
