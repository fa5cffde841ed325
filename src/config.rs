//! Application configuration, loaded from a YAML file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use agent_core::context::{DEFAULT_MAX_ERRORS, DEFAULT_MAX_STEPS, DEFAULT_MAX_TOOL_ROUNDS};
use browser_session::SessionConfig;

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".webpilot")
}

fn default_true() -> bool {
    true
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

fn default_max_errors() -> u32 {
    DEFAULT_MAX_ERRORS
}

fn default_max_tool_rounds() -> u32 {
    DEFAULT_MAX_TOOL_ROUNDS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Model settings for one decision role.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    /// OpenAI-compatible chat completions endpoint base, e.g.
    /// `https://api.openai.com/v1`.
    pub api_base: String,
    /// Name of the environment variable holding the API key. Optional for
    /// local endpoints.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// External Chrome binary; when unset the config loader tries to
    /// discover one, and when none is found an owned browser is launched.
    #[serde(default)]
    pub chrome_app_path: Option<PathBuf>,
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub home_url: Option<String>,
    #[serde(default)]
    pub screenshot_capture: bool,
}

fn default_cdp_port() -> u16 {
    9222
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_app_path: None,
            cdp_port: default_cdp_port(),
            headless: false,
            home_url: None,
            screenshot_capture: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6768
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebpilotConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_true")]
    pub save_chat_history: bool,
    #[serde(default = "default_true")]
    pub log_events: bool,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    pub planner: ModelConfig,
    pub navigator: ModelConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl WebpilotConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: WebpilotConfig =
            serde_yaml::from_str(&text).context("parsing config file")?;

        // resolve the chrome path: an explicit-but-missing path falls back
        // to discovery
        config.browser.chrome_app_path = match config.browser.chrome_app_path.take() {
            Some(path) if path.exists() => Some(path),
            _ => SessionConfig::discover_chrome(),
        };
        Ok(config)
    }

    pub fn budgets(&self) -> agent_core::Budgets {
        agent_core::Budgets::default()
            .max_steps(self.max_steps)
            .max_errors(self.max_errors)
            .max_tool_rounds(self.max_tool_rounds)
    }

    pub fn session_config(&self, screenshots_dir: PathBuf) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            chrome_path: self.browser.chrome_app_path.clone(),
            cdp_port: self.browser.cdp_port,
            headless: self.browser.headless,
            home_url: self
                .browser
                .home_url
                .clone()
                .unwrap_or(defaults.home_url),
            screenshots_dir: Some(screenshots_dir),
            screenshot_capture: self.browser.screenshot_capture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let yaml = r#"
planner:
  model: gpt-4o
  api_base: https://api.openai.com/v1
  api_key_env: OPENAI_API_KEY
navigator:
  model: gpt-4o-mini
  api_base: https://api.openai.com/v1
  api_key_env: OPENAI_API_KEY
"#;
        let config: WebpilotConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(config.server.port, 6768);
        assert_eq!(config.browser.cdp_port, 9222);
        assert!(config.save_chat_history);
    }

    #[test]
    fn budgets_reflect_overrides() {
        let yaml = r#"
max_steps: 7
max_errors: 2
planner: { model: m, api_base: "http://localhost:11434/v1" }
navigator: { model: m, api_base: "http://localhost:11434/v1" }
"#;
        let config: WebpilotConfig = serde_yaml::from_str(yaml).unwrap();
        let budgets = config.budgets();
        assert_eq!(budgets.max_steps, 7);
        assert_eq!(budgets.max_errors, 2);
        assert_eq!(budgets.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
    }
}
