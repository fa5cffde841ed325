//! Config file loading and directory bootstrap.

use webpilot::config::WebpilotConfig;
use webpilot::paths::PathManager;

#[test]
fn config_loads_and_paths_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("state");
    let config_path = dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        format!(
            r#"
base_dir: {}
max_steps: 12
log_level: debug
planner:
  model: test-model
  api_base: http://127.0.0.1:11434/v1
navigator:
  model: test-model
  api_base: http://127.0.0.1:11434/v1
browser:
  cdp_port: 9333
  headless: true
"#,
            base.display()
        ),
    )
    .unwrap();

    let config = WebpilotConfig::from_yaml(&config_path).unwrap();
    assert_eq!(config.max_steps, 12);
    assert_eq!(config.browser.cdp_port, 9333);
    assert!(config.browser.headless);
    assert_eq!(config.server.port, 6768);

    let paths = PathManager::new(&config.base_dir).unwrap();
    assert!(paths.tasks.is_dir());
    assert!(paths.messages.is_dir());

    let session = config.session_config(paths.screenshots.clone());
    assert_eq!(session.cdp_port, 9333);
    assert!(session.headless);
    assert!(!session.screenshot_capture);
}
