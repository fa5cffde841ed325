use std::path::PathBuf;

/// Chrome switches applied to every browser we launch or spawn.
/// See https://peter.sh/experiments/chromium-command-line-switches/
pub(crate) const DEFAULT_CHROME_ARGS: &[&str] = &[
    "--disable-infobars",
    "--no-pings",
    "--disable-breakpad",
    "--disable-component-update",
    "--disable-background-timer-throttling",
    "--disable-popup-blocking",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-dev-shm-usage",
];

const CHROME_BINARIES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium-browser",
    "chromium",
    "chrome",
];

/// Configuration for browser acquisition and page tracking.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Path to an externally managed Chrome binary. When set, acquisition
    /// attaches over the remote-debugging protocol instead of launching an
    /// owned browser.
    pub chrome_path: Option<PathBuf>,
    /// Remote debugging port probed for an attachable browser.
    pub cdp_port: u16,
    pub headless: bool,
    /// Page opened when no tab can be bound.
    pub home_url: String,
    pub screenshots_dir: Option<PathBuf>,
    pub screenshot_capture: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            cdp_port: 9222,
            headless: false,
            home_url: "https://www.google.com".to_string(),
            screenshots_dir: None,
            screenshot_capture: false,
        }
    }
}

impl SessionConfig {
    /// Look for a Chrome/Chromium binary on PATH.
    pub fn discover_chrome() -> Option<PathBuf> {
        CHROME_BINARIES
            .iter()
            .find_map(|name| which::which(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_standard_port() {
        let config = SessionConfig::default();
        assert_eq!(config.cdp_port, 9222);
        assert!(config.chrome_path.is_none());
        assert!(!config.screenshot_capture);
    }
}
