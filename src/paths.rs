//! Directory layout under the configured base dir.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Well-known subdirectories, created eagerly at startup.
#[derive(Clone, Debug)]
pub struct PathManager {
    pub base: PathBuf,
    pub logs: PathBuf,
    pub screenshots: PathBuf,
    pub messages: PathBuf,
    pub tasks: PathBuf,
}

impl PathManager {
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let manager = Self {
            logs: base.join("logs"),
            screenshots: base.join("screenshots"),
            messages: base.join("messages"),
            tasks: base.join("tasks"),
            base,
        };
        for dir in [
            &manager.base,
            &manager.logs,
            &manager.screenshots,
            &manager.messages,
            &manager.tasks,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(manager)
    }
}
