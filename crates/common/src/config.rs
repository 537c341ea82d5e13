use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SUBJECT: &str = "UnknownUser";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub workspace_dir: PathBuf,
    // Falls back to <workspace_dir>/activity.sqlite3
    pub db_path: Option<PathBuf>,
    pub sample_interval_ms: u64,
    pub keep_awake_enabled: bool,
    pub keep_awake_interval_secs: u64,
    // 0 selects an unbounded queue
    pub queue_capacity: usize,
    pub queue_poll_ms: u64,
    pub drain_grace_ms: u64,
    pub default_subject: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let base_dir = dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let workspace_dir = base_dir.join(".deskwatch");

        Self {
            workspace_dir,
            db_path: None,
            sample_interval_ms: 3000,
            keep_awake_enabled: true,
            keep_awake_interval_secs: 30,
            queue_capacity: 10_000,
            queue_poll_ms: 500,
            drain_grace_ms: 1500,
            default_subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let workspace_dir = Self::default().workspace_dir;
        let config_path = crate::paths::config_file(&workspace_dir);

        let mut builder = Config::builder()
            .set_default("workspace_dir", workspace_dir.to_string_lossy().as_ref())?
            .set_default("sample_interval_ms", 3000)?
            .set_default("keep_awake_enabled", true)?
            .set_default("keep_awake_interval_secs", 30)?
            .set_default("queue_capacity", 10_000)?
            .set_default("queue_poll_ms", 500)?
            .set_default("drain_grace_ms", 1500)?
            .set_default("default_subject", DEFAULT_SUBJECT)?;

        if config_path.exists() {
            builder = builder.add_source(File::from(config_path));
        }

        builder = builder.add_source(Environment::with_prefix("DESKWATCH"));

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| crate::paths::default_db(&self.workspace_dir))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn keep_awake_interval(&self) -> Duration {
        Duration::from_secs(self.keep_awake_interval_secs.max(1))
    }

    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms.max(1))
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}
