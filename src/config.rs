use serde::Deserialize;

use crate::retention::DEFAULT_RETENTION_CAP;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub source: SourceConfig,
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u32,
    /// Max delta captures kept in memory; oldest are evicted first.
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,
    /// Upper bound on one counter fetch; a slower tick is abandoned.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Take a baseline and start capturing as soon as the service is up.
    #[serde(default)]
    pub auto_start: bool,
    /// How often to log app stats (ws clients, captures) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

fn default_interval_secs() -> u32 {
    60
}

fn default_retention_cap() -> usize {
    DEFAULT_RETENTION_CAP
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_stats_log_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Label written into session files.
    pub server_name: String,
    /// Program printing the counter rows as a JSON array on stdout.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Max captures buffered for /ws/captures (slow clients may lag).
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Where sessions and CSV exports go when no path is given.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> String {
    "data/sessions".into()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.capture.interval_secs > 0,
            "capture.interval_secs must be > 0, got {}",
            self.capture.interval_secs
        );
        anyhow::ensure!(
            self.capture.retention_cap > 0,
            "capture.retention_cap must be > 0, got {}",
            self.capture.retention_cap
        );
        anyhow::ensure!(
            self.capture.fetch_timeout_secs > 0,
            "capture.fetch_timeout_secs must be > 0, got {}",
            self.capture.fetch_timeout_secs
        );
        anyhow::ensure!(
            self.capture.stats_log_interval_secs > 0,
            "capture.stats_log_interval_secs must be > 0, got {}",
            self.capture.stats_log_interval_secs
        );
        anyhow::ensure!(
            !self.source.command.trim().is_empty(),
            "source.command must be non-empty"
        );
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        anyhow::ensure!(
            !self.session.export_dir.is_empty(),
            "session.export_dir must be non-empty"
        );
        Ok(())
    }
}
