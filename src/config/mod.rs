use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Env var that overrides `notifier.webhook_url` (keeps the secret out of the file).
pub const WEBHOOK_URL_ENV: &str = "GOVWATCH_WEBHOOK_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid node argument: {0}")]
    InvalidNode(String),
    #[error("no webhook URL configured (set GOVWATCH_WEBHOOK_URL or notifier.webhook_url, or use dry-run)")]
    MissingWebhook,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One monitored validator/node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    /// Human name used in notification titles.
    pub label: String,
    pub host: String,
    /// REST API port (usually 1317).
    pub port: u16,
}

impl NodeConfig {
    pub fn new(label: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            label: label.into(),
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Parse the `LABEL HOST PORT` triple accepted on the command line.
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        match args {
            [label, host, port] => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidNode(format!("bad port {:?} for {}", port, label)))?;
                Ok(Self::new(label.as_str(), host.as_str(), port))
            }
            _ => Err(ConfigError::InvalidNode(format!(
                "expected LABEL HOST PORT, got {:?}",
                args
            ))),
        }
    }
}

/// What to do when a node's version probe fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailurePolicy {
    /// Stop the process: a dead node-info endpoint is usually a config mistake.
    Abort,
    /// Log it and skip the node for this cycle.
    Skip,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Sleep between cycles, in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_probe_policy")]
    pub on_probe_failure: ProbeFailurePolicy,
    /// Fetch proposal lists from all nodes concurrently.
    #[serde(default)]
    pub parallel_fetch: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatermarkConfig {
    /// File holding the last cycle cutoff (`YYYY-MM-DD HH:MM:SS`, UTC).
    #[serde(default = "default_watermark_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Webhook URL - loaded from env GOVWATCH_WEBHOOK_URL
    #[serde(default)]
    pub webhook_url: String,
    /// Prefix sent with every message. Empty string disables it.
    #[serde(default = "default_mention")]
    pub mention: String,
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
    /// Append `plan.info` to software-upgrade descriptions.
    #[serde(default)]
    pub include_upgrade_info: bool,
    /// Log notifications instead of posting them.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_interval_secs() -> u64 {
    3600
}
fn default_probe_timeout_secs() -> u64 {
    5
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_probe_policy() -> ProbeFailurePolicy {
    ProbeFailurePolicy::Abort
}
fn default_watermark_path() -> PathBuf {
    PathBuf::from("timestamp")
}
fn default_mention() -> String {
    "@everyone".to_string()
}
fn default_max_message_len() -> usize {
    4096
}
fn default_webhook_timeout_secs() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            on_probe_failure: default_probe_policy(),
            parallel_fetch: false,
        }
    }
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            path: default_watermark_path(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            mention: default_mention(),
            max_message_len: default_max_message_len(),
            timeout_secs: default_webhook_timeout_secs(),
            include_upgrade_info: false,
            dry_run: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl NotifierConfig {
    /// The mention prefix, or `None` when it has been blanked out.
    pub fn mention(&self) -> Option<&str> {
        let m = self.mention.trim();
        if m.is_empty() {
            None
        } else {
            Some(m)
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus env-only secrets (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config {
            nodes: Vec::new(),
            poller: PollerConfig::default(),
            watermark: WatermarkConfig::default(),
            notifier: NotifierConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.apply_env();
        config
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) {
        // Override secrets from environment variables (never store in config file)
        if let Ok(url) = std::env::var(WEBHOOK_URL_ENV) {
            self.notifier.webhook_url = url;
        }
    }

    /// Append nodes given as flat `LABEL HOST PORT` triples after the file's nodes.
    pub fn add_cli_nodes(&mut self, flat: &[String]) -> Result<(), ConfigError> {
        if flat.len() % 3 != 0 {
            return Err(ConfigError::InvalidNode(format!(
                "expected LABEL HOST PORT triples, got {} values",
                flat.len()
            )));
        }
        for triple in flat.chunks_exact(3) {
            self.nodes.push(NodeConfig::from_args(triple)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for node in &self.nodes {
            if node.label.trim().is_empty() {
                return Err(ConfigError::InvalidNode(format!("empty label for {}", node.host)));
            }
            if node.port == 0 {
                return Err(ConfigError::InvalidNode(format!("port 0 for {}", node.label)));
            }
        }
        if !self.notifier.dry_run && self.notifier.webhook_url.trim().is_empty() {
            return Err(ConfigError::MissingWebhook);
        }
        Ok(())
    }
}
