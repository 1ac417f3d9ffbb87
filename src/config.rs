//! Configuration loader and validator for the relay bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub http: Http,
    pub telegram: Telegram,
    pub sanity: Sanity,
    pub site: Site,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub max_pending_per_user: i64,
    pub max_upload_bytes: u32,
}

/// Inbound HTTP settings and endpoint secrets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Http {
    pub bind_addr: String,
    pub notify_secret: String,
    pub api_key: String,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    pub webhook_secret: String,
    pub moderation_chat_id: Option<i64>,
    pub admin_ids: Vec<i64>,
}

/// Sanity CMS credentials and dataset selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sanity {
    pub project_id: String,
    pub dataset: String,
    pub token: String,
    pub api_version: String,
    pub webhook_signature: String,
}

/// Public site revalidation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub base_url: String,
    pub revalidate_secret: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.batch_size == 0 {
        return Err(ConfigError::Invalid("app.batch_size must be > 0"));
    }
    if cfg.app.max_pending_per_user <= 0 {
        return Err(ConfigError::Invalid("app.max_pending_per_user must be > 0"));
    }
    if cfg.app.max_upload_bytes == 0 {
        return Err(ConfigError::Invalid("app.max_upload_bytes must be > 0"));
    }

    if cfg.http.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("http.bind_addr must be non-empty"));
    }
    if cfg.http.notify_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("http.notify_secret must be non-empty"));
    }
    if cfg.http.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("http.api_key must be non-empty"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.telegram.webhook_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.webhook_secret must be non-empty"));
    }

    if cfg.sanity.project_id.trim().is_empty() {
        return Err(ConfigError::Invalid("sanity.project_id must be non-empty"));
    }
    if cfg.sanity.dataset.trim().is_empty() {
        return Err(ConfigError::Invalid("sanity.dataset must be non-empty"));
    }
    if cfg.sanity.token.trim().is_empty() {
        return Err(ConfigError::Invalid("sanity.token must be non-empty"));
    }
    if cfg.sanity.api_version.trim().is_empty() {
        return Err(ConfigError::Invalid("sanity.api_version must be non-empty"));
    }
    if cfg.sanity.webhook_signature.trim().is_empty() {
        return Err(ConfigError::Invalid("sanity.webhook_signature must be non-empty"));
    }

    if cfg.site.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("site.base_url must be non-empty"));
    }
    if cfg.site.revalidate_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("site.revalidate_secret must be non-empty"));
    }

    Ok(())
}

/// Complete sample configuration, used by tests and `--help` docs.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  batch_size: 5
  batch_delay_ms: 1000
  max_pending_per_user: 5
  max_upload_bytes: 2097152

http:
  bind_addr: "0.0.0.0:8080"
  notify_secret: "NOTIFY_SECRET"
  api_key: "SUBSCRIBE_API_KEY"

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  webhook_secret: "TELEGRAM_WEBHOOK_SECRET"
  moderation_chat_id: -1001234567890
  admin_ids:
    - 123456789

sanity:
  project_id: "abc123"
  dataset: "production"
  token: "YOUR_SANITY_TOKEN"
  api_version: "2022-12-07"
  webhook_signature: "SANITY_WEBHOOK_SIGNATURE"

site:
  base_url: "https://example.org"
  revalidate_secret: "REVALIDATE_SECRET"
"#
}
