//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ListingSelectors;

/// Environment variable holding the chat-platform credential.
pub const ENV_TOKEN: &str = "DISCORD_TOKEN";
/// Environment variable holding the database path.
pub const ENV_DB_PATH: &str = "DB_PATH";
/// Environment variable holding the HTTP User-Agent.
pub const ENV_USER_AGENT: &str = "USER_AGENT";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat platform settings
    #[serde(default)]
    pub bot: BotConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP and scraping behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Tick scheduling
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Keyword subscription rules
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Search page selectors
    #[serde(default)]
    pub selectors: ListingSelectors,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override file values with `DISCORD_TOKEN`, `DB_PATH` and `USER_AGENT`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override file values from an arbitrary variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(ENV_TOKEN) {
            self.bot.token = token;
        }
        if let Some(path) = non_empty(ENV_DB_PATH) {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(agent) = non_empty(ENV_USER_AGENT) {
            self.crawler.user_agent = agent;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(AppError::validation("scheduler.interval_secs must be > 0"));
        }
        if self.notify.max_keyword_length == 0 {
            return Err(AppError::validation(
                "notify.max_keyword_length must be > 0",
            ));
        }
        if self.bot.prefix.is_empty() {
            return Err(AppError::validation("bot.prefix is empty"));
        }
        for (key, selector) in self.selectors.entries() {
            if selector.trim().is_empty() {
                return Err(AppError::validation(format!("{key} is empty")));
            }
        }
        Ok(())
    }

    /// Require the credential needed to talk to the chat platform.
    pub fn require_token(&self) -> Result<&str> {
        let token = self.bot.token.trim();
        if token.is_empty() {
            return Err(AppError::config(format!(
                "No bot token configured; set {ENV_TOKEN}"
            )));
        }
        Ok(token)
    }
}

/// Chat platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot credential (usually supplied through `DISCORD_TOKEN`)
    #[serde(default)]
    pub token: String,

    /// Command prefix
    #[serde(default = "defaults::prefix")]
    pub prefix: String,

    /// REST API base URL
    #[serde(default = "defaults::api_base")]
    pub api_base: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            prefix: defaults::prefix(),
            api_base: defaults::api_base(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "defaults::db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: defaults::db_path(),
        }
    }
}

/// HTTP client and scraping behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent requests per tick
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Origin prefixed to each ad's relative URL
    #[serde(default = "defaults::site_url")]
    pub site_url: String,

    /// Text a search page must contain to be accepted by `addurl`
    #[serde(default = "defaults::probe_marker")]
    pub probe_marker: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            site_url: defaults::site_url(),
            probe_marker: defaults::probe_marker(),
        }
    }
}

/// Tick scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Age in days after which seen-listing rows are pruned; 0 keeps them
    #[serde(default)]
    pub seen_retention_days: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            seen_retention_days: 0,
        }
    }
}

/// Keyword subscription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Maximum keyword length in characters
    #[serde(default = "defaults::max_keyword_length")]
    pub max_keyword_length: usize,

    /// Match keywords regardless of letter case
    #[serde(default)]
    pub case_insensitive: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_keyword_length: defaults::max_keyword_length(),
            case_insensitive: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset
    #[serde(default = "defaults::level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Bot defaults
    pub fn prefix() -> String {
        "?".into()
    }
    pub fn api_base() -> String {
        "https://discord.com/api/v10/".into()
    }

    // Storage defaults
    pub fn db_path() -> PathBuf {
        PathBuf::from("kijiji.db")
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; kijiji-bot/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn site_url() -> String {
        "https://www.kijiji.ca".into()
    }
    pub fn probe_marker() -> String {
        "showing".into()
    }

    // Scheduler defaults
    pub fn interval() -> u64 {
        300
    }

    // Notify defaults
    pub fn max_keyword_length() -> usize {
        32
    }

    // Logging defaults
    pub fn level() -> String {
        "info".into()
    }
}
