//! Process configuration, read from the environment (and `.env`, if present).

use crate::error::ConfigError;
use crate::types::DeliveryMode;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_REPORT_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Telegram defaults shared by the scheduler and the report endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
    pub mode: DeliveryMode,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_telegram_api_base(),
            mode: DeliveryMode::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    #[serde(default = "default_user_agent")]
    pub reddit_user_agent: String,
    #[serde(default = "default_subreddit")]
    pub reddit_subreddit: String,
    #[serde(default = "default_oauth_base_url")]
    pub reddit_oauth_base_url: String,
    #[serde(default = "default_public_base_url")]
    pub reddit_public_base_url: String,
    #[serde(default = "default_token_url")]
    pub reddit_token_url: String,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,
    #[serde(default)]
    pub report_delivery_mode: DeliveryMode,
    #[serde(default = "default_report_limit")]
    pub report_limit: u32,
    #[serde(default = "default_schedule_hours")]
    pub schedule_hours: Vec<u32>,

    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    // Declared for deployments that set them; the fetch path ignores them.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_expire_minutes")]
    pub cache_expire_minutes: u64,
    #[serde(default = "default_rate_limit_seconds")]
    pub rate_limit_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_database_url() -> String {
    "sqlite://memefeed.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_user_agent() -> String {
    "rust:memefeed:v0.1.0".to_string()
}

fn default_subreddit() -> String {
    "memes".to_string()
}

fn default_oauth_base_url() -> String {
    "https://oauth.reddit.com".to_string()
}

fn default_public_base_url() -> String {
    "https://www.reddit.com".to_string()
}

fn default_token_url() -> String {
    "https://www.reddit.com/api/v1/access_token".to_string()
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_report_limit() -> u32 {
    DEFAULT_REPORT_LIMIT
}

fn default_schedule_hours() -> Vec<u32> {
    vec![0, 8, 16]
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "https://reddit-memes-ui.vercel.app".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_cache_expire_minutes() -> u64 {
    5
}

fn default_rate_limit_seconds() -> u64 {
    1
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl AppConfig {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: AppConfig = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule_hours.is_empty() {
            return Err(ConfigError::MissingField {
                field: "SCHEDULE_HOURS".to_string(),
            });
        }
        if let Some(hour) = self.schedule_hours.iter().find(|hour| **hour > 23) {
            return Err(ConfigError::InvalidValue {
                field: "SCHEDULE_HOURS".to_string(),
                value: hour.to_string(),
            });
        }
        if self.report_limit == 0 || self.report_limit > MAX_PAGE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "REPORT_LIMIT".to_string(),
                value: self.report_limit.to_string(),
            });
        }
        if self.database_max_connections == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            });
        }
        if non_empty(&self.reddit_client_id).is_some()
            != non_empty(&self.reddit_client_secret).is_some()
        {
            return Err(ConfigError::ValidationFailed {
                reason: "REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET must be set together"
                    .to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Client id and secret, when both are configured.
    pub fn reddit_credentials(&self) -> Option<(&str, &str)> {
        non_empty(&self.reddit_client_id).zip(non_empty(&self.reddit_client_secret))
    }

    pub fn telegram_bot_token(&self) -> Option<&str> {
        non_empty(&self.telegram_bot_token)
    }

    pub fn telegram_chat_id(&self) -> Option<&str> {
        non_empty(&self.telegram_chat_id)
    }

    pub fn telegram_settings(&self) -> TelegramSettings {
        TelegramSettings {
            bot_token: self.telegram_bot_token().map(str::to_string),
            chat_id: self.telegram_chat_id().map(str::to_string),
            api_base: self.telegram_api_base.clone(),
            mode: self.report_delivery_mode,
        }
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.allowed_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }
}
