use crate::error::*;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_client_error(&self) -> bool;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::RedditApi(e) => {
                error!("Reddit API error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Telegram(e) => {
                error!("Telegram error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_client_error(&self) -> bool {
        match self {
            CoreError::InvalidInput { .. } => true,
            CoreError::Telegram(e) => e.is_client_error(),
            _ => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Telegram(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => message.clone(),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.error_code(),
            CoreError::Database(e) => e.error_code(),
            CoreError::Telegram(e) => e.error_code(),
            CoreError::Config(e) => e.error_code(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!("RedditApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RedditApiError (warning): {}", self);
        self
    }

    fn is_client_error(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your credentials.".to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => format!(
                "Reddit is rate limiting requests. Try again in {} seconds.",
                retry_after
            ),
            RedditApiError::Forbidden { resource } => {
                format!("Access denied to {} by Reddit.", resource)
            }
            RedditApiError::NotFound { resource } => {
                format!("Reddit could not find {}.", resource)
            }
            RedditApiError::InvalidToken => {
                "Reddit authentication token is invalid.".to_string()
            }
            RedditApiError::RequestTimeout => "Request to Reddit timed out.".to_string(),
            _ => "Reddit API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED".to_string(),
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT".to_string(),
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN".to_string(),
            RedditApiError::NotFound { .. } => "REDDIT_NOT_FOUND".to_string(),
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN".to_string(),
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT".to_string(),
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE".to_string(),
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR".to_string(),
            RedditApiError::RequestFailed { .. } => "REDDIT_REQUEST_FAILED".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_client_error(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => {
                "Database connection failed. Please try again.".to_string()
            }
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::SchemaFailed { .. } => "DB_SCHEMA_FAILED".to_string(),
            DatabaseError::TransactionFailed { .. } => "DB_TRANSACTION_FAILED".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for TelegramError {
    fn log_error(&self) -> &Self {
        error!("TelegramError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("TelegramError (warning): {}", self);
        self
    }

    fn is_client_error(&self) -> bool {
        matches!(self, TelegramError::MissingCredentials { .. })
    }

    fn user_friendly_message(&self) -> String {
        match self {
            TelegramError::MissingCredentials { field } => match field.as_str() {
                "chat_id" => "Please provide a valid Telegram chat ID or set TELEGRAM_CHAT_ID environment variable".to_string(),
                _ => "Please provide a valid Telegram bot token or set TELEGRAM_BOT_TOKEN environment variable".to_string(),
            },
            TelegramError::Rejected { description, .. } => {
                format!("Telegram rejected the report: {}", description)
            }
            TelegramError::InvalidResponse { .. } => {
                "Telegram returned an unexpected response.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            TelegramError::MissingCredentials { .. } => "TELEGRAM_MISSING_CREDENTIALS".to_string(),
            TelegramError::Rejected { .. } => "TELEGRAM_REJECTED".to_string(),
            TelegramError::InvalidResponse { .. } => "TELEGRAM_INVALID_RESPONSE".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_client_error(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Env(_) => "CONFIG_ENV_ERROR".to_string(),
        }
    }
}

/// Logs errors that are handled locally instead of being propagated,
/// e.g. failures of scheduled or detached jobs.
pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
