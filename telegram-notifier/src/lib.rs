use chrono::{DateTime, Utc};
use memefeed_core::{CoreError, DeliveryMode, NewMeme, TelegramError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects text messages above 4096 characters; stay below it.
pub const MAX_MESSAGE_CHARS: usize = 4000;
pub const MAX_CAPTION_CHARS: usize = 1024;
pub const TRUNCATION_MARKER: &str = "\n\n... (message truncated)";

#[derive(Clone, PartialEq, Eq)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

impl fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl TelegramCredentials {
    /// Picks each credential from the explicit value when given, otherwise
    /// from the default. Blank values count as missing.
    pub fn resolve(
        bot_token: Option<&str>,
        chat_id: Option<&str>,
        default_bot_token: Option<&str>,
        default_chat_id: Option<&str>,
    ) -> Result<Self, CoreError> {
        let bot_token = present(bot_token)
            .or(present(default_bot_token))
            .ok_or_else(|| TelegramError::MissingCredentials {
                field: "bot_token".to_string(),
            })?;
        let chat_id = present(chat_id)
            .or(present(default_chat_id))
            .ok_or_else(|| TelegramError::MissingCredentials {
                field: "chat_id".to_string(),
            })?;

        Ok(Self {
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http_client: Client,
    api_base: String,
    credentials: TelegramCredentials,
    mode: DeliveryMode,
}

impl TelegramNotifier {
    pub fn new(credentials: TelegramCredentials) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            http_client,
            api_base: TELEGRAM_API_BASE.to_string(),
            credentials,
            mode: DeliveryMode::Digest,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Delivers the report. In per-post mode the first failed message
    /// aborts the rest.
    pub async fn send_report(&self, memes: &[NewMeme]) -> Result<(), CoreError> {
        match self.mode {
            DeliveryMode::Digest => {
                let message = truncate_message(&format_digest(memes, Utc::now()), MAX_MESSAGE_CHARS);
                self.send_message(&message).await?;
            }
            DeliveryMode::PerPost => {
                for (index, meme) in memes.iter().enumerate() {
                    let entry = format_entry(index + 1, meme);
                    if meme.is_image() {
                        let caption = truncate_message(
                            &entry,
                            MAX_CAPTION_CHARS - TRUNCATION_MARKER.chars().count(),
                        );
                        self.send_photo(&meme.url, &caption).await?;
                    } else {
                        self.send_message(&truncate_message(&entry, MAX_MESSAGE_CHARS))
                            .await?;
                    }
                }
            }
        }

        info!(
            "Successfully sent meme report to Telegram ({} memes, {:?})",
            memes.len(),
            self.mode
        );
        Ok(())
    }

    pub async fn send_message(&self, text: &str) -> Result<(), CoreError> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": self.credentials.chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
        )
        .await
    }

    pub async fn send_photo(&self, photo_url: &str, caption: &str) -> Result<(), CoreError> {
        self.call(
            "sendPhoto",
            json!({
                "chat_id": self.credentials.chat_id,
                "photo": photo_url,
                "caption": caption,
                "parse_mode": "HTML",
            }),
        )
        .await
    }

    async fn call(&self, method: &str, payload: Value) -> Result<(), CoreError> {
        let url = format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.credentials.bot_token,
            method
        );

        // Request URLs embed the bot token, so they are stripped from errors.
        let response = self
            .http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Error sending {} to Telegram: {}", method, e);
                CoreError::Network(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| CoreError::Network(e.without_url()))?;
        let parsed = serde_json::from_str::<TelegramResponse>(&body).ok();

        match parsed {
            Some(TelegramResponse { ok: true, .. }) if status.is_success() => {
                debug!("Telegram accepted {}", method);
                Ok(())
            }
            Some(TelegramResponse { description, .. }) => {
                let description = description.unwrap_or_else(|| status.to_string());
                error!("Telegram rejected {}: {}", method, description);
                Err(TelegramError::Rejected {
                    method: method.to_string(),
                    status_code: Some(status.as_u16()),
                    description,
                }
                .into())
            }
            None if status.is_success() => Err(TelegramError::InvalidResponse {
                details: format!("{} returned a body that is not a Telegram response", method),
            }
            .into()),
            None => Err(TelegramError::Rejected {
                method: method.to_string(),
                status_code: Some(status.as_u16()),
                description: status.to_string(),
            }
            .into()),
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn format_entry(rank: usize, meme: &NewMeme) -> String {
    format!(
        "{}. {}\n👍 Score: {} | 💬 Comments: {}\n🔗 {}",
        rank,
        escape_html(&meme.title),
        meme.score,
        meme.num_comments,
        escape_html(&meme.permalink)
    )
}

pub fn format_digest(memes: &[NewMeme], generated_at: DateTime<Utc>) -> String {
    let mut message = format!(
        "🎯 Top {} Memes Report - {}\n\n",
        memes.len(),
        generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    for (index, meme) in memes.iter().enumerate() {
        message.push_str(&format_entry(index + 1, meme));
        message.push_str("\n\n");
    }
    message
}

/// Cuts `text` to `max_chars` characters and appends [`TRUNCATION_MARKER`].
/// The cut never splits an HTML entity.
pub fn truncate_message(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut cut: String = text.chars().take(max_chars).collect();
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut.truncate(amp);
        }
    }
    cut.push_str(TRUNCATION_MARKER);
    cut
}
