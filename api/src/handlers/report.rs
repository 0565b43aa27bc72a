use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use memefeed_core::{DeliveryMode, ErrorExt, DEFAULT_REPORT_LIMIT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use telegram_notifier::{TelegramCredentials, TelegramNotifier};
use tracing::{error, info, info_span, Instrument};

use super::check_limit;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReportCredentials {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub credentials: Option<ReportCredentials>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub mode: Option<DeliveryMode>,
}

#[derive(Debug, Serialize)]
pub struct ReportAccepted {
    pub message: &'static str,
    pub using_env_credentials: bool,
    pub limit: u32,
}

fn supplied(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|value| !value.trim().is_empty())
}

/// Fetches the top posts and hands delivery to a background task.
///
/// Credentials are checked before anything is fetched. The response only
/// acknowledges the request; delivery errors end up in the log.
pub async fn send_meme_report(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<ReportAccepted>), ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ReportRequest::default()
    } else {
        serde_json::from_slice::<Option<ReportRequest>>(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?
            .unwrap_or_default()
    };

    let limit = check_limit(request.limit.unwrap_or(DEFAULT_REPORT_LIMIT))?;
    let explicit = request.credentials.unwrap_or_default();
    let using_env_credentials = !(supplied(&explicit.bot_token) && supplied(&explicit.chat_id));

    let credentials = TelegramCredentials::resolve(
        explicit.bot_token.as_deref(),
        explicit.chat_id.as_deref(),
        state.telegram.bot_token.as_deref(),
        state.telegram.chat_id.as_deref(),
    )?;
    let mode = request.mode.unwrap_or(state.telegram.mode);
    let notifier = TelegramNotifier::new(credentials)?
        .with_api_base(state.telegram.api_base.clone())
        .with_mode(mode);

    let memes = state.source.fetch_top(limit).await?;
    let count = memes.len();

    tokio::spawn(
        async move {
            if let Err(e) = notifier.send_report(&memes).await {
                error!("Error sending meme report");
                e.log_error();
            }
        }
        .instrument(info_span!("send_report", count, ?mode)),
    );

    info!(
        "Queued meme report with {} memes (env credentials: {})",
        count, using_env_credentials
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(ReportAccepted {
            message: "Meme report is being sent to Telegram",
            using_env_credentials,
            limit,
        }),
    ))
}
