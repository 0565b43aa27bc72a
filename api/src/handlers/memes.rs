use axum::{
    extract::{Query, State},
    Json,
};
use memefeed_core::{Meme, NewMeme, Page, SortField, SortOrder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::parse_limit;
use crate::error::ApiError;
use crate::state::AppState;

// Query values stay raw strings so bad input gets the API's own 400 body.

#[derive(Debug, Default, Deserialize)]
pub struct TopQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

/// Fetches the current top posts, stores them, and returns the batch.
pub async fn get_top_memes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopQuery>,
) -> Result<Json<Vec<NewMeme>>, ApiError> {
    let limit = parse_limit(query.limit.as_deref())?;

    let memes = state.source.fetch_top(limit).await?;
    state.database.upsert_memes(&memes).await?;

    info!("Served {} top memes", memes.len());
    Ok(Json(memes))
}

pub async fn get_meme_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Page<Meme>>, ApiError> {
    let limit = parse_limit(query.limit.as_deref())?;
    let sort_field = query
        .sort_by
        .as_deref()
        .map(str::parse::<SortField>)
        .transpose()?
        .unwrap_or_default();
    let order = query
        .order
        .as_deref()
        .map(str::parse::<SortOrder>)
        .transpose()?
        .unwrap_or_default();

    let page = state
        .database
        .list_page(query.cursor.as_deref(), limit, sort_field, order)
        .await?;
    Ok(Json(page))
}
