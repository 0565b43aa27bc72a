use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

const HEALTHY: &str = "healthy";
const UNHEALTHY: &str = "unhealthy";

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    pub details: String,
}

impl ComponentHealth {
    fn healthy(details: impl Into<String>) -> Self {
        Self {
            status: HEALTHY,
            details: details.into(),
        }
    }

    fn unhealthy(details: impl Into<String>) -> Self {
        Self {
            status: UNHEALTHY,
            details: details.into(),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == HEALTHY
    }
}

#[derive(Debug, Serialize)]
pub struct HealthComponents {
    pub api: ComponentHealth,
    pub reddit_api: ComponentHealth,
    pub database: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub components: HealthComponents,
}

/// Probes the feed with a one-post fetch and the database with `SELECT 1`.
/// Any failing check degrades the service and answers 503.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (feed, database) = tokio::join!(state.source.fetch_top(1), state.database.ping());

    let reddit_api = match feed {
        Ok(_) => ComponentHealth::healthy("Successfully connected to Reddit API"),
        Err(e) => {
            warn!("Health check: Reddit API check failed: {}", e);
            ComponentHealth::unhealthy(format!("Failed to connect to Reddit API: {}", e))
        }
    };
    let database = match database {
        Ok(()) => ComponentHealth::healthy("Successfully connected to database"),
        Err(e) => {
            warn!("Health check: database check failed: {}", e);
            ComponentHealth::unhealthy(format!("Failed to connect to database: {}", e))
        }
    };

    let degraded = !reddit_api.is_healthy() || !database.is_healthy();
    let (status, code) = if degraded {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    } else {
        (HEALTHY, StatusCode::OK)
    };

    let response = HealthResponse {
        status,
        timestamp: Utc::now().to_rfc3339(),
        components: HealthComponents {
            api: ComponentHealth::healthy("API server is running"),
            reddit_api,
            database,
        },
    };
    (code, Json(response))
}
