//! Request handlers.

mod health;
mod memes;
mod report;

pub use health::{health_check, ComponentHealth, HealthComponents, HealthResponse};
pub use memes::{get_meme_history, get_top_memes, HistoryQuery, TopQuery};
pub use report::{send_meme_report, ReportAccepted, ReportCredentials, ReportRequest};

use crate::error::ApiError;
use memefeed_core::{DEFAULT_REPORT_LIMIT, MAX_PAGE_LIMIT};

/// Parses a `limit` parameter; absent means the default of 20.
pub(crate) fn parse_limit(raw: Option<&str>) -> Result<u32, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(DEFAULT_REPORT_LIMIT);
    };
    raw.parse::<u32>()
        .ok()
        .filter(|limit| check_limit(*limit).is_ok())
        .ok_or_else(limit_error)
}

pub(crate) fn check_limit(limit: u32) -> Result<u32, ApiError> {
    if (1..=MAX_PAGE_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(limit_error())
    }
}

fn limit_error() -> ApiError {
    ApiError::bad_request(format!(
        "limit must be an integer between 1 and {}",
        MAX_PAGE_LIMIT
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None).unwrap(), 20);
        assert_eq!(parse_limit(Some("")).unwrap(), 20);
        assert_eq!(parse_limit(Some("1")).unwrap(), 1);
        assert_eq!(parse_limit(Some("100")).unwrap(), 100);

        for raw in ["0", "101", "-3", "ten", "2.5"] {
            assert!(parse_limit(Some(raw)).is_err(), "{raw} should be rejected");
        }
    }
}
