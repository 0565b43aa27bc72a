use chrono::{DateTime, Utc};
use memefeed_core::{CoreError, NewMeme, RedditApiError};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const PERMALINK_BASE: &str = "https://reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub url_overridden_by_dest: Option<String>,
    pub permalink: String,
    pub created_utc: f64,
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub is_video: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RedditApiClient {
    http_client: Client,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Issues a GET and maps non-2xx statuses onto [`RedditApiError`].
    /// Nothing is retried.
    pub async fn make_request(
        &self,
        url: &str,
        access_token: Option<&str>,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let start_time = Instant::now();

        let mut request_builder = self.http_client.get(url).query(query_params);
        if let Some(token) = access_token {
            request_builder = request_builder.bearer_auth(token);
        }

        info!("Making Reddit API request: GET {}", url);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for GET {}: {}", url, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        debug!(
            "Reddit responded {} for {} in {:?}",
            status,
            url,
            start_time.elapsed()
        );

        if status.is_success() {
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, url);
        Err(CoreError::RedditApi(match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("Rate limited, Reddit asks to retry after {} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            StatusCode::UNAUTHORIZED => RedditApiError::InvalidToken,
            StatusCode::FORBIDDEN => RedditApiError::Forbidden {
                resource: url.to_string(),
            },
            StatusCode::NOT_FOUND => RedditApiError::NotFound {
                resource: url.to_string(),
            },
            status if status.is_server_error() => RedditApiError::ServerError {
                status_code: status.as_u16(),
            },
            status => RedditApiError::RequestFailed {
                status_code: status.as_u16(),
            },
        }))
    }

    /// Fetches the "top of the day" listing for a subreddit.
    pub async fn get_top_posts(
        &self,
        url: &str,
        access_token: Option<&str>,
        limit: u32,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let params = [("limit", limit.to_string()), ("t", "day".to_string())];

        let response = self.make_request(url, access_token, &params).await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse top posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse listing from {}", url),
            })
        })?;

        debug!("Retrieved {} posts from {}", listing.data.children.len(), url);
        Ok(listing)
    }
}

impl TryFrom<RedditPostData> for NewMeme {
    type Error = CoreError;

    fn try_from(post_data: RedditPostData) -> Result<Self, Self::Error> {
        let seconds = post_data.created_utc.trunc() as i64;
        let nanos = (post_data.created_utc.fract() * 1e9) as u32;
        let reddit_created_at = DateTime::<Utc>::from_timestamp(seconds, nanos).ok_or_else(|| {
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Post {} has an invalid created_utc", post_data.id),
            })
        })?;

        let url = post_data
            .url_overridden_by_dest
            .filter(|url| !url.is_empty())
            .unwrap_or(post_data.url);

        Ok(Self {
            reddit_id: post_data.id,
            title: post_data.title,
            url,
            score: post_data.score,
            upvote_ratio: post_data.upvote_ratio.unwrap_or_default(),
            author: post_data.author,
            num_comments: post_data.num_comments,
            permalink: format!("{}{}", PERMALINK_BASE, post_data.permalink),
            reddit_created_at,
            thumbnail: post_data.thumbnail,
            is_video: post_data.is_video.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_data() -> RedditPostData {
        RedditPostData {
            id: "test123".to_string(),
            title: "Test Post".to_string(),
            author: "test_user".to_string(),
            url: "https://www.reddit.com/r/memes/comments/test123".to_string(),
            url_overridden_by_dest: Some("https://i.redd.it/test123.jpg".to_string()),
            permalink: "/r/memes/comments/test123/test_post/".to_string(),
            created_utc: 1640995200.0,
            score: 42,
            num_comments: 5,
            upvote_ratio: Some(0.93),
            thumbnail: None,
            is_video: None,
        }
    }

    #[test]
    fn test_api_client_creation() {
        let client = RedditApiClient::new("test-user-agent/1.0".to_string()).unwrap();
        assert_eq!(client.user_agent(), "test-user-agent/1.0");
    }

    #[test]
    fn test_post_normalization() {
        let meme = NewMeme::try_from(post_data()).unwrap();
        assert_eq!(meme.reddit_id, "test123");
        assert_eq!(meme.url, "https://i.redd.it/test123.jpg");
        assert_eq!(
            meme.permalink,
            "https://reddit.com/r/memes/comments/test123/test_post/"
        );
        assert_eq!(meme.reddit_created_at.timestamp(), 1640995200);
        assert_eq!(meme.upvote_ratio, 0.93);
        assert!(!meme.is_video);
        assert!(meme.thumbnail.is_none());
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let json = serde_json::json!({
            "id": "abc",
            "title": "No extras",
            "url": "https://v.redd.it/abc",
            "permalink": "/r/memes/comments/abc/",
            "created_utc": 1700000000.5,
            "score": 7
        });
        let data: RedditPostData = serde_json::from_value(json).unwrap();
        let meme = NewMeme::try_from(data).unwrap();
        assert_eq!(meme.url, "https://v.redd.it/abc");
        assert_eq!(meme.num_comments, 0);
        assert_eq!(meme.upvote_ratio, 0.0);
        assert!(!meme.is_video);
        assert_eq!(meme.reddit_created_at.timestamp_subsec_millis(), 500);
    }
}
