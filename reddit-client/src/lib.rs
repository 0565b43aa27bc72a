pub mod api;


use api::RedditApiClient;
use async_trait::async_trait;
use memefeed_core::{AppConfig, ConfigError, CoreError, MemeSource, NewMeme, RedditApiError};
use oauth2::basic::BasicClient;
use oauth2::http::header::USER_AGENT;
use oauth2::http::HeaderValue;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, HttpRequest, TokenResponse, TokenUrl};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use url::Url;

const REDDIT_AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";

/// Tokens are treated as expired this long before Reddit says they are.
pub const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(300);

const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RedditClientConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub subreddit: String,
    pub oauth_base_url: String,
    pub public_base_url: String,
    pub token_url: String,
}

impl RedditClientConfig {
    /// Anonymous access to the public JSON listing of `subreddit`.
    pub fn new(user_agent: String, subreddit: String) -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent,
            subreddit,
            oauth_base_url: "https://oauth.reddit.com".to_string(),
            public_base_url: "https://www.reddit.com".to_string(),
            token_url: "https://www.reddit.com/api/v1/access_token".to_string(),
        }
    }

    pub fn with_credentials(mut self, client_id: String, client_secret: String) -> Self {
        self.client_id = Some(client_id);
        self.client_secret = Some(client_secret);
        self
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        let base = Self {
            client_id: None,
            client_secret: None,
            user_agent: config.reddit_user_agent.clone(),
            subreddit: config.reddit_subreddit.clone(),
            oauth_base_url: config.reddit_oauth_base_url.clone(),
            public_base_url: config.reddit_public_base_url.clone(),
            token_url: config.reddit_token_url.clone(),
        };
        match config.reddit_credentials() {
            Some((id, secret)) => base.with_credentials(id.to_string(), secret.to_string()),
            None => base,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
}

impl RedditToken {
    /// Builds a token whose expiry already has [`TOKEN_EXPIRY_MARGIN`] taken off.
    pub fn issued(access_token: String, expires_in: Duration, issued_at: SystemTime) -> Self {
        Self {
            access_token,
            expires_at: issued_at + expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN),
        }
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

enum FeedAccess {
    ClientCredentials(BasicClient),
    Anonymous,
}

/// Client for the "top of the day" listing of one subreddit.
///
/// With client credentials configured it talks to the OAuth API and keeps a
/// bearer token cached; the mutex also serializes concurrent refreshes.
/// Without credentials it reads the public `.json` listing.
pub struct RedditClient {
    config: RedditClientConfig,
    api: RedditApiClient,
    access: FeedAccess,
    token: Mutex<Option<RedditToken>>,
}

impl RedditClient {
    pub fn new(config: RedditClientConfig) -> Result<Self, CoreError> {
        for (field, value) in [
            ("REDDIT_OAUTH_BASE_URL", &config.oauth_base_url),
            ("REDDIT_PUBLIC_BASE_URL", &config.public_base_url),
        ] {
            Url::parse(value).map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                value: value.clone(),
            })?;
        }

        let access = match (&config.client_id, &config.client_secret) {
            (Some(client_id), Some(client_secret)) => {
                let auth_url = AuthUrl::new(REDDIT_AUTHORIZE_URL.to_string()).map_err(|e| {
                    CoreError::Internal {
                        message: format!("Invalid authorize URL: {e}"),
                    }
                })?;
                let token_url = TokenUrl::new(config.token_url.clone()).map_err(|_| {
                    ConfigError::InvalidValue {
                        field: "REDDIT_TOKEN_URL".to_string(),
                        value: config.token_url.clone(),
                    }
                })?;
                FeedAccess::ClientCredentials(BasicClient::new(
                    ClientId::new(client_id.clone()),
                    Some(ClientSecret::new(client_secret.clone())),
                    auth_url,
                    Some(token_url),
                ))
            }
            _ => FeedAccess::Anonymous,
        };

        let api = RedditApiClient::new(config.user_agent.clone())?;

        Ok(Self {
            config,
            api,
            access,
            token: Mutex::new(None),
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, CoreError> {
        Self::new(RedditClientConfig::from_app_config(config))
    }

    pub fn uses_oauth(&self) -> bool {
        matches!(self.access, FeedAccess::ClientCredentials(_))
    }

    pub fn subreddit(&self) -> &str {
        &self.config.subreddit
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.lock().await = Some(token);
    }

    pub async fn cached_token(&self) -> Option<RedditToken> {
        self.token.lock().await.clone()
    }

    /// Returns a valid bearer token, requesting a new one when none is
    /// cached or the cached one has expired. A failed refresh is not retried.
    async fn ensure_token(&self, oauth: &BasicClient) -> Result<String, CoreError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| !token.is_expired()) {
            return Ok(token.access_token.clone());
        }

        let token = self.request_token(oauth).await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn request_token(&self, oauth: &BasicClient) -> Result<RedditToken, CoreError> {
        debug!("Requesting Reddit access token via client credentials");
        let user_agent = self.config.user_agent.clone();
        let issued_at = SystemTime::now();

        let response = oauth
            .exchange_client_credentials()
            .request_async(move |mut request: HttpRequest| async move {
                if let Ok(value) = HeaderValue::from_str(&user_agent) {
                    request.headers.insert(USER_AGENT, value);
                }
                async_http_client(request).await
            })
            .await
            .map_err(|e| {
                error!("Failed to refresh access token: {}", e);
                CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            })?;

        let expires_in = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        info!("Successfully refreshed Reddit access token");

        Ok(RedditToken::issued(
            response.access_token().secret().clone(),
            expires_in,
            issued_at,
        ))
    }

    /// Fetches up to `limit` posts from today's top listing, highest score first.
    pub async fn fetch_top(&self, limit: u32) -> Result<Vec<NewMeme>, CoreError> {
        let subreddit = &self.config.subreddit;

        let (url, access_token) = match &self.access {
            FeedAccess::ClientCredentials(oauth) => {
                let token = self.ensure_token(oauth).await?;
                (
                    format!(
                        "{}/r/{}/top",
                        self.config.oauth_base_url.trim_end_matches('/'),
                        subreddit
                    ),
                    Some(token),
                )
            }
            FeedAccess::Anonymous => (
                format!(
                    "{}/r/{}/top.json",
                    self.config.public_base_url.trim_end_matches('/'),
                    subreddit
                ),
                None,
            ),
        };

        let listing = self
            .api
            .get_top_posts(&url, access_token.as_deref(), limit)
            .await?;

        let mut memes = listing
            .data
            .children
            .into_iter()
            .map(|child| NewMeme::try_from(child.data))
            .collect::<Result<Vec<_>, _>>()?;

        memes.sort_by(|a, b| b.score.cmp(&a.score));
        memes.truncate(limit as usize);

        info!("Successfully fetched {} memes from r/{}", memes.len(), subreddit);
        Ok(memes)
    }
}

#[async_trait]
impl MemeSource for RedditClient {
    async fn fetch_top(&self, limit: u32) -> Result<Vec<NewMeme>, CoreError> {
        RedditClient::fetch_top(self, limit).await
    }
}
