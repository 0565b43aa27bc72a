use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

/// A post as normalized from the feed, before it has been stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeme {
    pub reddit_id: String,
    pub title: String,
    pub url: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub author: String,
    pub num_comments: i64,
    pub permalink: String,
    pub reddit_created_at: DateTime<Utc>,
    pub thumbnail: Option<String>,
    pub is_video: bool,
}

impl NewMeme {
    /// True when the post links directly to a still image or gif.
    pub fn is_image(&self) -> bool {
        is_image_url(&self.url)
    }
}

pub fn is_image_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let lower = path.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// A stored row of the `memes` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Meme {
    pub id: i64,
    pub reddit_id: String,
    pub title: String,
    pub url: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub created_at: DateTime<Utc>,
    pub reddit_created_at: DateTime<Utc>,
    pub author: String,
    pub num_comments: i64,
    pub permalink: String,
    pub thumbnail: Option<String>,
    pub is_video: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    Score,
    RedditCreatedAt,
    NumComments,
}

impl SortField {
    pub const ALL: [SortField; 4] = [
        SortField::CreatedAt,
        SortField::Score,
        SortField::RedditCreatedAt,
        SortField::NumComments,
    ];

    /// Column name; only ever produced from this allow-list.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Score => "score",
            SortField::RedditCreatedAt => "reddit_created_at",
            SortField::NumComments => "num_comments",
        }
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(self, SortField::CreatedAt | SortField::RedditCreatedAt)
    }
}

impl Default for SortField {
    fn default() -> Self {
        SortField::CreatedAt
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| CoreError::invalid_input("Invalid sort field"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Comparison that selects rows strictly after a boundary in this order.
    pub fn comparison(&self) -> &'static str {
        match self {
            SortOrder::Asc => ">",
            SortOrder::Desc => "<",
        }
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

impl FromStr for SortOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(CoreError::invalid_input("Invalid sort order")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_next: bool,
}

/// How a report is delivered to the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One combined text message.
    Digest,
    /// One message per post, images sent as photos.
    PerPost,
}

impl Default for DeliveryMode {
    fn default() -> Self {
        DeliveryMode::Digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_allow_list() {
        assert_eq!("score".parse::<SortField>().unwrap(), SortField::Score);
        assert_eq!(
            "reddit_created_at".parse::<SortField>().unwrap(),
            SortField::RedditCreatedAt
        );
        assert!("id; DROP TABLE memes".parse::<SortField>().is_err());
        assert!("title".parse::<SortField>().is_err());
        assert!(matches!(
            "ups".parse::<SortField>(),
            Err(CoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("sideways".parse::<SortOrder>().is_err());
        assert_eq!(SortOrder::Desc.comparison(), "<");
        assert_eq!(SortOrder::Asc.comparison(), ">");
    }

    #[test]
    fn test_image_url_detection() {
        assert!(is_image_url("https://i.redd.it/abc.jpg"));
        assert!(is_image_url("https://i.imgur.com/abc.PNG"));
        assert!(is_image_url("https://i.redd.it/abc.gif?width=640"));
        assert!(!is_image_url("https://v.redd.it/abc"));
        assert!(!is_image_url("https://reddit.com/gallery/abc"));
    }

    #[test]
    fn test_delivery_mode_serde() {
        let mode: DeliveryMode = serde_json::from_str("\"per_post\"").unwrap();
        assert_eq!(mode, DeliveryMode::PerPost);
        assert_eq!(serde_json::to_string(&DeliveryMode::Digest).unwrap(), "\"digest\"");
    }
}
