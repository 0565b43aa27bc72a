use crate::{CoreError, NewMeme};
use async_trait::async_trait;

/// Something that can produce the current top posts of the feed.
#[async_trait]
pub trait MemeSource: Send + Sync {
    /// Returns up to `limit` posts ranked by score, highest first.
    async fn fetch_top(&self, limit: u32) -> Result<Vec<NewMeme>, CoreError>;
}
