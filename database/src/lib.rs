pub mod cursor;

#[cfg(test)]
mod tests;

pub use cursor::{Cursor, SortValue};

use chrono::Utc;
use memefeed_core::{
    CoreError, DatabaseError, Meme, NewMeme, Page, SortField, SortOrder,
};
use sqlx::query::QueryAs;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

const MEME_COLUMNS: &str = "id, reddit_id, title, url, score, upvote_ratio, created_at, \
    reddit_created_at, author, num_comments, permalink, thumbnail, is_video";

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS memes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        reddit_id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        url TEXT NOT NULL,
        score INTEGER NOT NULL,
        upvote_ratio REAL NOT NULL,
        created_at TEXT NOT NULL,
        reddit_created_at TEXT NOT NULL,
        author TEXT NOT NULL,
        num_comments INTEGER NOT NULL,
        permalink TEXT NOT NULL,
        thumbnail TEXT,
        is_video BOOLEAN NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_memes_created_at ON memes (created_at, id)",
    "CREATE INDEX IF NOT EXISTS idx_memes_score ON memes (score, id)",
    "CREATE INDEX IF NOT EXISTS idx_memes_reddit_created_at ON memes (reddit_created_at, id)",
    "CREATE INDEX IF NOT EXISTS idx_memes_num_comments ON memes (num_comments, id)",
];

const UPSERT_MEME: &str = r#"
    INSERT INTO memes (
        reddit_id, title, url, score, upvote_ratio, created_at, reddit_created_at,
        author, num_comments, permalink, thumbnail, is_video
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(reddit_id) DO UPDATE SET
        title = excluded.title,
        url = excluded.url,
        score = excluded.score,
        upvote_ratio = excluded.upvote_ratio,
        reddit_created_at = excluded.reddit_created_at,
        author = excluded.author,
        num_comments = excluded.num_comments,
        permalink = excluded.permalink,
        thumbnail = excluded.thumbnail,
        is_video = excluded.is_video
"#;

type MemeQuery<'q> = QueryAs<'q, Sqlite, Meme, SqliteArguments<'q>>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens a bounded pool; the database file is created if missing.
    pub async fn connect(connection_string: &str, max_connections: u32) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                DatabaseError::ConnectionFailed {
                    reason: e.to_string(),
                }
            })?;

        info!("Connected to database (max {} connections)", max_connections);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the `memes` table and its indexes when they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), CoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DatabaseError::SchemaFailed {
                    reason: e.to_string(),
                })?;
        }
        debug!("Database schema is ready");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), CoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Inserts new posts and overwrites every mutable field of known ones,
    /// all within one transaction. `created_at` keeps its first-insert value.
    pub async fn upsert_memes(&self, memes: &[NewMeme]) -> Result<usize, CoreError> {
        let mut tx = self.pool.begin().await?;
        let ingested_at = Utc::now();

        for meme in memes {
            sqlx::query(UPSERT_MEME)
                .bind(&meme.reddit_id)
                .bind(&meme.title)
                .bind(&meme.url)
                .bind(meme.score)
                .bind(meme.upvote_ratio)
                .bind(ingested_at)
                .bind(meme.reddit_created_at)
                .bind(&meme.author)
                .bind(meme.num_comments)
                .bind(&meme.permalink)
                .bind(&meme.thumbnail)
                .bind(meme.is_video)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await.map_err(|e| DatabaseError::TransactionFailed {
            reason: e.to_string(),
        })?;

        info!("Stored {} memes", memes.len());
        Ok(memes.len())
    }

    pub async fn get_by_reddit_id(&self, reddit_id: &str) -> Result<Option<Meme>, CoreError> {
        let sql = format!("SELECT {MEME_COLUMNS} FROM memes WHERE reddit_id = ?");
        let meme = sqlx::query_as::<_, Meme>(&sql)
            .bind(reddit_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(meme)
    }

    pub async fn count(&self) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// One page of stored memes ordered by `sort_field`, resuming after `cursor`.
    ///
    /// Fetches `limit + 1` rows to learn whether another page exists; the
    /// extra row is dropped and the last kept row becomes the next cursor.
    pub async fn list_page(
        &self,
        cursor: Option<&str>,
        limit: u32,
        sort_field: SortField,
        order: SortOrder,
    ) -> Result<Page<Meme>, CoreError> {
        let boundary = cursor
            .filter(|token| !token.trim().is_empty())
            .map(|token| Cursor::decode(token, sort_field))
            .transpose()?;

        let column = sort_field.as_str();
        let cmp = order.comparison();
        let direction = order.as_sql();

        let mut sql = format!("SELECT {MEME_COLUMNS} FROM memes");
        match &boundary {
            Some(Cursor { id: Some(_), .. }) => {
                sql.push_str(&format!(
                    " WHERE ({column} {cmp} ?) OR ({column} = ? AND id {cmp} ?)"
                ));
            }
            Some(Cursor { id: None, .. }) => {
                sql.push_str(&format!(" WHERE {column} {cmp} ?"));
            }
            None => {}
        }
        sql.push_str(&format!(
            " ORDER BY {column} {direction}, id {direction} LIMIT ?"
        ));

        let mut query = sqlx::query_as::<_, Meme>(&sql);
        if let Some(boundary) = &boundary {
            query = bind_sort_value(query, &boundary.value);
            if let Some(id) = boundary.id {
                query = bind_sort_value(query, &boundary.value).bind(id);
            }
        }
        query = query.bind(i64::from(limit) + 1);

        let mut items = query.fetch_all(&self.pool).await?;

        let has_next = items.len() > limit as usize;
        items.truncate(limit as usize);

        let next_cursor = if has_next {
            items
                .last()
                .map(|last| Cursor::after(last, sort_field).encode())
        } else {
            None
        };

        debug!(
            "Listed {} memes by {} {} (has_next: {})",
            items.len(),
            column,
            direction,
            has_next
        );

        Ok(Page {
            items,
            next_cursor,
            has_next,
        })
    }
}

fn bind_sort_value<'q>(query: MemeQuery<'q>, value: &SortValue) -> MemeQuery<'q> {
    match value {
        SortValue::Integer(value) => query.bind(*value),
        SortValue::Timestamp(value) => query.bind(*value),
    }
}
