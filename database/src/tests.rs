#[cfg(test)]
mod tests {
    use crate::Database;
    use chrono::{Duration, TimeZone, Utc};
    use memefeed_core::{CoreError, Meme, NewMeme, SortField, SortOrder};
    use std::collections::HashSet;
    use std::env;

    async fn setup_test_db() -> Database {
        let db_path = env::temp_dir().join(format!("test_memefeed_{}.db", uuid::Uuid::new_v4()));
        let db_url = format!("sqlite://{}", db_path.display());

        let db = Database::connect(&db_url, 5)
            .await
            .expect("Failed to connect to test database");
        db.init_schema().await.expect("Failed to create schema");

        db
    }

    fn new_meme(reddit_id: &str, score: i64, num_comments: i64, hours_ago: i64) -> NewMeme {
        NewMeme {
            reddit_id: reddit_id.to_string(),
            title: format!("Meme {reddit_id}"),
            url: format!("https://i.redd.it/{reddit_id}.jpg"),
            score,
            upvote_ratio: 0.9,
            author: "poster".to_string(),
            num_comments,
            permalink: format!("https://reddit.com/r/memes/comments/{reddit_id}/"),
            reddit_created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
                - Duration::hours(hours_ago),
            thumbnail: Some("https://b.thumbs.redditmedia.com/t.jpg".to_string()),
            is_video: false,
        }
    }

    /// Twelve posts with deliberate ties on every sort column.
    fn fixture() -> Vec<NewMeme> {
        (0..12)
            .map(|i| new_meme(&format!("p{i:02}"), 100 * (i % 4), i % 3, i % 5))
            .collect()
    }

    async fn collect_all_pages(
        db: &Database,
        limit: u32,
        field: SortField,
        order: SortOrder,
    ) -> Vec<Meme> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = db
                .list_page(cursor.as_deref(), limit, field, order)
                .await
                .expect("Failed to list page");
            assert!(page.items.len() <= limit as usize);
            items.extend(page.items);
            if !page.has_next {
                assert!(page.next_cursor.is_none());
                break;
            }
            cursor = page.next_cursor;
            assert!(cursor.is_some());
        }
        items
    }

    fn sort_key(meme: &Meme, field: SortField) -> String {
        match field {
            SortField::CreatedAt => format!("{:020}", meme.created_at.timestamp_nanos_opt().unwrap()),
            SortField::RedditCreatedAt => {
                format!("{:020}", meme.reddit_created_at.timestamp_nanos_opt().unwrap())
            }
            SortField::Score => format!("{:012}", meme.score),
            SortField::NumComments => format!("{:012}", meme.num_comments),
        }
    }

    #[tokio::test]
    async fn test_database_connection_and_schema() {
        let db = setup_test_db().await;
        db.ping().await.expect("Ping failed");
        // Creating the schema twice is harmless.
        db.init_schema().await.expect("Second schema init failed");
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let db = setup_test_db().await;

        let first = new_meme("abc", 10, 1, 0);
        db.upsert_memes(&[first.clone()]).await.unwrap();
        let stored = db.get_by_reddit_id("abc").await.unwrap().unwrap();

        let mut second = first.clone();
        second.score = 999;
        second.num_comments = 77;
        second.title = "Edited".to_string();
        second.thumbnail = None;
        second.is_video = true;
        db.upsert_memes(&[second]).await.unwrap();

        assert_eq!(db.count().await.unwrap(), 1);
        let updated = db.get_by_reddit_id("abc").await.unwrap().unwrap();
        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.score, 999);
        assert_eq!(updated.num_comments, 77);
        assert_eq!(updated.title, "Edited");
        assert_eq!(updated.thumbnail, None);
        assert!(updated.is_video);
        assert_eq!(updated.created_at, stored.created_at);
        assert_eq!(updated.reddit_created_at, first.reddit_created_at);
    }

    #[tokio::test]
    async fn test_upsert_batch_with_duplicates() {
        let db = setup_test_db().await;
        let mut later = new_meme("dup", 5, 0, 0);
        later.score = 50;
        let batch = vec![new_meme("dup", 5, 0, 0), new_meme("other", 1, 0, 0), later];

        assert_eq!(db.upsert_memes(&batch).await.unwrap(), 3);
        assert_eq!(db.count().await.unwrap(), 2);
        assert_eq!(db.get_by_reddit_id("dup").await.unwrap().unwrap().score, 50);
    }

    #[tokio::test]
    async fn test_upsert_batch_is_all_or_nothing() {
        let db = setup_test_db().await;
        sqlx::query(
            "CREATE TRIGGER reject_bad_meme BEFORE INSERT ON memes \
             WHEN NEW.reddit_id = 'bad' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let result = db
            .upsert_memes(&[new_meme("ok1", 10, 0, 0), new_meme("bad", 5, 0, 0)])
            .await;

        assert!(matches!(result, Err(CoreError::Database(_))));
        assert_eq!(db.count().await.unwrap(), 0);
        assert!(db.get_by_reddit_id("ok1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pagination_visits_every_row_once_in_order() {
        let db = setup_test_db().await;
        db.upsert_memes(&fixture()).await.unwrap();

        for field in SortField::ALL {
            for order in [SortOrder::Desc, SortOrder::Asc] {
                let items = collect_all_pages(&db, 5, field, order).await;
                assert_eq!(items.len(), 12, "{field} {order:?}");

                let ids: HashSet<i64> = items.iter().map(|m| m.id).collect();
                assert_eq!(ids.len(), 12, "duplicate rows for {field} {order:?}");

                let keys: Vec<String> = items.iter().map(|m| sort_key(m, field)).collect();
                let mut sorted = keys.clone();
                sorted.sort();
                if order == SortOrder::Desc {
                    sorted.reverse();
                }
                assert_eq!(keys, sorted, "rows out of order for {field} {order:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_exact_page_boundary_has_no_next() {
        let db = setup_test_db().await;
        db.upsert_memes(&fixture()[..4]).await.unwrap();

        let page = db
            .list_page(None, 4, SortField::Score, SortOrder::Desc)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 4);
        assert!(!page.has_next);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_first_page_is_highest_scores() {
        let db = setup_test_db().await;
        db.upsert_memes(&[
            new_meme("low", 1, 0, 0),
            new_meme("high", 500, 0, 0),
            new_meme("mid", 50, 0, 0),
        ])
        .await
        .unwrap();

        let page = db
            .list_page(None, 2, SortField::Score, SortOrder::Desc)
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|m| m.reddit_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
        assert!(page.has_next);

        let next = db
            .list_page(page.next_cursor.as_deref(), 2, SortField::Score, SortOrder::Desc)
            .await
            .unwrap();
        assert_eq!(next.items.len(), 1);
        assert_eq!(next.items[0].reddit_id, "low");
        assert!(!next.has_next);
    }

    #[tokio::test]
    async fn test_malformed_cursor_is_invalid_input() {
        let db = setup_test_db().await;
        db.upsert_memes(&fixture()).await.unwrap();

        let result = db
            .list_page(Some("definitely-not-a-cursor"), 5, SortField::Score, SortOrder::Desc)
            .await;
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));

        // A cursor for another sort field does not carry the needed key.
        let page = db
            .list_page(None, 5, SortField::Score, SortOrder::Desc)
            .await
            .unwrap();
        let result = db
            .list_page(
                page.next_cursor.as_deref(),
                5,
                SortField::NumComments,
                SortOrder::Desc,
            )
            .await;
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
    }
}
