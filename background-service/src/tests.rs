#[cfg(test)]
mod tests {
    use crate::{cron_expression, BackgroundService, RunOutcome, ScheduleConfig};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use database::Database;
    use memefeed_core::{ConfigError, CoreError, MemeSource, NewMeme, RedditApiError, TelegramSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeSource {
        memes: Vec<NewMeme>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn with(memes: Vec<NewMeme>) -> Arc<Self> {
            Arc::new(Self {
                memes,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                memes: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MemeSource for FakeSource {
        async fn fetch_top(&self, limit: u32) -> Result<Vec<NewMeme>, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RedditApiError::ServerError { status_code: 503 }.into());
            }
            Ok(self.memes.iter().take(limit as usize).cloned().collect())
        }
    }

    fn meme(id: &str, score: i64) -> NewMeme {
        NewMeme {
            reddit_id: id.to_string(),
            title: format!("Meme {id}"),
            url: format!("https://i.redd.it/{id}.png"),
            score,
            upvote_ratio: 0.95,
            author: "poster".to_string(),
            num_comments: 3,
            permalink: format!("https://reddit.com/r/memes/comments/{id}/"),
            reddit_created_at: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
            thumbnail: None,
            is_video: false,
        }
    }

    async fn setup_test_db() -> Arc<Database> {
        let db_path =
            std::env::temp_dir().join(format!("test_scheduler_{}.db", uuid::Uuid::new_v4()));
        let db = Database::connect(&format!("sqlite://{}", db_path.display()), 2)
            .await
            .expect("Failed to connect to test database");
        db.init_schema().await.expect("Failed to create schema");
        Arc::new(db)
    }

    fn config_for(server: &MockServer) -> ScheduleConfig {
        ScheduleConfig {
            report_limit: 2,
            telegram: TelegramSettings {
                bot_token: Some("42:TOKEN".to_string()),
                chat_id: Some("1001".to_string()),
                api_base: server.uri(),
                ..TelegramSettings::default()
            },
            ..ScheduleConfig::default()
        }
    }

    async fn telegram_ok(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/bot42:TOKEN/sendMessage"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_cron_expression() {
        assert_eq!(
            cron_expression(&[0, 8, 16]).as_deref(),
            Some("0 0 0,8,16 * * *")
        );
        // Order and duplicates in the configuration do not matter.
        assert_eq!(
            cron_expression(&[16, 4, 16]).as_deref(),
            Some("0 0 4,16 * * *")
        );
        assert_eq!(cron_expression(&[23, 99]).as_deref(), Some("0 0 23 * * *"));
    }

    #[test]
    fn test_cron_expression_without_valid_hours() {
        assert_eq!(cron_expression(&[]), None);
        assert_eq!(cron_expression(&[24, 99]), None);
    }

    #[tokio::test]
    async fn test_run_once_skips_without_credentials() {
        let source = FakeSource::with(vec![meme("a", 10)]);
        let db = setup_test_db().await;
        let service = BackgroundService::new(source.clone(), db.clone(), ScheduleConfig::default());

        let outcome = service.run_once().await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_once_stores_and_delivers() {
        let server = MockServer::start().await;
        telegram_ok(&server, 1).await;

        let source = FakeSource::with(vec![meme("a", 30), meme("b", 20), meme("c", 10)]);
        let db = setup_test_db().await;
        let service = BackgroundService::new(source.clone(), db.clone(), config_for(&server));

        let outcome = service.run_once().await.unwrap();
        assert_eq!(outcome, RunOutcome::Delivered { count: 2 });
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(db.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_still_sends_report() {
        let server = MockServer::start().await;
        telegram_ok(&server, 1).await;

        let db = setup_test_db().await;
        db.pool().close().await;
        let service = BackgroundService::new(
            FakeSource::with(vec![meme("a", 30)]),
            db,
            config_for(&server),
        );

        let outcome = service.run_once().await.unwrap();
        assert_eq!(outcome, RunOutcome::Delivered { count: 1 });
    }

    #[tokio::test]
    async fn test_fetch_failure_sends_nothing() {
        let server = MockServer::start().await;
        telegram_ok(&server, 0).await;

        let service = BackgroundService::new(
            FakeSource::failing(),
            setup_test_db().await,
            config_for(&server),
        );

        assert!(service.run_once().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_stop() {
        let service = Arc::new(BackgroundService::new(
            FakeSource::with(Vec::new()),
            setup_test_db().await,
            ScheduleConfig::default(),
        ));
        assert!(!service.is_running().await);

        service.start().await.unwrap();
        assert!(service.is_running().await);
        // A second start keeps the existing scheduler.
        service.start().await.unwrap();
        assert!(service.is_running().await);

        service.stop().await;
        assert!(!service.is_running().await);
        // Stopping twice is harmless.
        service.stop().await;
        assert!(!service.is_running().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_rejects_empty_schedule() {
        let service = Arc::new(BackgroundService::new(
            FakeSource::with(Vec::new()),
            setup_test_db().await,
            ScheduleConfig {
                hours: vec![24],
                ..ScheduleConfig::default()
            },
        ));

        let result = service.start().await;
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { .. }))
        ));
        assert!(!service.is_running().await);
    }
}
