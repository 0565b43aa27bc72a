//! Scheduled meme reports.
//!
//! A cron job fires at minute 0 of each configured UTC hour, fetches the
//! current top posts, stores them and delivers a report to Telegram. A failed
//! run is logged and the next slot fires as usual.

use database::Database;
use memefeed_core::{
    AppConfig, ConfigError, CoreError, ErrorExt, ErrorReporter, MemeSource, TelegramSettings,
    DEFAULT_REPORT_LIMIT,
};
use std::sync::Arc;
use telegram_notifier::{TelegramCredentials, TelegramNotifier};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, warn};

#[cfg(test)]
mod tests;

pub const DEFAULT_SCHEDULE_HOURS: [u32; 3] = [0, 8, 16];

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub hours: Vec<u32>,
    pub report_limit: u32,
    pub telegram: TelegramSettings,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hours: DEFAULT_SCHEDULE_HOURS.to_vec(),
            report_limit: DEFAULT_REPORT_LIMIT,
            telegram: TelegramSettings::default(),
        }
    }
}

impl ScheduleConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            hours: config.schedule_hours.clone(),
            report_limit: config.report_limit,
            telegram: config.telegram_settings(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No Telegram credentials were configured, so nothing was fetched.
    Skipped,
    Delivered { count: usize },
}

/// Cron expression (with seconds) firing at minute 0 of each of `hours`.
/// Hours outside 0..=23 are dropped; `None` when none remain.
pub fn cron_expression(hours: &[u32]) -> Option<String> {
    let mut hours: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
    hours.sort_unstable();
    hours.dedup();
    if hours.is_empty() {
        return None;
    }

    let hours: Vec<String> = hours.iter().map(u32::to_string).collect();
    Some(format!("0 0 {} * * *", hours.join(",")))
}

fn scheduler_error(context: &str, e: JobSchedulerError) -> CoreError {
    CoreError::Internal {
        message: format!("{}: {}", context, e),
    }
}

pub struct BackgroundService {
    source: Arc<dyn MemeSource>,
    database: Arc<Database>,
    config: ScheduleConfig,
    reporter: ErrorReporter,
    scheduler: Mutex<Option<JobScheduler>>,
}

impl BackgroundService {
    pub fn new(
        source: Arc<dyn MemeSource>,
        database: Arc<Database>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            source,
            database,
            config,
            reporter: ErrorReporter::new(),
            scheduler: Mutex::new(None),
        }
    }

    /// Registers the report job and starts the scheduler on the current
    /// runtime. Calling it while the scheduler is running does nothing.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_some() {
            warn!("Scheduled meme reports are already running");
            return Ok(());
        }

        let expression = cron_expression(&self.config.hours).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "SCHEDULE_HOURS".to_string(),
                value: format!("{:?}", self.config.hours),
            }
        })?;

        let jobs = JobScheduler::new()
            .await
            .map_err(|e| scheduler_error("Failed to create scheduler", e))?;

        let service = Arc::clone(self);
        let job = Job::new_async(expression.as_str(), move |_id, _jobs| {
            let service = Arc::clone(&service);
            Box::pin(async move {
                // Failures are already logged by run_once.
                let _ = service.run_once().await;
            })
        })
        .map_err(|e| scheduler_error("Failed to create report job", e))?;

        jobs.add(job)
            .await
            .map_err(|e| scheduler_error("Failed to add report job", e))?;
        jobs.start()
            .await
            .map_err(|e| scheduler_error("Failed to start scheduler", e))?;

        *scheduler = Some(jobs);
        info!("Started scheduled meme reports (cron: {}, UTC)", expression);
        Ok(())
    }

    pub async fn stop(&self) {
        let scheduler = self.scheduler.lock().await.take();
        if let Some(mut jobs) = scheduler {
            match jobs.shutdown().await {
                Ok(()) => info!("Stopped scheduled meme reports"),
                Err(e) => error!("Failed to shut down scheduler: {}", e),
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.lock().await.is_some()
    }

    /// One scheduled report: fetch, store, deliver.
    ///
    /// A storage failure is logged and the report still goes out.
    pub async fn run_once(&self) -> Result<RunOutcome, CoreError> {
        let telegram = &self.config.telegram;
        let credentials = match TelegramCredentials::resolve(
            None,
            None,
            telegram.bot_token.as_deref(),
            telegram.chat_id.as_deref(),
        ) {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("Missing Telegram credentials in environment variables; skipping scheduled report");
                e.log_warn();
                return Ok(RunOutcome::Skipped);
            }
        };

        let result = self.deliver(credentials).await;
        match &result {
            Ok(count) => info!("Successfully sent scheduled meme report ({} memes)", count),
            Err(e) => {
                error!("Error in scheduled meme report");
                self.reporter.report_error(e);
            }
        }
        result.map(|count| RunOutcome::Delivered { count })
    }

    async fn deliver(&self, credentials: TelegramCredentials) -> Result<usize, CoreError> {
        let memes = self.source.fetch_top(self.config.report_limit).await?;

        if let Err(e) = self.database.upsert_memes(&memes).await {
            warn!("Could not store memes for the scheduled report");
            self.reporter.report_error(&e);
        }

        let notifier = TelegramNotifier::new(credentials)?
            .with_api_base(self.config.telegram.api_base.clone())
            .with_mode(self.config.telegram.mode);
        notifier.send_report(&memes).await?;

        Ok(memes.len())
    }
}
