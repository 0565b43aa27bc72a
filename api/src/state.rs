use database::Database;
use memefeed_core::{MemeSource, TelegramSettings};
use std::sync::Arc;

pub struct AppState {
    pub source: Arc<dyn MemeSource>,
    pub database: Arc<Database>,
    /// Used when a report request does not bring its own credentials or mode.
    pub telegram: TelegramSettings,
}

impl AppState {
    pub fn new(
        source: Arc<dyn MemeSource>,
        database: Arc<Database>,
        telegram: TelegramSettings,
    ) -> Self {
        Self {
            source,
            database,
            telegram,
        }
    }
}
