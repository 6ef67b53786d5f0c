use crate::{
    config::Config,
    services::{LedgerService, UsageReporter, UsageService},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub ledger_service: Arc<LedgerService>,
    pub usage_service: Arc<UsageService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database
        let db = Arc::new(sea_orm::Database::connect(&config.database.url).await?);

        // Initialize services
        let reporter = Arc::new(UsageReporter::new(&config.reporter));
        let ledger_service = Arc::new(LedgerService::new(db.clone(), reporter));
        let usage_service = Arc::new(UsageService::new(db.clone()));

        Ok(Self {
            db,
            ledger_service,
            usage_service,
            config: Arc::new(config),
        })
    }
}
