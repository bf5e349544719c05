// src/api/state.rs
use crate::config::AppConfig;
use crate::runner::Grader;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub grader: Grader,
    pub db_pool: Arc<SqlitePool>,
}

impl AppState {
    /// Builds the shared HTTP client and the resolver it backs.
    pub fn new(config: AppConfig, db_pool: SqlitePool) -> Self {
        let client = reqwest::Client::new();
        let grader = Grader::from_config(&config, &client);

        match grader.resolver_name() {
            Some(name) => log::info!("📡 Snapshot resolver: {}", name),
            None => log::warn!("⚠️  No snapshot resolver configured; auto-grades will be degraded"),
        }

        Self::with_grader(config, grader, db_pool)
    }

    pub fn with_grader(config: AppConfig, grader: Grader, db_pool: SqlitePool) -> Self {
        Self {
            config: Arc::new(config),
            grader,
            db_pool: Arc::new(db_pool),
        }
    }
}
