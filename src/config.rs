// src/config.rs
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::GradingConfig;
use crate::errors::{GradeError, Result};
use crate::snapshot::CellRange;

const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const DEFAULT_RESOLVER_TIMEOUT_SECS: u64 = 15;

/// Configuration for the Google Sheets resolver.
#[derive(Debug, Clone)]
pub struct GoogleSheetsConfig {
    pub api_base: String,
    /// OAuth bearer token, usually minted for a service account.
    pub access_token: Option<String>,
    /// API key; only reaches sheets shared by link.
    pub api_key: Option<String>,
}

/// Configuration for the directory-backed resolver.
#[derive(Debug, Clone)]
pub struct FileSnapshotConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub enum ResolverConfig {
    GoogleSheets(GoogleSheetsConfig),
    File(FileSnapshotConfig),
}

/// High-level application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// `None` leaves every auto-grade degraded until a backend is configured.
    pub resolver: Option<ResolverConfig>,
    pub resolver_timeout: Duration,
    pub grading: GradingConfig,
    /// TOML file of questions seeded into the database at startup.
    pub question_bank: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = var("GRADER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match var("GRADER_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| GradeError::Config(format!("GRADER_PORT '{}' is not a port", raw)))?,
            None => 8080,
        };

        let database_url = var("DATABASE_URL").unwrap_or_else(default_database_url);

        let google = GoogleSheetsConfig {
            api_base: var("GOOGLE_SHEETS_API_BASE")
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
            access_token: var("GOOGLE_SHEETS_ACCESS_TOKEN"),
            api_key: var("GOOGLE_SHEETS_API_KEY"),
        };
        let has_google_credentials = google.access_token.is_some() || google.api_key.is_some();

        let resolver = match var("SNAPSHOT_RESOLVER").map(|v| v.to_lowercase()).as_deref() {
            Some("google") => {
                if !has_google_credentials {
                    return Err(GradeError::Config(
                        "SNAPSHOT_RESOLVER=google needs GOOGLE_SHEETS_ACCESS_TOKEN or GOOGLE_SHEETS_API_KEY"
                            .to_string(),
                    ));
                }
                Some(ResolverConfig::GoogleSheets(google))
            }
            Some("file") => {
                let dir = var("SNAPSHOT_DIR").ok_or_else(|| {
                    GradeError::Config("SNAPSHOT_RESOLVER=file needs SNAPSHOT_DIR".to_string())
                })?;
                Some(ResolverConfig::File(FileSnapshotConfig { dir: PathBuf::from(dir) }))
            }
            Some("none") => None,
            Some(other) => {
                return Err(GradeError::Config(format!(
                    "Unknown SNAPSHOT_RESOLVER '{}'. Use google, file or none.",
                    other
                )));
            }
            None if has_google_credentials => Some(ResolverConfig::GoogleSheets(google)),
            None => None,
        };

        let resolver_timeout = match var("RESOLVER_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                    GradeError::Config(format!("RESOLVER_TIMEOUT_SECS '{}' is not a positive integer", raw))
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_RESOLVER_TIMEOUT_SECS),
        };

        let mut grading = GradingConfig::default();
        if let Some(raw) = var("GRADING_TOLERANCE") {
            grading.tolerance = raw
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite() && *t >= 0.0)
                .ok_or_else(|| GradeError::Config(format!("GRADING_TOLERANCE '{}' is not a ratio", raw)))?;
        }
        if let Some(raw) = var("MCQ_RANGE") {
            grading.mcq_range = CellRange::parse(&raw)?;
        }

        Ok(AppConfig {
            host,
            port,
            database_url,
            resolver,
            resolver_timeout,
            grading,
            question_bank: var("QUESTION_BANK_PATH").map(PathBuf::from),
        })
    }
}

fn default_database_url() -> String {
    let path = dirs::data_dir()
        .map(|dir| dir.join("sheet-grader").join("grading.db"))
        .unwrap_or_else(|| PathBuf::from("data/grading.db"));
    format!("sqlite:{}", path.display())
}
