// src/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GradeError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("API request failed with status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Unexpected response structure: {0}")]
    UnexpectedResponse(String),

    #[error("Spreadsheet backend not configured")]
    ResolverUnavailable,

    #[error("Snapshot resolver '{resolver}' timed out after {timeout:?}")]
    ResolverTimeout { resolver: String, timeout: std::time::Duration },

    #[error("Invalid sheet URL: {0}")]
    InvalidSpreadsheetReference(String),

    #[error("Could not fetch sheet data")]
    EmptyWorkbook,

    #[error("Malformed answer key: {0}")]
    MalformedAnswerKey(String),

    #[error("Unknown question type")]
    UnsupportedQuestionType,

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Question '{0}' already has responses; its answer key is frozen")]
    QuestionLocked(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GradeError>;
