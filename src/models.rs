// src/models.rs
use crate::database::{ResponseRecord, SessionRecord};
use crate::errors::GradeError;
use crate::question::QuestionRecord;
use crate::snapshot::{SheetSnapshot, WorkbookSnapshot};
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

/// Stateless grading: the caller supplies both the question and the snapshot.
#[derive(Deserialize, Clone, Debug)]
pub struct GradeRequest {
    pub question: QuestionRecord,
    pub snapshot: SnapshotInput,
}

/// Either a full workbook or the cells of a single sheet.
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum SnapshotInput {
    Workbook(WorkbookSnapshot),
    Sheet(SheetSnapshot),
}

impl SnapshotInput {
    pub fn into_workbook(self) -> WorkbookSnapshot {
        match self {
            SnapshotInput::Workbook(workbook) => workbook,
            SnapshotInput::Sheet(cells) => WorkbookSnapshot::single("Sheet1", cells),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct CreateSessionRequest {
    pub candidate_name: String,
    pub candidate_email: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AddResponseRequest {
    pub question_id: String,
    pub sheet_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct UpdateAnswerKeyRequest {
    pub answer_key: serde_json::Value,
    pub points: Option<i64>,
}

/// `manual_score: null` clears a previous manual score.
#[derive(Deserialize, Clone, Debug)]
pub struct ManualScoreRequest {
    pub manual_score: Option<f64>,
    pub reviewer_notes: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: SessionRecord,
    pub responses: Vec<ResponseRecord>,
}

#[derive(Serialize, Clone, Debug)]
pub struct ScoreUpdate {
    pub response: ResponseRecord,
    pub final_score: f64,
}

#[derive(Serialize, Clone, Debug)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}

/// Maps a crate error onto an HTTP response with a JSON `{error}` body.
pub fn error_response(err: &GradeError) -> HttpResponse {
    let body = ApiError::new(err.to_string());
    match err {
        GradeError::NotFound { .. } => HttpResponse::NotFound().json(body),
        GradeError::QuestionLocked(_) => HttpResponse::Conflict().json(body),
        GradeError::InvalidQuestion(_)
        | GradeError::MalformedAnswerKey(_)
        | GradeError::UnsupportedQuestionType
        | GradeError::InvalidSpreadsheetReference(_)
        | GradeError::JsonParse(_) => HttpResponse::BadRequest().json(body),
        _ => {
            log::error!("Request failed: {}", err);
            HttpResponse::InternalServerError().json(body)
        }
    }
}
