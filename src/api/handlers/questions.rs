// src/api/handlers/questions.rs
use actix_web::{web, HttpResponse, Result};
use crate::api::AppState;
use crate::database;
use crate::errors::GradeError;
use crate::models::{error_response, UpdateAnswerKeyRequest};
use crate::question::{AnswerKey, QuestionRecord};

/// POST /api/v1/questions - Author a question; the answer key is validated strictly
pub async fn create_question(
    state: web::Data<AppState>,
    req: web::Json<QuestionRecord>,
) -> Result<HttpResponse> {
    let question = match req.into_inner().into_validated() {
        Ok(question) => question,
        Err(e) => return Ok(error_response(&e)),
    };

    match database::insert_question(&state.db_pool, &question).await {
        Ok(()) => {
            log::info!("📝 Created {} question {}", question.question_type, question.id);
            Ok(HttpResponse::Created().json(question))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// GET /api/v1/questions/{id}
pub async fn get_question(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match database::get_question(&state.db_pool, &path.into_inner()).await {
        Ok(question) => Ok(HttpResponse::Ok().json(question)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// PUT /api/v1/questions/{id}/answer-key - Refused once candidates have responded
pub async fn update_answer_key(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<UpdateAnswerKeyRequest>,
) -> Result<HttpResponse> {
    let question_id = path.into_inner();
    let req = req.into_inner();
    let pool = state.db_pool.as_ref();

    let existing = match database::get_question(pool, &question_id).await {
        Ok(question) => question,
        Err(e) => return Ok(error_response(&e)),
    };

    let points = match req.points {
        None => None,
        Some(p) if p > 0 && p <= u32::MAX as i64 => Some(p as u32),
        Some(p) => {
            return Ok(error_response(&GradeError::InvalidQuestion(format!(
                "points must be a positive integer, got {}",
                p
            ))));
        }
    };

    let answer_key = match AnswerKey::parse_strict(existing.question_type, &req.answer_key) {
        Ok(key) => key,
        Err(e) => return Ok(error_response(&e)),
    };

    match database::update_answer_key(pool, &question_id, answer_key, points).await {
        Ok(question) => Ok(HttpResponse::Ok().json(question)),
        Err(e) => Ok(error_response(&e)),
    }
}
