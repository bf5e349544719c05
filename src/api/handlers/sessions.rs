// src/api/handlers/sessions.rs
use actix_web::{web, HttpResponse, Result};
use crate::api::AppState;
use crate::database;
use crate::models::{error_response, AddResponseRequest, ApiError, CreateSessionRequest, SessionDetail};
use crate::runner;

/// POST /api/v1/sessions - Start an assessment session for a candidate
pub async fn create_session(
    state: web::Data<AppState>,
    req: web::Json<CreateSessionRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    if req.candidate_email.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(ApiError::new("candidate_email is required")));
    }

    match database::create_session(&state.db_pool, req.candidate_name.trim(), req.candidate_email.trim()).await {
        Ok(session) => Ok(HttpResponse::Created().json(session)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// GET /api/v1/sessions/{id} - Session with every response and the final score
pub async fn get_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    let pool = state.db_pool.as_ref();

    let session = match database::get_session(pool, &session_id).await {
        Ok(session) => session,
        Err(e) => return Ok(error_response(&e)),
    };

    match database::list_responses(pool, &session_id).await {
        Ok(responses) => Ok(HttpResponse::Ok().json(SessionDetail { session, responses })),
        Err(e) => Ok(error_response(&e)),
    }
}

/// POST /api/v1/sessions/{id}/responses - Link a candidate's sheet to a question
pub async fn add_response(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<AddResponseRequest>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    let req = req.into_inner();

    match database::add_response(&state.db_pool, &session_id, &req.question_id, req.sheet_url.trim()).await {
        Ok(response) => Ok(HttpResponse::Created().json(response)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// POST /api/v1/sessions/{id}/submit - Auto-grade every response and close the session
pub async fn submit_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    let pool = state.db_pool.as_ref();

    let summary = match runner::grade_session(&state.grader, pool, &session_id).await {
        Ok(summary) => summary,
        Err(e) => return Ok(error_response(&e)),
    };

    if let Err(e) = database::complete_session(pool, &session_id).await {
        return Ok(error_response(&e));
    }

    Ok(HttpResponse::Ok().json(summary))
}
