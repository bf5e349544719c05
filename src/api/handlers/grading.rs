// src/api/handlers/grading.rs
use actix_web::{web, HttpResponse, Result};
use serde_json::json;
use crate::api::AppState;
use crate::database;
use crate::models::{error_response, ApiError, GradeRequest, ManualScoreRequest, ScoreUpdate};
use crate::question::Question;
use crate::runner;

/// POST /api/v1/grade - Grade a snapshot against a question without storing anything
pub async fn grade(
    state: web::Data<AppState>,
    req: web::Json<GradeRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let question = Question::from(req.question);
    let workbook = req.snapshot.into_workbook();

    let result = state.grader.engine().grade_response(&question, &workbook);
    Ok(HttpResponse::Ok().json(result))
}

/// POST /api/v1/responses/{id}/regrade - Fetch the sheet again and overwrite the auto score
pub async fn regrade_response(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let response_id = path.into_inner();

    match runner::regrade_response(&state.grader, &state.db_pool, response_id).await {
        Ok((outcome, final_score)) => Ok(HttpResponse::Ok().json(json!({
            "outcome": outcome,
            "final_score": final_score,
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// PUT /api/v1/responses/{id}/manual-score - Set or clear a reviewer's score
pub async fn set_manual_score(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<ManualScoreRequest>,
) -> Result<HttpResponse> {
    let response_id = path.into_inner();
    let req = req.into_inner();

    if let Some(score) = req.manual_score {
        if !score.is_finite() || score < 0.0 {
            return Ok(HttpResponse::BadRequest().json(ApiError::new(
                "manual_score must be a non-negative number",
            )));
        }
    }

    let pool = state.db_pool.as_ref();
    let final_score = match database::set_manual_score(
        pool,
        response_id,
        req.manual_score,
        req.reviewer_notes.as_deref(),
    )
    .await
    {
        Ok(total) => total,
        Err(e) => return Ok(error_response(&e)),
    };

    match database::get_response(pool, response_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ScoreUpdate { response, final_score })),
        Err(e) => Ok(error_response(&e)),
    }
}
