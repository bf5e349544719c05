// src/database.rs
use crate::engine::GradeResult;
use crate::errors::{GradeError, Result};
use crate::question::{AnswerKey, Question, QuestionRecord};
use crate::session::{final_score, ResponseScores};
use serde::Serialize;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;

pub async fn init_db(database_url: &str) -> Result<SqlitePool> {
    if database_url.trim() == "sqlite::memory:" {
        return init_memory_db().await;
    }

    let db_path = get_db_path(database_url)?;

    // Create parent directory BEFORE attempting to connect
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            log::info!("✅ Database directory ready: {}", parent.display());
        }
    }

    let absolute_path = if db_path.is_relative() {
        std::env::current_dir()?.join(&db_path)
    } else {
        db_path.clone()
    };

    let db_url = format!("sqlite://{}?mode=rwc", absolute_path.display());
    log::info!("📦 Connecting to: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    log::info!("✅ Database migrations completed");

    Ok(pool)
}

/// A private in-memory database. A single connection that never expires keeps
/// the data alive for the lifetime of the pool.
pub async fn init_memory_db() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

fn get_db_path(database_url: &str) -> Result<PathBuf> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .ok_or_else(|| GradeError::Config("DATABASE_URL must start with 'sqlite:'".into()))?;

    Ok(PathBuf::from(path))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Serialize, Clone, Debug)]
pub struct SessionRecord {
    pub id: String,
    pub candidate_name: String,
    pub candidate_email: String,
    pub status: String,
    pub final_score: Option<f64>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
pub struct ResponseRecord {
    pub id: i64,
    pub session_id: String,
    pub question_id: String,
    pub sheet_url: String,
    pub auto_score: Option<f64>,
    pub manual_score: Option<f64>,
    pub manual_required: bool,
    pub grade_error: Option<String>,
    pub grade_details: Option<serde_json::Value>,
    pub reviewer_notes: Option<String>,
    pub graded_at: Option<String>,
    pub created_at: String,
}

impl ResponseRecord {
    pub fn scores(&self) -> ResponseScores {
        ResponseScores::new(self.manual_score, self.auto_score)
    }
}

/// A response joined with the question it answers.
#[derive(Clone, Debug)]
pub struct PendingResponse {
    pub response_id: i64,
    pub sheet_url: String,
    pub question: Question,
}

fn session_from_row(row: &SqliteRow) -> SessionRecord {
    SessionRecord {
        id: row.get("id"),
        candidate_name: row.get("candidate_name"),
        candidate_email: row.get("candidate_email"),
        status: row.get("status"),
        final_score: row.get("final_score"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    }
}

fn response_from_row(row: &SqliteRow) -> ResponseRecord {
    let details: Option<String> = row.get("grade_details");
    ResponseRecord {
        id: row.get("id"),
        session_id: row.get("session_id"),
        question_id: row.get("question_id"),
        sheet_url: row.get("sheet_url"),
        auto_score: row.get("auto_score"),
        manual_score: row.get("manual_score"),
        manual_required: row.get("manual_required"),
        grade_error: row.get("grade_error"),
        grade_details: details.and_then(|d| serde_json::from_str(&d).ok()),
        reviewer_notes: row.get("reviewer_notes"),
        graded_at: row.get("graded_at"),
        created_at: row.get("created_at"),
    }
}

/// Stored questions are decoded leniently: an unreadable answer key becomes a
/// malformed key that grades to zero with an error, not a failed query.
fn question_from_row(row: &SqliteRow) -> Question {
    let raw_key: String = row.get("answer_key");
    let answer_key = serde_json::from_str(&raw_key).unwrap_or(serde_json::Value::String(raw_key));
    Question::from(QuestionRecord {
        id: row.get("question_id"),
        question_type: row.get("question_type"),
        points: row.get("points"),
        answer_key,
        prompt: row.get("prompt"),
        section: row.get("section"),
    })
}

const QUESTION_COLUMNS: &str =
    "q.id AS question_id, q.question_type, q.points, q.answer_key, q.prompt, q.section";

pub async fn insert_question(pool: &SqlitePool, question: &Question) -> Result<()> {
    let record = QuestionRecord::from(question.clone());
    let created_at = now();

    sqlx::query(
        r#"
        INSERT INTO questions (id, question_type, points, answer_key, prompt, section, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.question_type)
    .bind(record.points)
    .bind(record.answer_key.to_string())
    .bind(&record.prompt)
    .bind(&record.section)
    .bind(&created_at)
    .bind(&created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_question(pool: &SqlitePool, id: &str) -> Result<Question> {
    let sql = format!("SELECT {} FROM questions q WHERE q.id = ?", QUESTION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| GradeError::NotFound { entity: "question", id: id.to_string() })?;

    Ok(question_from_row(&row))
}

/// Replaces a question's definition. Refused once any candidate has responded,
/// so earlier grades keep meaning what they meant.
pub async fn update_question(pool: &SqlitePool, question: &Question) -> Result<()> {
    let record = QuestionRecord::from(question.clone());
    let mut tx = pool.begin().await?;

    let responses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE question_id = ?")
        .bind(&record.id)
        .fetch_one(&mut *tx)
        .await?;
    if responses > 0 {
        return Err(GradeError::QuestionLocked(record.id));
    }

    let updated = sqlx::query(
        r#"
        UPDATE questions
        SET question_type = ?, points = ?, answer_key = ?, prompt = ?, section = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&record.question_type)
    .bind(record.points)
    .bind(record.answer_key.to_string())
    .bind(&record.prompt)
    .bind(&record.section)
    .bind(now())
    .bind(&record.id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(GradeError::NotFound { entity: "question", id: record.id });
    }

    tx.commit().await?;
    Ok(())
}

/// Swaps the answer key (and optionally the points) of an existing question.
pub async fn update_answer_key(
    pool: &SqlitePool,
    question_id: &str,
    answer_key: AnswerKey,
    points: Option<u32>,
) -> Result<Question> {
    let mut question = get_question(pool, question_id).await?;
    question.answer_key = answer_key;
    if let Some(points) = points {
        question.points = points;
    }
    question.validate()?;

    update_question(pool, &question).await?;
    Ok(question)
}

/// Inserts new questions and refreshes changed ones. Locked questions are left alone.
pub async fn seed_questions(pool: &SqlitePool, questions: &[Question]) -> Result<usize> {
    let mut written = 0;
    for question in questions {
        match get_question(pool, &question.id).await {
            Err(GradeError::NotFound { .. }) => {
                insert_question(pool, question).await?;
                written += 1;
            }
            Ok(existing) if existing == *question => {}
            Ok(_) => match update_question(pool, question).await {
                Ok(()) => written += 1,
                Err(GradeError::QuestionLocked(id)) => {
                    log::warn!("⚠️  Question {} has responses; keeping the stored answer key", id);
                }
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

pub async fn create_session(
    pool: &SqlitePool,
    candidate_name: &str,
    candidate_email: &str,
) -> Result<SessionRecord> {
    let id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO sessions (id, candidate_name, candidate_email, status, final_score, created_at)
        VALUES (?, ?, ?, 'in_progress', 0, ?)
        "#,
    )
    .bind(&id)
    .bind(candidate_name)
    .bind(candidate_email)
    .bind(now())
    .execute(pool)
    .await?;

    get_session(pool, &id).await
}

pub async fn get_session(pool: &SqlitePool, id: &str) -> Result<SessionRecord> {
    let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| GradeError::NotFound { entity: "session", id: id.to_string() })?;

    Ok(session_from_row(&row))
}

pub async fn complete_session(pool: &SqlitePool, id: &str) -> Result<()> {
    let updated = sqlx::query(
        "UPDATE sessions SET status = 'completed', completed_at = COALESCE(completed_at, ?) WHERE id = ?",
    )
    .bind(now())
    .bind(id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(GradeError::NotFound { entity: "session", id: id.to_string() });
    }
    Ok(())
}

/// Links a candidate's sheet to a question. Linking the same question to a
/// different sheet discards the auto-grade of the old sheet and refreshes the
/// session total; a reviewer's manual score is kept.
pub async fn add_response(
    pool: &SqlitePool,
    session_id: &str,
    question_id: &str,
    sheet_url: &str,
) -> Result<ResponseRecord> {
    get_session(pool, session_id).await?;
    get_question(pool, question_id).await?;

    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO responses (session_id, question_id, sheet_url, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (session_id, question_id) DO UPDATE SET
            sheet_url = excluded.sheet_url,
            auto_score = CASE WHEN sheet_url = excluded.sheet_url THEN auto_score END,
            grade_error = CASE WHEN sheet_url = excluded.sheet_url THEN grade_error END,
            grade_details = CASE WHEN sheet_url = excluded.sheet_url THEN grade_details END,
            graded_at = CASE WHEN sheet_url = excluded.sheet_url THEN graded_at END,
            manual_required = CASE WHEN sheet_url = excluded.sheet_url THEN manual_required ELSE 0 END
        RETURNING id
        "#,
    )
    .bind(session_id)
    .bind(question_id)
    .bind(sheet_url)
    .bind(now())
    .fetch_one(&mut *tx)
    .await?;

    recompute_in_tx(&mut tx, session_id).await?;
    tx.commit().await?;

    get_response(pool, id).await
}

pub async fn get_response(pool: &SqlitePool, id: i64) -> Result<ResponseRecord> {
    let row = sqlx::query("SELECT * FROM responses WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| GradeError::NotFound { entity: "response", id: id.to_string() })?;

    Ok(response_from_row(&row))
}

pub async fn list_responses(pool: &SqlitePool, session_id: &str) -> Result<Vec<ResponseRecord>> {
    let rows = sqlx::query("SELECT * FROM responses WHERE session_id = ? ORDER BY id")
        .bind(session_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(response_from_row).collect())
}

pub async fn pending_response(pool: &SqlitePool, response_id: i64) -> Result<PendingResponse> {
    let sql = format!(
        "SELECT r.id AS response_id, r.sheet_url, {} FROM responses r JOIN questions q ON q.id = r.question_id WHERE r.id = ?",
        QUESTION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(response_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| GradeError::NotFound { entity: "response", id: response_id.to_string() })?;

    Ok(PendingResponse {
        response_id: row.get("response_id"),
        sheet_url: row.get("sheet_url"),
        question: question_from_row(&row),
    })
}

pub async fn session_pending_responses(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Vec<PendingResponse>> {
    let sql = format!(
        "SELECT r.id AS response_id, r.sheet_url, {} FROM responses r JOIN questions q ON q.id = r.question_id WHERE r.session_id = ? ORDER BY r.id",
        QUESTION_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(session_id).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| PendingResponse {
            response_id: row.get("response_id"),
            sheet_url: row.get("sheet_url"),
            question: question_from_row(row),
        })
        .collect())
}

/// Recomputes a session's final score from the response rows visible to `tx`.
async fn recompute_in_tx(tx: &mut Transaction<'_, Sqlite>, session_id: &str) -> Result<f64> {
    let rows = sqlx::query("SELECT manual_score, auto_score FROM responses WHERE session_id = ?")
        .bind(session_id)
        .fetch_all(&mut **tx)
        .await?;

    let scores: Vec<ResponseScores> = rows
        .iter()
        .map(|row| ResponseScores::new(row.get("manual_score"), row.get("auto_score")))
        .collect();
    let total = final_score(&scores);

    sqlx::query("UPDATE sessions SET final_score = ? WHERE id = ?")
        .bind(total)
        .bind(session_id)
        .execute(&mut **tx)
        .await?;

    Ok(total)
}

pub async fn recompute_final_score(pool: &SqlitePool, session_id: &str) -> Result<f64> {
    let mut tx = pool.begin().await?;
    let total = recompute_in_tx(&mut tx, session_id).await?;
    tx.commit().await?;
    Ok(total)
}

/// Stores an auto-grade and refreshes the session total in one transaction.
/// Any manual score on the response is left untouched.
pub async fn record_auto_grade(pool: &SqlitePool, response_id: i64, result: &GradeResult) -> Result<f64> {
    let details = result
        .details
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let mut tx = pool.begin().await?;

    let session_id: String = sqlx::query_scalar(
        r#"
        UPDATE responses
        SET auto_score = ?, manual_required = ?, grade_error = ?, grade_details = ?, graded_at = ?
        WHERE id = ?
        RETURNING session_id
        "#,
    )
    .bind(result.auto_score)
    .bind(result.manual_required)
    .bind(&result.error)
    .bind(&details)
    .bind(now())
    .bind(response_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| GradeError::NotFound { entity: "response", id: response_id.to_string() })?;

    let total = recompute_in_tx(&mut tx, &session_id).await?;
    tx.commit().await?;
    Ok(total)
}

/// Sets (or clears, with `None`) a reviewer's score and refreshes the session total.
pub async fn set_manual_score(
    pool: &SqlitePool,
    response_id: i64,
    manual_score: Option<f64>,
    reviewer_notes: Option<&str>,
) -> Result<f64> {
    let mut tx = pool.begin().await?;

    let session_id: String = sqlx::query_scalar(
        r#"
        UPDATE responses
        SET manual_score = ?, reviewer_notes = COALESCE(?, reviewer_notes), graded_at = ?
        WHERE id = ?
        RETURNING session_id
        "#,
    )
    .bind(manual_score)
    .bind(reviewer_notes)
    .bind(now())
    .bind(response_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| GradeError::NotFound { entity: "response", id: response_id.to_string() })?;

    let total = recompute_in_tx(&mut tx, &session_id).await?;
    tx.commit().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionRecord;
    use serde_json::json;

    fn question(id: &str, question_type: &str, answer_key: serde_json::Value) -> Question {
        QuestionRecord {
            id: id.to_string(),
            question_type: question_type.to_string(),
            points: 10,
            answer_key,
            prompt: None,
            section: None,
        }
        .into_validated()
        .unwrap()
    }

    #[actix_rt::test]
    async fn test_question_round_trip() {
        let pool = init_memory_db().await.unwrap();
        let q = question("q1", "data-entry", json!({ "A1": 5, "B1": "foo" }));
        insert_question(&pool, &q).await.unwrap();

        let stored = get_question(&pool, "q1").await.unwrap();
        assert_eq!(stored, q);
        assert!(matches!(
            get_question(&pool, "nope").await,
            Err(GradeError::NotFound { .. })
        ));
    }

    #[actix_rt::test]
    async fn test_answer_key_frozen_after_response() {
        let pool = init_memory_db().await.unwrap();
        let mut q = question("q1", "mcq", json!({ "answer": "A" }));
        insert_question(&pool, &q).await.unwrap();

        q.points = 20;
        update_question(&pool, &q).await.unwrap();
        assert_eq!(get_question(&pool, "q1").await.unwrap().points, 20);

        assert!(update_answer_key(&pool, "q1", AnswerKey::Scenario, None).await.is_err());

        let session = create_session(&pool, "Ada", "ada@example.com").await.unwrap();
        add_response(&pool, &session.id, "q1", "sheet-1").await.unwrap();

        q.points = 30;
        assert!(matches!(
            update_question(&pool, &q).await,
            Err(GradeError::QuestionLocked(_))
        ));
        assert!(matches!(
            update_answer_key(&pool, "q1", q.answer_key.clone(), Some(5)).await,
            Err(GradeError::QuestionLocked(_))
        ));
    }

    #[actix_rt::test]
    async fn test_auto_and_manual_scores_update_final_score() {
        let pool = init_memory_db().await.unwrap();
        insert_question(&pool, &question("q1", "mcq", json!({ "answer": "A" }))).await.unwrap();
        insert_question(&pool, &question("q2", "mcq", json!({ "answer": "B" }))).await.unwrap();
        insert_question(&pool, &question("q3", "scenario", json!(null))).await.unwrap();

        let session = create_session(&pool, "Ada", "ada@example.com").await.unwrap();
        let r1 = add_response(&pool, &session.id, "q1", "s1").await.unwrap();
        let r2 = add_response(&pool, &session.id, "q2", "s2").await.unwrap();
        let r3 = add_response(&pool, &session.id, "q3", "s3").await.unwrap();

        record_auto_grade(&pool, r1.id, &GradeResult::scored(5.0)).await.unwrap();
        record_auto_grade(&pool, r2.id, &GradeResult::scored(3.0)).await.unwrap();
        let total = record_auto_grade(&pool, r3.id, &GradeResult::manual()).await.unwrap();
        assert_eq!(total, 8.0);

        let total = set_manual_score(&pool, r2.id, Some(7.0), Some("partial credit")).await.unwrap();
        assert_eq!(total, 12.0);
        assert_eq!(get_session(&pool, &session.id).await.unwrap().final_score, Some(12.0));

        let stored = get_response(&pool, r3.id).await.unwrap();
        assert_eq!(stored.auto_score, None);
        assert!(stored.manual_required);
    }

    #[actix_rt::test]
    async fn test_regrade_keeps_manual_score() {
        let pool = init_memory_db().await.unwrap();
        insert_question(&pool, &question("q1", "mcq", json!({ "answer": "A" }))).await.unwrap();
        let session = create_session(&pool, "Ada", "ada@example.com").await.unwrap();
        let r = add_response(&pool, &session.id, "q1", "s1").await.unwrap();

        record_auto_grade(&pool, r.id, &GradeResult::scored(5.0)).await.unwrap();
        set_manual_score(&pool, r.id, Some(9.0), None).await.unwrap();
        let total = record_auto_grade(&pool, r.id, &GradeResult::scored(8.0)).await.unwrap();

        let stored = get_response(&pool, r.id).await.unwrap();
        assert_eq!(stored.auto_score, Some(8.0));
        assert_eq!(stored.manual_score, Some(9.0));
        assert_eq!(total, 9.0);
    }

    #[actix_rt::test]
    async fn test_relinking_replaces_sheet_url() {
        let pool = init_memory_db().await.unwrap();
        insert_question(&pool, &question("q1", "mcq", json!({ "answer": "A" }))).await.unwrap();
        let session = create_session(&pool, "Ada", "ada@example.com").await.unwrap();

        let first = add_response(&pool, &session.id, "q1", "old").await.unwrap();
        record_auto_grade(&pool, first.id, &GradeResult::scored(10.0)).await.unwrap();
        set_manual_score(&pool, first.id, Some(4.0), Some("seen")).await.unwrap();
        set_manual_score(&pool, first.id, None, None).await.unwrap();
        assert_eq!(get_session(&pool, &session.id).await.unwrap().final_score, Some(10.0));

        // Same sheet again keeps the grade.
        let same = add_response(&pool, &session.id, "q1", "old").await.unwrap();
        assert_eq!(same.auto_score, Some(10.0));

        let second = add_response(&pool, &session.id, "q1", "new").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.sheet_url, "new");
        assert_eq!(second.auto_score, None);
        assert_eq!(second.grade_error, None);
        assert_eq!(second.grade_details, None);
        assert_eq!(second.graded_at, None);
        assert!(!second.manual_required);
        assert_eq!(second.reviewer_notes.as_deref(), Some("seen"));
        assert_eq!(get_session(&pool, &session.id).await.unwrap().final_score, Some(0.0));
        assert_eq!(list_responses(&pool, &session.id).await.unwrap().len(), 1);
    }

    #[actix_rt::test]
    async fn test_relinking_keeps_manual_score_in_total() {
        let pool = init_memory_db().await.unwrap();
        insert_question(&pool, &question("q1", "mcq", json!({ "answer": "A" }))).await.unwrap();
        let session = create_session(&pool, "Ada", "ada@example.com").await.unwrap();

        let r = add_response(&pool, &session.id, "q1", "old").await.unwrap();
        record_auto_grade(&pool, r.id, &GradeResult::scored(10.0)).await.unwrap();
        set_manual_score(&pool, r.id, Some(6.0), None).await.unwrap();

        let relinked = add_response(&pool, &session.id, "q1", "new").await.unwrap();
        assert_eq!(relinked.manual_score, Some(6.0));
        assert_eq!(get_session(&pool, &session.id).await.unwrap().final_score, Some(6.0));
    }

    #[actix_rt::test]
    async fn test_new_session_total_is_zero() {
        let pool = init_memory_db().await.unwrap();
        let session = create_session(&pool, "Ada", "ada@example.com").await.unwrap();
        assert_eq!(session.final_score, Some(0.0));
        assert_eq!(session.status, "in_progress");
    }

    #[actix_rt::test]
    async fn test_legacy_answer_key_loads_leniently() {
        let pool = init_memory_db().await.unwrap();
        sqlx::query(
            "INSERT INTO questions (id, question_type, points, answer_key, created_at, updated_at) VALUES ('old', 'data-entry', 10, 'not json', '', '')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let q = get_question(&pool, "old").await.unwrap();
        assert!(matches!(q.answer_key, crate::question::AnswerKey::Malformed { .. }));
    }

    #[actix_rt::test]
    async fn test_missing_response_is_not_found() {
        let pool = init_memory_db().await.unwrap();
        assert!(matches!(
            record_auto_grade(&pool, 42, &GradeResult::scored(1.0)).await,
            Err(GradeError::NotFound { .. })
        ));
    }
}
