// src/runner.rs
use crate::config::AppConfig;
use crate::database::{self, PendingResponse};
use crate::engine::{GradeResult, GradingEngine};
use crate::errors::{GradeError, Result};
use crate::question::Question;
use crate::resolvers::{build_resolver, extract_spreadsheet_id, SnapshotResolver};
use crate::snapshot::WorkbookSnapshot;
use futures::future;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One response waiting to be graded.
#[derive(Debug, Clone)]
pub struct Submission {
    pub response_id: i64,
    pub question: Question,
    /// Sheet URL or bare spreadsheet id.
    pub sheet_ref: String,
}

impl From<PendingResponse> for Submission {
    fn from(pending: PendingResponse) -> Self {
        Self {
            response_id: pending.response_id,
            question: pending.question,
            sheet_ref: pending.sheet_url,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeOutcome {
    pub response_id: i64,
    pub question_id: String,
    pub result: GradeResult,
    pub latency_ms: u64,
}

/// Fetches snapshots through the configured resolver and runs the engine on them.
///
/// Cloning is cheap; the resolver is shared.
#[derive(Clone)]
pub struct Grader {
    engine: GradingEngine,
    resolver: Option<Arc<dyn SnapshotResolver>>,
    timeout: Duration,
}

impl Grader {
    pub fn new(
        engine: GradingEngine,
        resolver: Option<Arc<dyn SnapshotResolver>>,
        timeout: Duration,
    ) -> Self {
        Self { engine, resolver, timeout }
    }

    pub fn from_config(config: &AppConfig, client: &reqwest::Client) -> Self {
        Self::new(
            GradingEngine::new(config.grading),
            build_resolver(config, client),
            config.resolver_timeout,
        )
    }

    pub fn engine(&self) -> &GradingEngine {
        &self.engine
    }

    pub fn resolver_name(&self) -> Option<&str> {
        self.resolver.as_ref().map(|r| r.name())
    }

    /// Resolves `sheet_ref` into a snapshot, bounded by the configured timeout.
    pub async fn fetch_snapshot(&self, sheet_ref: &str) -> Result<WorkbookSnapshot> {
        let resolver = self.resolver.as_ref().ok_or(GradeError::ResolverUnavailable)?;
        let spreadsheet_id = extract_spreadsheet_id(sheet_ref)
            .ok_or_else(|| GradeError::InvalidSpreadsheetReference(sheet_ref.to_string()))?;

        match tokio::time::timeout(self.timeout, resolver.resolve(&spreadsheet_id)).await {
            Ok(result) => result,
            Err(_) => Err(GradeError::ResolverTimeout {
                resolver: resolver.name().to_string(),
                timeout: self.timeout,
            }),
        }
    }

    /// Grades one response. Never fails: backend problems come back as a
    /// zero score with `error` set.
    pub async fn grade_submission(&self, question: &Question, sheet_ref: &str) -> GradeResult {
        if let Some(result) = self.engine.precheck(question) {
            return result;
        }

        match self.fetch_snapshot(sheet_ref).await {
            Ok(workbook) => self.engine.grade_response(question, &workbook),
            Err(e) => {
                log::warn!("⚠️  Could not fetch sheet for question {}: {}", question.id, e);
                GradeResult::degraded(e)
            }
        }
    }

    async fn grade_one(&self, submission: &Submission) -> GradeOutcome {
        let start = Instant::now();
        let result = self
            .grade_submission(&submission.question, &submission.sheet_ref)
            .await;

        GradeOutcome {
            response_id: submission.response_id,
            question_id: submission.question.id.clone(),
            result,
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Grades every submission concurrently. Outcomes come back in input order,
    /// one per submission.
    pub async fn grade_batch(&self, submissions: &[Submission]) -> Vec<GradeOutcome> {
        let batch_start = Instant::now();

        let futures: Vec<_> = submissions.iter().map(|s| self.grade_one(s)).collect();
        let outcomes = future::join_all(futures).await;

        let degraded = outcomes.iter().filter(|o| o.result.is_degraded()).count();
        log::info!(
            "📊 Batch of {} graded concurrently in {}ms ({} degraded)",
            outcomes.len(),
            batch_start.elapsed().as_millis(),
            degraded
        );

        outcomes
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionGradeSummary {
    pub session_id: String,
    pub outcomes: Vec<GradeOutcome>,
    pub final_score: f64,
}

/// Re-runs auto-grading for one stored response and persists the result.
/// A reviewer's manual score survives the regrade.
pub async fn regrade_response(
    grader: &Grader,
    pool: &SqlitePool,
    response_id: i64,
) -> Result<(GradeOutcome, f64)> {
    let submission = Submission::from(database::pending_response(pool, response_id).await?);
    let outcome = grader.grade_one(&submission).await;
    let final_score = database::record_auto_grade(pool, response_id, &outcome.result).await?;

    log::info!(
        "🔁 Regraded response {} (question {}): {:?}",
        response_id,
        outcome.question_id,
        outcome.result.auto_score
    );
    Ok((outcome, final_score))
}

/// Auto-grades every response of a session concurrently, stores each result
/// and returns the refreshed final score.
pub async fn grade_session(
    grader: &Grader,
    pool: &SqlitePool,
    session_id: &str,
) -> Result<SessionGradeSummary> {
    database::get_session(pool, session_id).await?;

    let submissions: Vec<Submission> = database::session_pending_responses(pool, session_id)
        .await?
        .into_iter()
        .map(Submission::from)
        .collect();

    let outcomes = grader.grade_batch(&submissions).await;

    for outcome in &outcomes {
        if let Err(e) = database::record_auto_grade(pool, outcome.response_id, &outcome.result).await {
            log::error!("❌ Failed to store grade for response {}: {}", outcome.response_id, e);
            return Err(e);
        }
    }

    let final_score = database::recompute_final_score(pool, session_id).await?;
    log::info!("✅ Session {} graded: final score {}", session_id, final_score);

    Ok(SessionGradeSummary {
        session_id: session_id.to_string(),
        outcomes,
        final_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionRecord;
    use crate::snapshot::{CellContent, SheetSnapshot};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticResolver {
        workbook: WorkbookSnapshot,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotResolver for StaticResolver {
        fn name(&self) -> &str {
            "static"
        }

        async fn resolve(&self, _spreadsheet_id: &str) -> Result<WorkbookSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.workbook.clone())
        }
    }

    struct SlowResolver;

    #[async_trait]
    impl SnapshotResolver for SlowResolver {
        fn name(&self) -> &str {
            "slow"
        }

        async fn resolve(&self, _spreadsheet_id: &str) -> Result<WorkbookSnapshot> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(WorkbookSnapshot::new())
        }
    }

    fn mcq() -> Question {
        Question::from(QuestionRecord {
            id: "mcq-1".to_string(),
            question_type: "mcq".to_string(),
            points: 10,
            answer_key: json!({ "answer": "B" }),
            prompt: None,
            section: None,
        })
    }

    fn static_resolver() -> Arc<StaticResolver> {
        Arc::new(StaticResolver {
            workbook: WorkbookSnapshot::single(
                "Sheet1",
                SheetSnapshot::new().with_cell("A1", CellContent::string("b")),
            ),
            calls: AtomicUsize::new(0),
        })
    }

    #[actix_rt::test]
    async fn test_grades_through_resolver() {
        let resolver = static_resolver();
        let grader = Grader::new(GradingEngine::default(), Some(resolver.clone()), Duration::from_secs(5));

        let result = grader
            .grade_submission(&mcq(), "https://docs.google.com/spreadsheets/d/abc/edit")
            .await;
        assert_eq!(result.auto_score, Some(10.0));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_rt::test]
    async fn test_missing_resolver_degrades() {
        let grader = Grader::new(GradingEngine::default(), None, Duration::from_secs(5));
        let result = grader.grade_submission(&mcq(), "abc").await;
        assert_eq!(result.auto_score, Some(0.0));
        assert_eq!(result.error.as_deref(), Some("Spreadsheet backend not configured"));
    }

    #[actix_rt::test]
    async fn test_bad_reference_degrades_without_fetch() {
        let resolver = static_resolver();
        let grader = Grader::new(GradingEngine::default(), Some(resolver.clone()), Duration::from_secs(5));
        let result = grader.grade_submission(&mcq(), "not a sheet").await;
        assert_eq!(result.auto_score, Some(0.0));
        assert!(result.error.unwrap().starts_with("Invalid sheet URL"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn test_scenario_skips_fetch() {
        let resolver = static_resolver();
        let grader = Grader::new(GradingEngine::default(), Some(resolver.clone()), Duration::from_secs(5));
        let scenario = Question::from(QuestionRecord {
            id: "s".to_string(),
            question_type: "scenario".to_string(),
            points: 10,
            answer_key: json!(null),
            prompt: None,
            section: None,
        });

        let result = grader.grade_submission(&scenario, "abc").await;
        assert!(result.manual_required);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn test_slow_resolver_times_out() {
        let grader = Grader::new(
            GradingEngine::default(),
            Some(Arc::new(SlowResolver)),
            Duration::from_millis(50),
        );
        let result = grader.grade_submission(&mcq(), "abc").await;
        assert_eq!(result.auto_score, Some(0.0));
        assert_eq!(
            result.error.as_deref(),
            Some("Snapshot resolver 'slow' timed out after 50ms")
        );
    }

    #[actix_rt::test]
    async fn test_batch_keeps_input_order() {
        let grader = Grader::new(GradingEngine::default(), Some(static_resolver()), Duration::from_secs(5));
        let submissions: Vec<Submission> = (0..4)
            .map(|i| Submission {
                response_id: i,
                question: mcq(),
                sheet_ref: if i == 2 { "??".to_string() } else { format!("sheet{}", i) },
            })
            .collect();

        let outcomes = grader.grade_batch(&submissions).await;
        let ids: Vec<i64> = outcomes.iter().map(|o| o.response_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(outcomes[2].result.is_degraded());
        assert_eq!(outcomes[3].result.auto_score, Some(10.0));
    }

    #[actix_rt::test]
    async fn test_grade_session_persists_results() {
        let pool = database::init_memory_db().await.unwrap();
        database::insert_question(&pool, &mcq()).await.unwrap();
        let session = database::create_session(&pool, "Ada", "ada@example.com").await.unwrap();
        let response = database::add_response(&pool, &session.id, "mcq-1", "abc").await.unwrap();

        let grader = Grader::new(GradingEngine::default(), Some(static_resolver()), Duration::from_secs(5));
        let summary = grade_session(&grader, &pool, &session.id).await.unwrap();
        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(summary.final_score, 10.0);

        let stored = database::get_response(&pool, response.id).await.unwrap();
        assert_eq!(stored.auto_score, Some(10.0));
        assert!(stored.graded_at.is_some());

        let (outcome, total) = regrade_response(&grader, &pool, response.id).await.unwrap();
        assert_eq!(outcome.result.auto_score, Some(10.0));
        assert_eq!(total, 10.0);
    }

    #[actix_rt::test]
    async fn test_grade_unknown_session_is_not_found() {
        let pool = database::init_memory_db().await.unwrap();
        let grader = Grader::new(GradingEngine::default(), None, Duration::from_secs(5));
        assert!(matches!(
            grade_session(&grader, &pool, "missing").await,
            Err(GradeError::NotFound { .. })
        ));
    }
}
