// src/engine.rs
//! The grading engine: a pure function from a question and a workbook snapshot
//! to a [`GradeResult`].

use serde::{Deserialize, Serialize};

use crate::comparator::{compare_cell, compare_formula, normalize_token, DEFAULT_TOLERANCE};
use crate::errors::GradeError;
use crate::question::{AnswerKey, DataEntryKey, ExpectedValue, FormulaKey, McqKey, Question, QuestionType};
use crate::snapshot::{CellContent, CellRange, CellRef, SheetSnapshot, WorkbookSnapshot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingConfig {
    /// Relative tolerance for numeric cell values.
    pub tolerance: f64,
    /// Where MCQ answers are looked for when the key names no cell.
    pub mcq_range: CellRange,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            mcq_range: CellRange::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncorrectCell {
    pub cell: CellRef,
    pub expected: ExpectedValue,
    /// `None` when the candidate left the cell empty.
    pub actual: Option<CellContent>,
}

/// Per-cell breakdown shown to reviewers for data-entry questions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataEntryDetails {
    pub correct: Vec<CellRef>,
    pub incorrect: Vec<IncorrectCell>,
}

/// Outcome of grading one response.
///
/// * `auto_score: Some(0.0)` without `error`: graded, answer wrong.
/// * `auto_score: Some(0.0)` with `error`: grading infrastructure failed, re-grade later.
/// * `auto_score: None` with `manual_required`: a reviewer must score it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub auto_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DataEntryDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub manual_required: bool,
}

impl GradeResult {
    pub fn scored(auto_score: f64) -> Self {
        Self {
            auto_score: Some(auto_score),
            formula_score: None,
            value_score: None,
            details: None,
            error: None,
            manual_required: false,
        }
    }

    pub fn manual() -> Self {
        Self {
            auto_score: None,
            manual_required: true,
            ..Self::scored(0.0)
        }
    }

    /// A zero score flagged with the reason grading could not run.
    pub fn degraded(error: GradeError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::scored(0.0)
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

fn percentage(matches: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matches as f64 / total as f64 * 100.0
    }
}

/// Two decimals, ties to even (0.125 -> 0.12).
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

fn scale(percent: f64, points: u32) -> f64 {
    round2(percent / 100.0 * points as f64)
}

#[derive(Debug, Clone, Default)]
pub struct GradingEngine {
    config: GradingConfig,
}

impl GradingEngine {
    pub fn new(config: GradingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    /// Outcomes that do not depend on the spreadsheet at all. When this returns
    /// `Some`, no snapshot needs to be fetched.
    pub fn precheck(&self, question: &Question) -> Option<GradeResult> {
        match question.question_type {
            QuestionType::Scenario => return Some(GradeResult::manual()),
            QuestionType::Unknown => {
                return Some(GradeResult::degraded(GradeError::UnsupportedQuestionType));
            }
            _ => {}
        }

        match &question.answer_key {
            AnswerKey::Malformed { reason, .. } => Some(GradeResult::degraded(
                GradeError::MalformedAnswerKey(reason.clone()),
            )),
            AnswerKey::Mcq(key) if key.answer.trim().is_empty() => Some(GradeResult::degraded(
                GradeError::MalformedAnswerKey("mcq answer key has an empty 'answer'".to_string()),
            )),
            key if key.question_type() != Some(question.question_type) => {
                Some(GradeResult::degraded(GradeError::MalformedAnswerKey(format!(
                    "answer key does not match question type '{}'",
                    question.question_type
                ))))
            }
            _ => None,
        }
    }

    /// Grades one response against the primary sheet of `workbook`.
    pub fn grade_response(&self, question: &Question, workbook: &WorkbookSnapshot) -> GradeResult {
        if let Some(result) = self.precheck(question) {
            return result;
        }

        let Some(sheet) = workbook.primary_sheet() else {
            return GradeResult::degraded(GradeError::EmptyWorkbook);
        };

        let result = match &question.answer_key {
            AnswerKey::Mcq(key) => self.grade_mcq(key, question.points, sheet),
            AnswerKey::Formula(key) => self.grade_formula(key, question.points, sheet),
            AnswerKey::DataEntry(key) => self.grade_data_entry(key, question.points, sheet),
            AnswerKey::Scenario => GradeResult::manual(),
            AnswerKey::Malformed { reason, .. } => {
                GradeResult::degraded(GradeError::MalformedAnswerKey(reason.clone()))
            }
        };

        log::debug!(
            "Graded {} question {}: auto_score={:?}",
            question.question_type,
            question.id,
            result.auto_score
        );
        result
    }

    fn grade_mcq(&self, key: &McqKey, points: u32, sheet: &SheetSnapshot) -> GradeResult {
        let answer_cell = match &key.cell {
            Some(cell) => sheet.get(cell),
            None => sheet
                .first_in_range(&self.config.mcq_range)
                .map(|(_, content)| content),
        };

        let given = answer_cell
            .map(|content| normalize_token(&content.display_text()))
            .unwrap_or_default();

        if given == normalize_token(&key.answer) {
            GradeResult::scored(points as f64)
        } else {
            GradeResult::scored(0.0)
        }
    }

    fn grade_formula(&self, key: &FormulaKey, points: u32, sheet: &SheetSnapshot) -> GradeResult {
        let formula_score = key.formulas.as_ref().map_or(0.0, |formulas| {
            let matches = formulas
                .iter()
                .filter(|(cell, expected)| {
                    sheet
                        .get(cell)
                        .and_then(CellContent::formula_text)
                        .is_some_and(|actual| compare_formula(actual, expected))
                })
                .count();
            percentage(matches, formulas.len())
        });

        let value_score = key.values.as_ref().map_or(0.0, |values| {
            let matches = values
                .iter()
                .filter(|(cell, expected)| compare_cell(sheet.get(cell), expected, self.config.tolerance))
                .count();
            percentage(matches, values.len())
        });

        // Formula text and computed output always weigh half each, even when
        // one of the two sub-keys is absent.
        let combined = (formula_score + value_score) / 2.0;

        GradeResult {
            formula_score: Some(formula_score),
            value_score: Some(value_score),
            ..GradeResult::scored(scale(combined, points))
        }
    }

    fn grade_data_entry(&self, key: &DataEntryKey, points: u32, sheet: &SheetSnapshot) -> GradeResult {
        let mut details = DataEntryDetails::default();

        for (cell, expected) in key {
            let actual = sheet.get(cell);
            if compare_cell(actual, expected, self.config.tolerance) {
                details.correct.push(cell.clone());
            } else {
                details.incorrect.push(IncorrectCell {
                    cell: cell.clone(),
                    expected: expected.clone(),
                    actual: actual.cloned(),
                });
            }
        }

        let score = percentage(details.correct.len(), key.len());

        GradeResult {
            details: Some(details),
            ..GradeResult::scored(scale(score, points))
        }
    }
}
