// src/question.rs
//! Questions and their answer keys.
//!
//! Answer keys are stored as raw JSON next to the question type. Two decoding
//! paths exist: a strict one used when a recruiter authors a question, and a
//! lenient one used when grading rows that predate validation. The lenient path
//! never fails; whatever it cannot use scores as zero matches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{GradeError, Result};
use crate::snapshot::CellRef;

const DEFAULT_POINTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    Formula,
    DataEntry,
    Mcq,
    /// Open-ended work that a reviewer always scores by hand.
    Scenario,
    /// Anything unrecognized in stored data.
    #[serde(other)]
    Unknown,
}

impl QuestionType {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "formula" => QuestionType::Formula,
            "data-entry" => QuestionType::DataEntry,
            "mcq" => QuestionType::Mcq,
            "scenario" => QuestionType::Scenario,
            _ => QuestionType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Formula => "formula",
            QuestionType::DataEntry => "data-entry",
            QuestionType::Mcq => "mcq",
            QuestionType::Scenario => "scenario",
            QuestionType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value the recruiter expects to find in a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl ExpectedValue {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(ExpectedValue::Number)
                .unwrap_or_else(|| ExpectedValue::Text(n.to_string())),
            Value::Bool(b) => ExpectedValue::Bool(*b),
            Value::String(s) => ExpectedValue::Text(s.clone()),
            other => ExpectedValue::Text(other.to_string()),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ExpectedValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ExpectedValue::Bool(b) => Value::Bool(*b),
            ExpectedValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<f64> for ExpectedValue {
    fn from(value: f64) -> Self {
        ExpectedValue::Number(value)
    }
}

impl From<&str> for ExpectedValue {
    fn from(value: &str) -> Self {
        ExpectedValue::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formulas: Option<BTreeMap<CellRef, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<CellRef, ExpectedValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McqKey {
    pub answer: String,
    /// Where the candidate types the answer. When unset the first populated
    /// cell of the answer range is read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellRef>,
}

pub type DataEntryKey = BTreeMap<CellRef, ExpectedValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerKey {
    Formula(FormulaKey),
    DataEntry(DataEntryKey),
    Mcq(McqKey),
    Scenario,
    /// Stored data whose shape does not fit the question type.
    Malformed { reason: String, raw: Value },
}

impl AnswerKey {
    /// Lenient decoding for stored answer keys. Problems are logged, never raised.
    pub fn from_raw(question_type: QuestionType, raw: &Value) -> Self {
        let (key, issues) = decode(question_type, raw);
        for issue in &issues {
            log::warn!("Answer key for {} question: {}", question_type, issue);
        }
        key
    }

    /// Strict decoding for newly authored answer keys.
    pub fn parse_strict(question_type: QuestionType, raw: &Value) -> Result<Self> {
        let (key, issues) = decode(question_type, raw);
        if let Some(issue) = issues.into_iter().next() {
            return Err(GradeError::MalformedAnswerKey(issue));
        }
        key.validate()?;
        Ok(key)
    }

    pub fn question_type(&self) -> Option<QuestionType> {
        match self {
            AnswerKey::Formula(_) => Some(QuestionType::Formula),
            AnswerKey::DataEntry(_) => Some(QuestionType::DataEntry),
            AnswerKey::Mcq(_) => Some(QuestionType::Mcq),
            AnswerKey::Scenario => Some(QuestionType::Scenario),
            AnswerKey::Malformed { .. } => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            AnswerKey::Formula(key) => {
                let formulas = key.formulas.as_ref().map_or(0, |m| m.len());
                let values = key.values.as_ref().map_or(0, |m| m.len());
                if formulas + values == 0 {
                    return Err(GradeError::MalformedAnswerKey(
                        "formula answer key needs 'formulas' or 'values'".to_string(),
                    ));
                }
                if let Some(formulas) = &key.formulas {
                    check_cells(formulas.keys())?;
                    if let Some((cell, _)) = formulas.iter().find(|(_, f)| f.trim().is_empty()) {
                        return Err(GradeError::MalformedAnswerKey(format!(
                            "empty formula for {}",
                            cell
                        )));
                    }
                }
                if let Some(values) = &key.values {
                    check_cells(values.keys())?;
                }
                Ok(())
            }
            AnswerKey::DataEntry(key) => {
                if key.is_empty() {
                    return Err(GradeError::MalformedAnswerKey(
                        "data-entry answer key has no cells".to_string(),
                    ));
                }
                check_cells(key.keys())
            }
            AnswerKey::Mcq(key) => {
                if key.answer.trim().is_empty() {
                    return Err(GradeError::MalformedAnswerKey(
                        "mcq answer key has an empty 'answer'".to_string(),
                    ));
                }
                if let Some(cell) = &key.cell {
                    check_cells(std::iter::once(cell))?;
                }
                Ok(())
            }
            AnswerKey::Scenario => Ok(()),
            AnswerKey::Malformed { reason, .. } => {
                Err(GradeError::MalformedAnswerKey(reason.clone()))
            }
        }
    }

    /// JSON form persisted alongside the question.
    pub fn to_raw(&self) -> Value {
        match self {
            AnswerKey::Formula(key) => serde_json::to_value(key).unwrap_or(Value::Null),
            AnswerKey::DataEntry(key) => Value::Object(
                key.iter()
                    .map(|(cell, value)| (cell.to_string(), value.to_json()))
                    .collect(),
            ),
            AnswerKey::Mcq(key) => serde_json::to_value(key).unwrap_or(Value::Null),
            AnswerKey::Scenario => Value::Object(Map::new()),
            AnswerKey::Malformed { raw, .. } => raw.clone(),
        }
    }
}

fn check_cells<'a>(cells: impl Iterator<Item = &'a CellRef>) -> Result<()> {
    for cell in cells {
        if !cell.is_valid() {
            return Err(GradeError::MalformedAnswerKey(format!(
                "'{}' is not a cell reference",
                cell
            )));
        }
    }
    Ok(())
}

fn decode(question_type: QuestionType, raw: &Value) -> (AnswerKey, Vec<String>) {
    let mut issues = Vec::new();

    match question_type {
        QuestionType::Scenario => return (AnswerKey::Scenario, issues),
        QuestionType::Unknown => {
            let reason = "question type is not recognized".to_string();
            issues.push(reason.clone());
            return (AnswerKey::Malformed { reason, raw: raw.clone() }, issues);
        }
        _ => {}
    }

    let empty = Map::new();
    let object = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            let reason = format!("expected an object, found {}", json_kind(other));
            issues.push(reason.clone());
            return (AnswerKey::Malformed { reason, raw: raw.clone() }, issues);
        }
    };

    let key = match question_type {
        QuestionType::Formula => {
            let formulas = sub_map(object, "formulas", &mut issues).map(|entries| {
                entries
                    .iter()
                    .map(|(cell, formula)| {
                        let text = match formula {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (CellRef::from(cell.as_str()), text)
                    })
                    .collect()
            });
            let values = sub_map(object, "values", &mut issues).map(expected_map);
            AnswerKey::Formula(FormulaKey { formulas, values })
        }
        QuestionType::DataEntry => AnswerKey::DataEntry(expected_map(object)),
        QuestionType::Mcq => {
            let answer = match object.get("answer") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            let cell = match object.get("cell") {
                Some(Value::String(s)) => Some(CellRef::from(s.as_str())),
                Some(other) => {
                    issues.push(format!("'cell' should be a string, found {}", json_kind(other)));
                    None
                }
                None => None,
            };
            match answer {
                Some(answer) => AnswerKey::Mcq(McqKey { answer, cell }),
                None => {
                    let reason = "mcq answer key needs an 'answer'".to_string();
                    issues.push(reason.clone());
                    AnswerKey::Malformed { reason, raw: raw.clone() }
                }
            }
        }
        QuestionType::Scenario | QuestionType::Unknown => AnswerKey::Scenario,
    };

    (key, issues)
}

fn sub_map<'a>(
    object: &'a Map<String, Value>,
    name: &str,
    issues: &mut Vec<String>,
) -> Option<&'a Map<String, Value>> {
    match object.get(name) {
        Some(Value::Object(map)) => Some(map),
        Some(Value::Null) | None => None,
        Some(other) => {
            issues.push(format!(
                "'{}' should be an object of cells, found {}",
                name,
                json_kind(other)
            ));
            None
        }
    }
}

fn expected_map(entries: &Map<String, Value>) -> BTreeMap<CellRef, ExpectedValue> {
    entries
        .iter()
        .map(|(cell, value)| (CellRef::from(cell.as_str()), ExpectedValue::from_json(value)))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn default_points() -> i64 {
    DEFAULT_POINTS as i64
}

fn default_type() -> String {
    QuestionType::Formula.as_str().to_string()
}

/// A question as stored or submitted: raw type name and raw answer key JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_type")]
    pub question_type: String,
    #[serde(default = "default_points")]
    pub points: i64,
    #[serde(default)]
    pub answer_key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl QuestionRecord {
    /// Authoring-time conversion: every shape problem is an error.
    pub fn into_validated(self) -> Result<Question> {
        let question_type = QuestionType::from_name(&self.question_type);
        if question_type == QuestionType::Unknown {
            return Err(GradeError::InvalidQuestion(format!(
                "unknown question type '{}'",
                self.question_type
            )));
        }
        if self.points <= 0 || self.points > u32::MAX as i64 {
            return Err(GradeError::InvalidQuestion(format!(
                "points must be a positive integer, got {}",
                self.points
            )));
        }
        let answer_key = AnswerKey::parse_strict(question_type, &self.answer_key)?;
        let id = if self.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.id
        };

        Ok(Question {
            id,
            question_type,
            points: self.points as u32,
            answer_key,
            prompt: self.prompt,
            section: self.section,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "QuestionRecord", into = "QuestionRecord")]
pub struct Question {
    pub id: String,
    pub question_type: QuestionType,
    /// Maximum score awardable.
    pub points: u32,
    pub answer_key: AnswerKey,
    pub prompt: Option<String>,
    pub section: Option<String>,
}

impl Question {
    pub fn new(id: impl Into<String>, points: u32, answer_key: AnswerKey) -> Self {
        let question_type = answer_key.question_type().unwrap_or(QuestionType::Unknown);
        Self {
            id: id.into(),
            question_type,
            points,
            answer_key,
            prompt: None,
            section: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.points == 0 {
            return Err(GradeError::InvalidQuestion("points must be positive".to_string()));
        }
        if self.question_type == QuestionType::Unknown {
            return Err(GradeError::UnsupportedQuestionType);
        }
        if self.answer_key.question_type() != Some(self.question_type) {
            return Err(GradeError::MalformedAnswerKey(format!(
                "answer key does not match question type '{}'",
                self.question_type
            )));
        }
        self.answer_key.validate()
    }
}

impl From<QuestionRecord> for Question {
    fn from(record: QuestionRecord) -> Self {
        let question_type = QuestionType::from_name(&record.question_type);
        let answer_key = AnswerKey::from_raw(question_type, &record.answer_key);
        Question {
            id: record.id,
            question_type,
            points: record.points.clamp(0, u32::MAX as i64) as u32,
            answer_key,
            prompt: record.prompt,
            section: record.section,
        }
    }
}

impl From<Question> for QuestionRecord {
    fn from(question: Question) -> Self {
        QuestionRecord {
            id: question.id,
            question_type: question.question_type.as_str().to_string(),
            points: question.points as i64,
            answer_key: question.answer_key.to_raw(),
            prompt: question.prompt,
            section: question.section,
        }
    }
}

/// A TOML file of `[[questions]]` tables.
#[derive(Debug, Deserialize)]
pub struct QuestionBank {
    #[serde(default)]
    pub questions: Vec<QuestionRecord>,
}

impl QuestionBank {
    pub fn from_toml_str(source: &str) -> Result<Vec<Question>> {
        let bank: QuestionBank = toml::from_str(source)?;
        bank.questions
            .into_iter()
            .map(QuestionRecord::into_validated)
            .collect()
    }

    pub fn load(path: &std::path::Path) -> Result<Vec<Question>> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
