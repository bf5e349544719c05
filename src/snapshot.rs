// src/snapshot.rs
//! Cell references and the spreadsheet snapshots handed to the grading engine.
//!
//! A snapshot only carries what a candidate typed into each cell: formula text,
//! a number or a string. Computed formula results are not part of it.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{GradeError, Result};

/// Widest column name accepted (`ZZZ`).
const MAX_COLUMN_LETTERS: usize = 3;

/// An A1-style coordinate, normalized to uppercase with surrounding whitespace removed.
///
/// Malformed references are kept as-is so that legacy answer keys still load;
/// they simply never match a snapshot cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CellRef(String);

impl CellRef {
    /// Parses a reference, rejecting anything that is not `<letters><row>`.
    pub fn parse(raw: &str) -> Result<Self> {
        let cell = CellRef::from(raw.to_string());
        if cell.coords().is_none() {
            return Err(GradeError::InvalidQuestion(format!(
                "'{}' is not a cell reference",
                raw.trim()
            )));
        }
        Ok(cell)
    }

    /// Builds a reference from zero-based row and column indices.
    pub fn from_row_col(row: u32, col: u32) -> Self {
        let mut n = col as u64 + 1;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = ((n - 1) % 26) as u8;
            letters.push(b'A' + rem);
            n = (n - 1) / 26;
        }
        letters.reverse();
        let column = String::from_utf8(letters).unwrap_or_default();
        CellRef(format!("{}{}", column, row as u64 + 1))
    }

    /// Zero-based `(row, col)` when the reference is well-formed.
    pub fn coords(&self) -> Option<(u32, u32)> {
        let split = self.0.find(|c: char| !c.is_ascii_uppercase())?;
        let (letters, digits) = self.0.split_at(split);
        if letters.is_empty() || letters.len() > MAX_COLUMN_LETTERS {
            return None;
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        let col = letters
            .bytes()
            .fold(0u32, |acc, b| acc * 26 + (b - b'A' + 1) as u32);
        Some((row - 1, col - 1))
    }

    pub fn is_valid(&self) -> bool {
        self.coords().is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CellRef {
    fn from(raw: String) -> Self {
        CellRef(canonical(raw.trim().to_uppercase()))
    }
}

/// Drops leading zeros from the row (`A01` -> `A1`) so that equal coordinates
/// are equal strings. Anything else passes through untouched.
fn canonical(cell: String) -> String {
    let Some(split) = cell.find(|c: char| !c.is_ascii_uppercase()) else {
        return cell;
    };
    let (letters, digits) = cell.split_at(split);
    if letters.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return cell;
    }
    let row = digits.trim_start_matches('0');
    if row.is_empty() || row.len() == digits.len() {
        return cell;
    }
    format!("{}{}", letters, row)
}

impl From<&str> for CellRef {
    fn from(raw: &str) -> Self {
        CellRef::from(raw.to_string())
    }
}

impl From<CellRef> for String {
    fn from(cell: CellRef) -> Self {
        cell.0
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Row-major: row first, then column. Malformed references sort after all valid ones.
impl Ord for CellRef {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.coords(), other.coords()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for CellRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A rectangular range such as `A1:Z100`, stored as zero-based inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl CellRange {
    pub fn parse(raw: &str) -> Result<Self> {
        let (from, to) = raw
            .split_once(':')
            .ok_or_else(|| GradeError::Config(format!("'{}' is not a cell range", raw)))?;
        let start = CellRef::from(from)
            .coords()
            .ok_or_else(|| GradeError::Config(format!("'{}' is not a cell reference", from)))?;
        let end = CellRef::from(to)
            .coords()
            .ok_or_else(|| GradeError::Config(format!("'{}' is not a cell reference", to)))?;
        Ok(CellRange {
            start: (start.0.min(end.0), start.1.min(end.1)),
            end: (start.0.max(end.0), start.1.max(end.1)),
        })
    }

    pub fn contains(&self, cell: &CellRef) -> bool {
        match cell.coords() {
            Some((row, col)) => {
                row >= self.start.0 && row <= self.end.0 && col >= self.start.1 && col <= self.end.1
            }
            None => false,
        }
    }
}

impl Default for CellRange {
    /// `A1:Z100`
    fn default() -> Self {
        CellRange { start: (0, 0), end: (99, 25) }
    }
}

/// What a candidate entered into one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CellContent {
    Formula { text: String },
    Number { value: f64 },
    String { value: String },
}

impl CellContent {
    pub fn formula(text: impl Into<String>) -> Self {
        CellContent::Formula { text: text.into() }
    }

    pub fn number(value: f64) -> Self {
        CellContent::Number { value }
    }

    pub fn string(value: impl Into<String>) -> Self {
        CellContent::String { value: value.into() }
    }

    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellContent::Formula { text } => Some(text),
            _ => None,
        }
    }

    /// The cell as text: formula source, number, or the raw string.
    pub fn display_text(&self) -> Cow<'_, str> {
        match self {
            CellContent::Formula { text } => Cow::Borrowed(text),
            CellContent::Number { value } => Cow::Owned(value.to_string()),
            CellContent::String { value } => Cow::Borrowed(value),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellContent::String { value } => value.trim().is_empty(),
            CellContent::Formula { text } => text.trim().is_empty(),
            CellContent::Number { .. } => false,
        }
    }
}

/// Cells of a single sheet, iterated in row-major order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetSnapshot {
    cells: BTreeMap<CellRef, CellContent>,
}

impl SheetSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cell: impl Into<CellRef>, content: CellContent) {
        self.cells.insert(cell.into(), content);
    }

    pub fn with_cell(mut self, cell: &str, content: CellContent) -> Self {
        self.insert(cell, content);
        self
    }

    pub fn get(&self, cell: &CellRef) -> Option<&CellContent> {
        self.cells.get(cell)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellRef, &CellContent)> {
        self.cells.iter()
    }

    /// First non-blank cell inside `range`, scanning row by row.
    pub fn first_in_range(&self, range: &CellRange) -> Option<(&CellRef, &CellContent)> {
        self.cells
            .iter()
            .find(|(cell, content)| range.contains(cell) && !content.is_blank())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSheet {
    pub name: String,
    pub cells: SheetSnapshot,
}

/// Every sheet of a spreadsheet, in the order the backend declared them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookSnapshot {
    pub sheets: Vec<NamedSheet>,
}

impl WorkbookSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for the common single-sheet case.
    pub fn single(name: impl Into<String>, cells: SheetSnapshot) -> Self {
        let mut workbook = Self::new();
        workbook.push_sheet(name, cells);
        workbook
    }

    pub fn push_sheet(&mut self, name: impl Into<String>, cells: SheetSnapshot) {
        self.sheets.push(NamedSheet { name: name.into(), cells });
    }

    /// The first declared sheet; grading never looks past it.
    pub fn primary_sheet(&self) -> Option<&SheetSnapshot> {
        self.sheets.first().map(|sheet| &sheet.cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_ref_normalizes_case_and_whitespace() {
        assert_eq!(CellRef::from(" b2 "), CellRef::from("B2"));
        assert_eq!(CellRef::from("b2").coords(), Some((1, 1)));
    }

    #[test]
    fn test_leading_zero_rows_are_the_same_cell() {
        let padded = CellRef::from("a01");
        assert_eq!(padded.as_str(), "A1");
        assert_eq!(padded, CellRef::from("A1"));
        assert_eq!(padded.cmp(&CellRef::from("A1")), Ordering::Equal);
        assert_eq!(CellRef::from("B007").as_str(), "B7");
        assert_eq!(CellRef::from("A10").as_str(), "A10");
        assert!(!CellRef::from("A00").is_valid());

        let mut sheet = SheetSnapshot::new();
        sheet.insert("A01", CellContent::number(1.0));
        sheet.insert("A1", CellContent::number(2.0));
        assert_eq!(sheet.len(), 1);
        assert_eq!(sheet.get(&CellRef::from("A1")), Some(&CellContent::number(2.0)));
    }

    #[test]
    fn test_cell_ref_from_row_col() {
        assert_eq!(CellRef::from_row_col(0, 0).as_str(), "A1");
        assert_eq!(CellRef::from_row_col(4, 25).as_str(), "Z5");
        assert_eq!(CellRef::from_row_col(0, 26).as_str(), "AA1");
        assert_eq!(CellRef::from_row_col(9, 51).as_str(), "AZ10");
        assert_eq!(CellRef::from_row_col(0, 701).as_str(), "ZZ1");
        assert_eq!(CellRef::from_row_col(0, 702).as_str(), "AAA1");
        assert_eq!(CellRef::from("AAA1").coords(), Some((0, 702)));
    }

    #[test]
    fn test_cell_ref_rejects_garbage() {
        assert!(CellRef::parse("A0").is_err());
        assert!(CellRef::parse("1A").is_err());
        assert!(CellRef::parse("Sheet1!A1").is_err());
        assert!(CellRef::parse("").is_err());
        assert!(CellRef::parse("ABCD1").is_err());
        assert!(CellRef::parse("c10").is_ok());
    }

    #[test]
    fn test_cells_iterate_row_major() {
        let sheet = SheetSnapshot::new()
            .with_cell("B1", CellContent::number(2.0))
            .with_cell("A10", CellContent::number(3.0))
            .with_cell("A2", CellContent::number(1.0));

        let order: Vec<&str> = sheet.iter().map(|(cell, _)| cell.as_str()).collect();
        assert_eq!(order, vec!["B1", "A2", "A10"]);
    }

    #[test]
    fn test_first_in_range_skips_blank_and_out_of_range() {
        let sheet = SheetSnapshot::new()
            .with_cell("A1", CellContent::string("   "))
            .with_cell("AA1", CellContent::string("outside"))
            .with_cell("C2", CellContent::string("b"));

        let (cell, content) = sheet.first_in_range(&CellRange::default()).unwrap();
        assert_eq!(cell.as_str(), "C2");
        assert_eq!(content.display_text(), "b");
    }

    #[test]
    fn test_cell_range_parse() {
        let range = CellRange::parse("A1:Z100").unwrap();
        assert_eq!(range, CellRange::default());
        assert!(CellRange::parse("A1").is_err());
    }

    #[test]
    fn test_primary_sheet_is_first_declared() {
        let mut workbook = WorkbookSnapshot::new();
        workbook.push_sheet("Zeta", SheetSnapshot::new().with_cell("A1", CellContent::number(1.0)));
        workbook.push_sheet("Alpha", SheetSnapshot::new());

        assert_eq!(workbook.primary_sheet().unwrap().len(), 1);
        assert!(WorkbookSnapshot::new().primary_sheet().is_none());
    }

    #[test]
    fn test_cell_content_json_shape() {
        let json = serde_json::json!({ "kind": "formula", "text": "=SUM(A1:A3)" });
        let content: CellContent = serde_json::from_value(json).unwrap();
        assert_eq!(content.formula_text(), Some("=SUM(A1:A3)"));
    }
}
