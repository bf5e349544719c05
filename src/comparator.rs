// src/comparator.rs
//! Pure cell comparison rules shared by every question type.

use std::borrow::Cow;

use crate::question::ExpectedValue;
use crate::snapshot::CellContent;

/// Relative tolerance for numeric matches (1% of the expected magnitude).
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Something that can stand on either side of a cell comparison.
pub trait CellScalar {
    /// Numeric coercion; `None` when the value is not a number.
    fn as_number(&self) -> Option<f64>;
    fn as_text(&self) -> Cow<'_, str>;
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

impl CellScalar for CellContent {
    fn as_number(&self) -> Option<f64> {
        match self {
            CellContent::Number { value } => Some(*value),
            CellContent::String { value } => parse_number(value),
            CellContent::Formula { text } => parse_number(text),
        }
    }

    fn as_text(&self) -> Cow<'_, str> {
        self.display_text()
    }
}

impl CellScalar for ExpectedValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            ExpectedValue::Number(n) => Some(*n),
            ExpectedValue::Text(s) => parse_number(s),
            ExpectedValue::Bool(_) => None,
        }
    }

    fn as_text(&self) -> Cow<'_, str> {
        match self {
            ExpectedValue::Number(n) => Cow::Owned(n.to_string()),
            ExpectedValue::Text(s) => Cow::Borrowed(s),
            ExpectedValue::Bool(true) => Cow::Borrowed("TRUE"),
            ExpectedValue::Bool(false) => Cow::Borrowed("FALSE"),
        }
    }
}

impl CellScalar for str {
    fn as_number(&self) -> Option<f64> {
        parse_number(self)
    }

    fn as_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl CellScalar for f64 {
    fn as_number(&self) -> Option<f64> {
        Some(*self)
    }

    fn as_text(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }
}

/// Numeric match within `|expected| * tolerance`; falls back to
/// [`compare_string`] when either side is not a number.
///
/// The allowed distance scales with `expected`, so an expected `0` only
/// accepts an exact `0`.
pub fn compare_numeric<A, E>(actual: &A, expected: &E, tolerance: f64) -> bool
where
    A: CellScalar + ?Sized,
    E: CellScalar + ?Sized,
{
    match (actual.as_number(), expected.as_number()) {
        (Some(a), Some(e)) => (a - e).abs() <= e.abs() * tolerance,
        _ => compare_string(actual, expected),
    }
}

/// Trimmed, case-insensitive equality. Inner whitespace is significant.
pub fn compare_string<A, E>(actual: &A, expected: &E) -> bool
where
    A: CellScalar + ?Sized,
    E: CellScalar + ?Sized,
{
    normalize_token(&actual.as_text()) == normalize_token(&expected.as_text())
}

/// Textual formula match after [`normalize_formula`]. `=SUM(A1:A2)` and
/// `=A1+A2` are different formulas here even though they compute the same.
pub fn compare_formula(actual: &str, expected: &str) -> bool {
    normalize_formula(actual) == normalize_formula(expected)
}

/// Uppercases and removes every whitespace character.
pub fn normalize_formula(formula: &str) -> String {
    formula
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Trims and uppercases a single answer token.
pub fn normalize_token(token: &str) -> String {
    token.trim().to_uppercase()
}

/// Compares a snapshot cell against an expected value. A missing cell never matches.
pub fn compare_cell(actual: Option<&CellContent>, expected: &ExpectedValue, tolerance: f64) -> bool {
    actual.is_some_and(|cell| compare_numeric(cell, expected, tolerance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_tolerance_boundary() {
        assert!(compare_numeric(&101.0, &100.0, DEFAULT_TOLERANCE));
        assert!(compare_numeric(&99.0, &100.0, DEFAULT_TOLERANCE));
        assert!(!compare_numeric(&102.0, &100.0, DEFAULT_TOLERANCE));
        assert!(!compare_numeric(&98.9, &100.0, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_tolerance_is_relative_to_expected() {
        assert!(compare_numeric(&-101.0, &-100.0, DEFAULT_TOLERANCE));
        assert!(compare_numeric(&10_050.0, &10_000.0, DEFAULT_TOLERANCE));
        assert!(!compare_numeric(&0.2, &0.1, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_zero_expected_requires_exact_zero() {
        assert!(compare_numeric(&0.0, &0.0, DEFAULT_TOLERANCE));
        assert!(compare_numeric(&-0.0, &0.0, DEFAULT_TOLERANCE));
        assert!(!compare_numeric(&0.001, &0.0, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_numeric_coerces_text() {
        let actual = CellContent::string(" 42 ");
        assert!(compare_numeric(&actual, &ExpectedValue::Number(42.0), DEFAULT_TOLERANCE));
        assert!(compare_numeric(&CellContent::number(5.0), "5", DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_numeric_falls_through_to_string() {
        let actual = CellContent::string("  Foo ");
        assert!(compare_numeric(&actual, &ExpectedValue::from("foo"), DEFAULT_TOLERANCE));
        assert!(!compare_numeric(&actual, &ExpectedValue::from("bar"), DEFAULT_TOLERANCE));
        assert!(!compare_numeric(&actual, &ExpectedValue::Number(1.0), DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_string_keeps_inner_whitespace() {
        assert!(compare_string("new york", "NEW YORK "));
        assert!(!compare_string("new  york", "new york"));
    }

    #[test]
    fn test_booleans_compare_as_sheet_text() {
        let actual = CellContent::string("true");
        assert!(compare_numeric(&actual, &ExpectedValue::Bool(true), DEFAULT_TOLERANCE));
        assert!(!compare_numeric(&actual, &ExpectedValue::Bool(false), DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_formula_normalization() {
        assert!(compare_formula("=a1+b1", "=A1 + B1"));
        assert!(compare_formula("= SUM( A1 : A3 )", "=sum(a1:a3)"));
        assert!(compare_formula("=A1\t+\nB1", "=A1+B1"));
        assert!(!compare_formula("=SUM(A1:A2)", "=A1+A2"));
        assert_eq!(normalize_formula("=vlookup( a1 , b:c , 2 )"), "=VLOOKUP(A1,B:C,2)");
    }

    #[test]
    fn test_missing_cell_never_matches() {
        assert!(!compare_cell(None, &ExpectedValue::Number(0.0), DEFAULT_TOLERANCE));
        assert!(compare_cell(
            Some(&CellContent::number(0.0)),
            &ExpectedValue::Number(0.0),
            DEFAULT_TOLERANCE
        ));
    }
}
