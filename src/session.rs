// src/session.rs
//! Session score aggregation.

use serde::{Deserialize, Serialize};

/// The two scores a response can carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseScores {
    pub manual_score: Option<f64>,
    pub auto_score: Option<f64>,
}

impl ResponseScores {
    pub fn new(manual_score: Option<f64>, auto_score: Option<f64>) -> Self {
        Self { manual_score, auto_score }
    }

    /// A reviewer's score wins over the automatic one; ungraded counts as 0.
    pub fn effective_score(&self) -> f64 {
        self.manual_score.or(self.auto_score).unwrap_or(0.0)
    }
}

/// Sum of the effective score of every response in a session.
pub fn final_score<'a>(responses: impl IntoIterator<Item = &'a ResponseScores>) -> f64 {
    responses.into_iter().map(ResponseScores::effective_score).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_score_prefers_manual() {
        let responses = [
            ResponseScores::new(None, Some(5.0)),
            ResponseScores::new(Some(7.0), Some(3.0)),
            ResponseScores::new(None, None),
        ];
        assert_eq!(final_score(&responses), 12.0);
    }

    #[test]
    fn test_manual_zero_overrides_auto() {
        let responses = [ResponseScores::new(Some(0.0), Some(9.0))];
        assert_eq!(final_score(&responses), 0.0);
    }

    #[test]
    fn test_empty_session_scores_zero() {
        let none: Vec<ResponseScores> = Vec::new();
        assert_eq!(final_score(&none), 0.0);
    }
}
