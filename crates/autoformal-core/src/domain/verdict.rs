//! Judge verdicts and score parsing.

use serde::{Deserialize, Serialize};

/// Score assumed when the judge returns something unparseable.
pub const FALLBACK_SCORE: u8 = 5;

/// Upper bound of the ordinal scale.
pub const MAX_SCORE: u8 = 10;

/// Per-dimension judge scores on a 1-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeScores {
    pub correctness: u8,
    pub completeness: u8,
    pub proof: u8,
}

impl JudgeScores {
    pub fn uniform(score: u8) -> Self {
        Self {
            correctness: score,
            completeness: score,
            proof: score,
        }
    }

    /// The weakest dimension gates acceptance.
    pub fn aggregate(&self) -> u8 {
        self.correctness.min(self.completeness).min(self.proof)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub scores: JudgeScores,
    pub score: u8,
    pub passed: bool,
    pub rationale: String,
}

impl JudgeVerdict {
    pub fn new(scores: JudgeScores, min_score: u8, rationale: impl Into<String>) -> Self {
        let score = scores.aggregate();
        Self {
            scores,
            score,
            passed: score >= min_score,
            rationale: rationale.into(),
        }
    }

    /// Verdict recorded when the judge call itself failed transiently.
    pub fn unavailable(reason: impl std::fmt::Display, min_score: u8) -> Self {
        Self::new(
            JudgeScores::uniform(0),
            min_score,
            format!("judge unavailable: {reason}"),
        )
    }
}

/// Parse a judge score such as `"7"`, `"7/10"` or `"8.5"`.
pub fn parse_score(raw: &str) -> u8 {
    let head = raw.trim().split('/').next().unwrap_or("").trim();
    match head.parse::<f64>() {
        Ok(value) if value.is_finite() => value.clamp(0.0, MAX_SCORE as f64) as u8,
        _ => FALLBACK_SCORE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score_variants() {
        assert_eq!(parse_score("7"), 7);
        assert_eq!(parse_score(" 7/10 "), 7);
        assert_eq!(parse_score("8.9"), 8);
        assert_eq!(parse_score("42"), 10);
        assert_eq!(parse_score("-3"), 0);
        assert_eq!(parse_score("excellent"), FALLBACK_SCORE);
        assert_eq!(parse_score(""), FALLBACK_SCORE);
    }

    #[test]
    fn test_weakest_dimension_decides() {
        let verdict = JudgeVerdict::new(
            JudgeScores {
                correctness: 9,
                completeness: 6,
                proof: 8,
            },
            7,
            "spec misses the empty-list case",
        );
        assert_eq!(verdict.score, 6);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let verdict = JudgeVerdict::new(JudgeScores::uniform(7), 7, "ok");
        assert!(verdict.passed);
    }
}
