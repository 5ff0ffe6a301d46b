//! Batch-level totals.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::result::{ItemResult, ItemStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub partial_success: usize,
    pub exhausted: usize,
    pub fatal: usize,
    /// Items whose final artifact compiled.
    pub compiled: usize,
    pub compile_rate: f64,
    /// Mean final judge score over items that were judged.
    pub mean_judge_score: Option<f64>,
    pub total_refine_iterations: u64,
    pub total_judge_rounds: u64,
}

impl BatchSummary {
    pub fn from_results(results: &[ItemResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        let mut score_sum = 0u64;
        let mut scored = 0u64;

        for result in results {
            match result.status {
                ItemStatus::Success => summary.success += 1,
                ItemStatus::PartialSuccess => summary.partial_success += 1,
                ItemStatus::Exhausted => summary.exhausted += 1,
                ItemStatus::Fatal => summary.fatal += 1,
            }
            if result.compiled {
                summary.compiled += 1;
            }
            if let Some(score) = result.judge_score {
                score_sum += u64::from(score);
                scored += 1;
            }
            summary.total_refine_iterations +=
                u64::from(result.counts.refine) + u64::from(result.counts.judge_refine);
            summary.total_judge_rounds += u64::from(result.counts.judge);
        }

        if summary.total > 0 {
            summary.compile_rate = summary.compiled as f64 / summary.total as f64;
        }
        if scored > 0 {
            summary.mean_judge_score = Some(score_sum as f64 / scored as f64);
        }
        summary
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "items:            {}", self.total)?;
        writeln!(f, "  success:        {}", self.success)?;
        writeln!(f, "  partial:        {}", self.partial_success)?;
        writeln!(f, "  exhausted:      {}", self.exhausted)?;
        writeln!(f, "  fatal:          {}", self.fatal)?;
        writeln!(
            f,
            "compiled:         {} ({:.1}%)",
            self.compiled,
            self.compile_rate * 100.0
        )?;
        match self.mean_judge_score {
            Some(mean) => write!(f, "mean judge score: {mean:.2}"),
            None => write!(f, "mean judge score: n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, status: ItemStatus, compiled: bool, score: Option<u8>) -> ItemResult {
        let mut r = ItemResult::fatal(id, "");
        r.status = status;
        r.compiled = compiled;
        r.judge_score = score;
        r.error = None;
        r
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            result("a", ItemStatus::Success, true, Some(8)),
            result("b", ItemStatus::PartialSuccess, true, Some(5)),
            result("c", ItemStatus::Exhausted, false, None),
            result("d", ItemStatus::Fatal, false, None),
        ];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.partial_success, 1);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.fatal, 1);
        assert_eq!(summary.compiled, 2);
        assert!((summary.compile_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.mean_judge_score, Some(6.5));
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.compile_rate, 0.0);
        assert!(summary.mean_judge_score.is_none());
        assert!(summary.to_string().contains("n/a"));
    }
}
