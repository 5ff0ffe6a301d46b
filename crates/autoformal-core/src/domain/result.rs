//! Terminal per-item records and refinement telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::artifact::FormalizationArtifact;
use crate::domain::diagnostic::CompileDiagnostic;
use crate::signature::Signature;

/// Terminal status of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Judge accepted a compiling artifact.
    Success,
    /// A compiling artifact exists but the judge never accepted it.
    PartialSuccess,
    /// No compiling artifact was ever produced.
    Exhausted,
    /// Unrecoverable error at some stage.
    Fatal,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Success => "success",
            ItemStatus::PartialSuccess => "partial_success",
            ItemStatus::Exhausted => "exhausted",
            ItemStatus::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Iterations consumed at each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationCounts {
    /// Repair attempts in the initial refinement pass.
    pub refine: u32,
    /// Judge scoring rounds.
    pub judge: u32,
    /// Repair attempts spent in judge-triggered episodes.
    pub judge_refine: u32,
}

/// One repair attempt inside a refinement episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementAttempt {
    pub episode: u32,
    pub attempt: u32,
    /// Diagnostic that triggered the repair; `None` when the episode was
    /// opened from a judge critique.
    pub diagnostic: Option<CompileDiagnostic>,
    pub snapshot: FormalizationArtifact,
}

/// Terminal record for one work item. Produced exactly once per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub item_id: String,
    pub status: ItemStatus,
    pub artifact: Option<FormalizationArtifact>,
    pub signature: Option<Signature>,
    pub counts: IterationCounts,
    /// Whether `artifact` passed the compiler.
    pub compiled: bool,
    pub judge_score: Option<u8>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ItemResult {
    /// Fatal record for an item that never produced a usable run.
    pub fn fatal(item_id: impl Into<String>, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            item_id: item_id.into(),
            status: ItemStatus::Fatal,
            artifact: None,
            signature: None,
            counts: IterationCounts::default(),
            compiled: false,
            judge_score: None,
            error: Some(error.into()),
            started_at: now,
            finished_at: now,
        }
    }

    /// Resolved items are skipped when a batch is resumed.
    pub fn is_resolved(&self) -> bool {
        self.status != ItemStatus::Fatal
    }
}
