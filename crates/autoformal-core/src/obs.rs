//! Structured lifecycle events for item runs and batches.
//!
//! Every event carries an `event` field (`item.started`, `refine.attempt`,
//! ...) so log pipelines can filter on it without parsing messages.

use tracing::{info, warn};

use crate::domain::result::{ItemResult, ItemStatus};
use crate::domain::verdict::JudgeVerdict;

/// Coarse position of an item inside the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
    Translating,
    Refining,
    Judging,
    Done,
}

impl ItemStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStage::Translating => "translating",
            ItemStage::Refining => "refining",
            ItemStage::Judging => "judging",
            ItemStage::Done => "done",
        }
    }
}

/// Span tagged with the item id; attach it to async work with
/// `tracing::Instrument`.
pub fn item_span(item_id: &str) -> tracing::Span {
    tracing::info_span!("autoformal.item", item_id = %item_id)
}

pub fn emit_item_started(item_id: &str, function: &str) {
    info!(event = "item.started", item_id = %item_id, function = %function);
}

pub fn emit_stage_transition(item_id: &str, from: ItemStage, to: ItemStage) {
    info!(
        event = "item.stage",
        item_id = %item_id,
        from = from.as_str(),
        to = to.as_str(),
    );
}

/// One compile result inside a refinement episode.
pub fn emit_refine_attempt(item_id: &str, episode: u32, attempt: u32, compiled: bool) {
    info!(
        event = "refine.attempt",
        item_id = %item_id,
        episode = episode,
        attempt = attempt,
        compiled = compiled,
    );
}

pub fn emit_judge_verdict(item_id: &str, round: u32, verdict: &JudgeVerdict) {
    info!(
        event = "judge.verdict",
        item_id = %item_id,
        round = round,
        correctness = verdict.scores.correctness,
        completeness = verdict.scores.completeness,
        proof = verdict.scores.proof,
        score = verdict.score,
        passed = verdict.passed,
    );
}

/// A transient service fault absorbed by a loop.
pub fn emit_transient_fault(item_id: &str, stage: ItemStage, error: &dyn std::fmt::Display) {
    warn!(
        event = "item.transient_fault",
        item_id = %item_id,
        stage = stage.as_str(),
        error = %error,
    );
}

pub fn emit_item_finished(result: &ItemResult, duration_ms: u64) {
    if result.status != ItemStatus::Fatal {
        info!(
            event = "item.finished",
            item_id = %result.item_id,
            status = result.status.as_str(),
            compiled = result.compiled,
            refine = result.counts.refine,
            judge = result.counts.judge,
            judge_refine = result.counts.judge_refine,
            duration_ms = duration_ms,
        );
    } else {
        warn!(
            event = "item.finished",
            item_id = %result.item_id,
            status = result.status.as_str(),
            error = result.error.as_deref().unwrap_or(""),
            duration_ms = duration_ms,
        );
    }
}

pub fn emit_batch_finished(total: usize, succeeded: usize, fatal: usize, duration_ms: u64) {
    info!(
        event = "batch.finished",
        total = total,
        succeeded = succeeded,
        fatal = fatal,
        duration_ms = duration_ms,
    );
}
