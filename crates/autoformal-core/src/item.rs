//! Per-item state machine: translate, refine, judge.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::Instrument;

use crate::batch::ItemRunner;
use crate::config::PipelineConfig;
use crate::domain::artifact::FormalizationArtifact;
use crate::domain::result::{ItemResult, ItemStatus, IterationCounts};
use crate::domain::work_item::WorkItem;
use crate::judge::{Judge, JudgeOutcome};
use crate::obs::{self, ItemStage};
use crate::refiner::{EpisodeStart, RefineFault, RefineOutcome, Refiner};
use crate::services::{CompilerOracle, GenerationClient};
use crate::signature::Signature;
use crate::translator::Translator;

/// Drives one work item through every stage and always yields a result.
pub struct FormalizationPipeline {
    translator: Translator,
    refiner: Refiner,
    judge: Judge,
    judge_enabled: bool,
}

impl FormalizationPipeline {
    pub fn new(
        config: &PipelineConfig,
        oracle: Arc<dyn CompilerOracle>,
        generator: Arc<dyn GenerationClient>,
    ) -> Self {
        let models = &config.models;
        Self {
            translator: Translator::new(Arc::clone(&generator), models.translate.clone()),
            refiner: Refiner::new(
                oracle,
                Arc::clone(&generator),
                models.refine.clone(),
                config.refine.clone(),
            ),
            judge: Judge::new(
                generator,
                models.judge.clone(),
                models.refine.clone(),
                config.judge.clone(),
            ),
            judge_enabled: config.judge.enabled,
        }
    }

    pub async fn run(&self, item: &WorkItem) -> ItemResult {
        let span = obs::item_span(&item.id);
        self.run_inner(item).instrument(span).await
    }

    async fn run_inner(&self, item: &WorkItem) -> ItemResult {
        let clock = Instant::now();
        let mut run = ItemRun::new(item);

        let signature = match item.resolve_signature() {
            Ok(signature) => signature,
            Err(err) => return run.finish(ItemStatus::Fatal, Some(err.to_string()), clock),
        };
        obs::emit_item_started(&item.id, &signature.name);
        run.signature = Some(signature.clone());

        let mut artifact = match self.translator.translate(item, &signature).await {
            Ok(artifact) => artifact,
            Err(failure) => {
                run.artifact = Some(failure.partial.clone());
                return run.finish(ItemStatus::Fatal, Some(failure.to_string()), clock);
            }
        };

        let ctx = item.context(&signature);
        run.enter(ItemStage::Refining);
        let initial = self
            .refiner
            .refine(&mut artifact, &ctx, 0, EpisodeStart::Compile)
            .await;
        run.counts.refine = initial.iterations;

        // An exhausted first episode still goes to the judge: a critique-led
        // revision can reach a compiling proof.
        match initial.outcome {
            RefineOutcome::Verified => run.compiled = true,
            RefineOutcome::Exhausted => {}
            RefineOutcome::Fatal(fault) => {
                run.artifact = Some(artifact);
                let detail = match fault {
                    RefineFault::Service(err) => err.to_string(),
                    RefineFault::MalformedArtifact(reason) => reason,
                };
                return run.finish(ItemStatus::Fatal, Some(detail), clock);
            }
        }

        if !self.judge_enabled {
            run.artifact = Some(artifact);
            let status = if run.compiled {
                ItemStatus::Success
            } else {
                ItemStatus::Exhausted
            };
            return run.finish(status, None, clock);
        }

        run.enter(ItemStage::Judging);
        let report = self
            .judge
            .improve(&mut artifact, &ctx, &self.refiner, run.compiled)
            .await;
        run.counts.judge = report.rounds;
        run.counts.judge_refine = report.refine_iterations;
        run.compiled = report.compiled;
        run.judge_score = report.final_score;
        run.artifact = Some(artifact);

        match report.outcome {
            JudgeOutcome::Fatal(err) => run.finish(ItemStatus::Fatal, Some(err.to_string()), clock),
            _ if !run.compiled => run.finish(ItemStatus::Exhausted, None, clock),
            JudgeOutcome::Accepted { compiled: true } | JudgeOutcome::Skipped => {
                run.finish(ItemStatus::Success, None, clock)
            }
            JudgeOutcome::Accepted { compiled: false } => run.finish(
                ItemStatus::PartialSuccess,
                Some("accepted revision did not compile".to_string()),
                clock,
            ),
            JudgeOutcome::Rejected => run.finish(ItemStatus::PartialSuccess, None, clock),
        }
    }
}

#[async_trait]
impl ItemRunner for FormalizationPipeline {
    async fn run_item(&self, item: &WorkItem) -> ItemResult {
        self.run(item).await
    }
}

/// Accumulates what one run has produced so far.
struct ItemRun {
    item_id: String,
    stage: ItemStage,
    started_at: chrono::DateTime<Utc>,
    signature: Option<Signature>,
    artifact: Option<FormalizationArtifact>,
    counts: IterationCounts,
    compiled: bool,
    judge_score: Option<u8>,
}

impl ItemRun {
    fn new(item: &WorkItem) -> Self {
        Self {
            item_id: item.id.clone(),
            stage: ItemStage::Translating,
            started_at: Utc::now(),
            signature: None,
            artifact: None,
            counts: IterationCounts::default(),
            compiled: false,
            judge_score: None,
        }
    }

    fn enter(&mut self, stage: ItemStage) {
        obs::emit_stage_transition(&self.item_id, self.stage, stage);
        self.stage = stage;
    }

    fn finish(mut self, status: ItemStatus, error: Option<String>, clock: Instant) -> ItemResult {
        self.enter(ItemStage::Done);
        let result = ItemResult {
            item_id: self.item_id,
            status,
            artifact: self.artifact,
            signature: self.signature,
            counts: self.counts,
            compiled: self.compiled,
            judge_score: self.judge_score,
            error,
            started_at: self.started_at,
            finished_at: Utc::now(),
        };
        obs::emit_item_finished(&result, clock.elapsed().as_millis() as u64);
        result
    }
}
