//! Judge loop: score, reflect, re-refine.
//!
//! Each round scores the current artifact. A passing score ends the loop on
//! that round. Otherwise a critique is derived from the rationale and a new
//! refinement episode revises the proof against it, until the round budget
//! runs out. On rejection the best-scoring compiled candidate is restored,
//! later candidates winning ties.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{JudgeConfig, ModelConfig};
use crate::domain::artifact::FormalizationArtifact;
use crate::domain::verdict::{parse_score, JudgeScores, JudgeVerdict};
use crate::domain::work_item::TaskContext;
use crate::lean::render_lean_file;
use crate::obs::{self, ItemStage};
use crate::prompts::{self, fields};
use crate::refiner::{EpisodeStart, RefineFault, RefineOutcome, Refiner};
use crate::services::{GenerationClient, ServiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JudgeOutcome {
    /// A round met the threshold. `compiled` says whether the accepted
    /// revision itself compiled.
    Accepted { compiled: bool },
    /// The round budget ran out below the threshold.
    Rejected,
    /// The round budget was zero.
    Skipped,
    /// A non-retryable service error.
    Fatal(ServiceError),
}

#[derive(Debug, Clone)]
pub struct JudgeReport {
    pub outcome: JudgeOutcome,
    /// Scoring rounds performed.
    pub rounds: u32,
    /// Repair attempts spent in judge-opened episodes.
    pub refine_iterations: u32,
    pub verdicts: Vec<JudgeVerdict>,
    /// Whether the artifact left behind compiles.
    pub compiled: bool,
    /// Score of the artifact left behind, when it was scored.
    pub final_score: Option<u8>,
}

struct Candidate {
    score: u8,
    artifact: FormalizationArtifact,
}

pub struct Judge {
    generator: Arc<dyn GenerationClient>,
    judge_model: ModelConfig,
    reflect_model: ModelConfig,
    config: JudgeConfig,
}

impl Judge {
    pub fn new(
        generator: Arc<dyn GenerationClient>,
        judge_model: ModelConfig,
        reflect_model: ModelConfig,
        config: JudgeConfig,
    ) -> Self {
        Self {
            generator,
            judge_model,
            reflect_model,
            config,
        }
    }

    /// Run the judge loop on an artifact whose compile state is `compiled`.
    /// Refinement episodes are numbered from 1.
    pub async fn improve(
        &self,
        artifact: &mut FormalizationArtifact,
        ctx: &TaskContext<'_>,
        refiner: &Refiner,
        compiled: bool,
    ) -> JudgeReport {
        let mut report = JudgeReport {
            outcome: JudgeOutcome::Skipped,
            rounds: 0,
            refine_iterations: 0,
            verdicts: Vec::new(),
            compiled,
            final_score: None,
        };
        if self.config.max_iterations == 0 {
            return report;
        }

        let mut best: Option<Candidate> = None;

        loop {
            report.rounds += 1;
            let lean = render_lean_file(ctx.signature, artifact);

            let verdict = match self.score(ctx, &lean).await {
                Ok(verdict) => verdict,
                Err(err) if err.is_transient() => {
                    obs::emit_transient_fault(ctx.item_id, ItemStage::Judging, &err);
                    JudgeVerdict::unavailable(&err, self.config.min_score)
                }
                Err(err) => {
                    report.outcome = JudgeOutcome::Fatal(err);
                    return report;
                }
            };
            obs::emit_judge_verdict(ctx.item_id, report.rounds, &verdict);
            report.final_score = Some(verdict.score);

            if report.compiled
                && best
                    .as_ref()
                    .map_or(true, |b| verdict.score >= b.score)
            {
                best = Some(Candidate {
                    score: verdict.score,
                    artifact: artifact.clone(),
                });
            }

            report.verdicts.push(verdict.clone());

            if verdict.passed {
                let accepted_compiled = report.compiled;
                if !accepted_compiled {
                    restore(artifact, &mut report, best.take());
                }
                report.outcome = JudgeOutcome::Accepted {
                    compiled: accepted_compiled,
                };
                return report;
            }

            if report.rounds >= self.config.max_iterations {
                restore(artifact, &mut report, best.take());
                report.outcome = JudgeOutcome::Rejected;
                return report;
            }

            let critique = match self.reflect(ctx, &lean, &verdict).await {
                Ok(critique) if !critique.is_empty() => critique,
                Ok(_) => verdict.rationale,
                Err(err) if err.is_transient() => {
                    obs::emit_transient_fault(ctx.item_id, ItemStage::Judging, &err);
                    verdict.rationale
                }
                Err(err) => {
                    report.outcome = JudgeOutcome::Fatal(err);
                    return report;
                }
            };

            obs::emit_stage_transition(ctx.item_id, ItemStage::Judging, ItemStage::Refining);
            let episode = refiner
                .refine(artifact, ctx, report.rounds, EpisodeStart::Revise { critique })
                .await;
            report.refine_iterations += episode.iterations;
            obs::emit_stage_transition(ctx.item_id, ItemStage::Refining, ItemStage::Judging);

            match episode.outcome {
                RefineOutcome::Verified => report.compiled = true,
                RefineOutcome::Exhausted => report.compiled = false,
                RefineOutcome::Fatal(RefineFault::Service(err)) => {
                    report.compiled = false;
                    report.outcome = JudgeOutcome::Fatal(err);
                    return report;
                }
                RefineOutcome::Fatal(fault) => {
                    debug!(item_id = %ctx.item_id, ?fault, "judge episode ended without compiling");
                    report.compiled = false;
                }
            }
        }
    }

    async fn score(&self, ctx: &TaskContext<'_>, lean: &str) -> Result<JudgeVerdict, ServiceError> {
        let prompt = prompts::judge_prompt(ctx, lean);
        let output = self.generator.generate(&self.judge_model, &prompt).await?;
        let scores = JudgeScores {
            correctness: parse_score(output.field(fields::CORRECTNESS)),
            completeness: parse_score(output.field(fields::COMPLETENESS)),
            proof: parse_score(output.field(fields::PROOF_SCORE)),
        };
        Ok(JudgeVerdict::new(
            scores,
            self.config.min_score,
            output.field(fields::FEEDBACK),
        ))
    }

    async fn reflect(
        &self,
        ctx: &TaskContext<'_>,
        lean: &str,
        verdict: &JudgeVerdict,
    ) -> Result<String, ServiceError> {
        let prompt = prompts::reflect_prompt(ctx, lean, verdict);
        let output = self.generator.generate(&self.reflect_model, &prompt).await?;
        Ok(output.field(fields::CRITIQUE).trim().to_string())
    }
}

/// Put the best compiled candidate back in place, if there is one.
fn restore(
    artifact: &mut FormalizationArtifact,
    report: &mut JudgeReport,
    best: Option<Candidate>,
) {
    if let Some(candidate) = best {
        info!(score = candidate.score, "restoring best compiled candidate");
        *artifact = candidate.artifact;
        report.compiled = true;
        report.final_score = Some(candidate.score);
    }
}
