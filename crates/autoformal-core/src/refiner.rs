//! Bounded compile/repair loop over the proof fields of an artifact.
//!
//! One call to [`Refiner::refine`] is an *episode*. Episode 0 is the initial
//! pass after translation; the judge opens later episodes with a critique.
//! Every repair request counts against the episode's attempt budget,
//! including requests that failed transiently.

use std::sync::Arc;

use tracing::debug;

use crate::config::{ModelConfig, RefineConfig};
use crate::domain::artifact::{ArtifactField, FormalizationArtifact};
use crate::domain::diagnostic::CompileDiagnostic;
use crate::domain::result::RefinementAttempt;
use crate::domain::work_item::TaskContext;
use crate::lean::{clean_output, render_lean_file, render_with_proof_placeholder};
use crate::obs::{self, ItemStage};
use crate::prompts::{self, fields};
use crate::services::{CompilerOracle, GenerationClient, GenerationOutput, ServiceError};

/// How an episode begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeStart {
    /// Compile the artifact as it stands.
    Compile,
    /// Revise the proof against a judge critique before compiling.
    Revise { critique: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineFault {
    /// Non-retryable service error.
    Service(ServiceError),
    /// The artifact cannot be submitted to the compiler at all.
    MalformedArtifact(String),
}

impl RefineFault {
    /// Hard faults end the item; malformed artifacts only end the episode.
    pub fn is_hard(&self) -> bool {
        matches!(self, RefineFault::Service(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineOutcome {
    Verified,
    Exhausted,
    Fatal(RefineFault),
}

#[derive(Debug, Clone)]
pub struct RefineReport {
    pub episode: u32,
    pub outcome: RefineOutcome,
    /// Repair attempts consumed.
    pub iterations: u32,
    pub attempts: Vec<RefinementAttempt>,
    pub last_diagnostic: Option<CompileDiagnostic>,
}

impl RefineReport {
    pub fn is_verified(&self) -> bool {
        self.outcome == RefineOutcome::Verified
    }
}

enum RefineState {
    Compiling,
    Repairing(Option<CompileDiagnostic>),
}

pub struct Refiner {
    oracle: Arc<dyn CompilerOracle>,
    generator: Arc<dyn GenerationClient>,
    model: ModelConfig,
    config: RefineConfig,
}

impl Refiner {
    pub fn new(
        oracle: Arc<dyn CompilerOracle>,
        generator: Arc<dyn GenerationClient>,
        model: ModelConfig,
        config: RefineConfig,
    ) -> Self {
        Self {
            oracle,
            generator,
            model,
            config,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.config.max_iterations
    }

    /// Run one episode. Only proof fields of `artifact` are rewritten.
    pub async fn refine(
        &self,
        artifact: &mut FormalizationArtifact,
        ctx: &TaskContext<'_>,
        episode: u32,
        start: EpisodeStart,
    ) -> RefineReport {
        let mut report = RefineReport {
            episode,
            outcome: RefineOutcome::Exhausted,
            iterations: 0,
            attempts: Vec::new(),
            last_diagnostic: None,
        };

        if let Some(field) = artifact.missing_required() {
            report.outcome = RefineOutcome::Fatal(RefineFault::MalformedArtifact(format!(
                "artifact has no {field}"
            )));
            return report;
        }

        let (mut state, critique) = match start {
            EpisodeStart::Compile => (RefineState::Compiling, None),
            EpisodeStart::Revise { critique } => (RefineState::Repairing(None), Some(critique)),
        };
        let max = self.config.max_iterations;

        loop {
            state = match state {
                RefineState::Compiling => {
                    let source = render_lean_file(ctx.signature, artifact);
                    let diagnostic = match self.oracle.compile(&source).await {
                        Ok(diagnostic) => diagnostic,
                        Err(err) if err.is_transient() => {
                            obs::emit_transient_fault(ctx.item_id, ItemStage::Refining, &err);
                            CompileDiagnostic::from_service_error(&err)
                        }
                        Err(err) => {
                            report.outcome = RefineOutcome::Fatal(RefineFault::Service(err));
                            return report;
                        }
                    };
                    let compiled = diagnostic.is_success();
                    obs::emit_refine_attempt(ctx.item_id, episode, report.iterations, compiled);
                    report.last_diagnostic = Some(diagnostic.clone());
                    if compiled {
                        report.outcome = RefineOutcome::Verified;
                        return report;
                    }
                    RefineState::Repairing(Some(diagnostic))
                }
                RefineState::Repairing(diagnostic) => {
                    if report.iterations >= max {
                        report.outcome = RefineOutcome::Exhausted;
                        return report;
                    }
                    report.iterations += 1;
                    let attempt = report.iterations;

                    let template = render_with_proof_placeholder(ctx.signature, artifact);
                    let feedback = diagnostic
                        .as_ref()
                        .map(|d| d.render_feedback(self.config.feedback_messages));
                    let prompt = prompts::repair_prompt(
                        ctx,
                        &template,
                        artifact,
                        feedback.as_deref(),
                        critique.as_deref(),
                    );
                    debug!(item_id = %ctx.item_id, episode, attempt, "requesting proof repair");

                    match self.generator.generate(&self.model, &prompt).await {
                        Ok(output) => {
                            apply_repair(artifact, &output, episode, attempt);
                            report.attempts.push(RefinementAttempt {
                                episode,
                                attempt,
                                diagnostic,
                                snapshot: artifact.clone(),
                            });
                            RefineState::Compiling
                        }
                        Err(err) if err.is_transient() => {
                            obs::emit_transient_fault(ctx.item_id, ItemStage::Refining, &err);
                            report.attempts.push(RefinementAttempt {
                                episode,
                                attempt,
                                diagnostic: diagnostic.clone(),
                                snapshot: artifact.clone(),
                            });
                            RefineState::Repairing(diagnostic)
                        }
                        Err(err) => {
                            report.outcome = RefineOutcome::Fatal(RefineFault::Service(err));
                            return report;
                        }
                    }
                }
            };
        }
    }
}

/// Install the revised proof fields. Anything else in the output is ignored,
/// and an empty proof keeps the previous one.
fn apply_repair(
    artifact: &mut FormalizationArtifact,
    output: &GenerationOutput,
    episode: u32,
    attempt: u32,
) {
    let imports = clean_output(output.field(fields::IMPORTS));
    if !imports.is_empty() {
        artifact.revise(ArtifactField::ProofImports, imports, episode, attempt);
    }
    artifact.revise(
        ArtifactField::ProofAux,
        clean_output(output.field(fields::PROOF_AUX)),
        episode,
        attempt,
    );
    let proof = clean_output(output.field(fields::PROOF));
    if !proof.is_empty() {
        artifact.revise(ArtifactField::Proof, proof, episode, attempt);
    }
}
