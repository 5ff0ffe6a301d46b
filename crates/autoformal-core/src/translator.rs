//! One-shot translation of a solved item into an initial Lean artifact.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::ModelConfig;
use crate::domain::artifact::{ArtifactField, FormalizationArtifact};
use crate::domain::error::FormalizeError;
use crate::domain::work_item::{TaskContext, WorkItem};
use crate::lean::{clean_output, merge_imports, render_with_proof_placeholder};
use crate::prompts::{self, fields};
use crate::services::{GenerationClient, GenerationOutput, PromptSpec};
use crate::signature::Signature;

/// Generation step that was running when translation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateStep {
    Code,
    Spec,
    Proof,
}

impl fmt::Display for TranslateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateStep::Code => f.write_str("code"),
            TranslateStep::Spec => f.write_str("spec"),
            TranslateStep::Proof => f.write_str("proof"),
        }
    }
}

/// Translation failed; the item is fatal but keeps what was produced.
#[derive(Debug)]
pub struct TranslationFailure {
    pub step: TranslateStep,
    pub error: FormalizeError,
    pub partial: FormalizationArtifact,
}

impl fmt::Display for TranslationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "translation failed at {} step: {}", self.step, self.error)
    }
}

pub struct Translator {
    generator: Arc<dyn GenerationClient>,
    model: ModelConfig,
}

impl Translator {
    pub fn new(generator: Arc<dyn GenerationClient>, model: ModelConfig) -> Self {
        Self { generator, model }
    }

    /// Produce code, then a specification that sees the code, then a proof
    /// that sees both. The returned artifact is sealed.
    pub async fn translate(
        &self,
        item: &WorkItem,
        signature: &Signature,
    ) -> Result<FormalizationArtifact, TranslationFailure> {
        let ctx = item.context(signature);
        let mut artifact = FormalizationArtifact::new();
        if let Some(aux) = item.proof_aux.as_deref().filter(|a| !a.trim().is_empty()) {
            artifact.pin(ArtifactField::ProofAux, aux);
        }

        let step = TranslateStep::Code;
        let out = self
            .call(prompts::code_prompt(&ctx), &ctx, step)
            .await
            .map_err(|error| fail(step, error, &artifact))?;
        fill(
            &mut artifact,
            &[
                (ArtifactField::Imports, out.field(fields::IMPORTS)),
                (ArtifactField::CodeAux, out.field(fields::CODE_AUX)),
                (ArtifactField::Code, out.field(fields::CODE)),
            ],
        )
        .map_err(|error| fail(step, error, &artifact))?;

        let step = TranslateStep::Spec;
        let out = self
            .call(prompts::spec_prompt(&ctx, &item.tests, &artifact), &ctx, step)
            .await
            .map_err(|error| fail(step, error, &artifact))?;
        let imports = merge_imports([
            artifact.imports(),
            clean_output(out.field(fields::IMPORTS)).as_str(),
        ]);
        fill(
            &mut artifact,
            &[
                (ArtifactField::Imports, imports.as_str()),
                (ArtifactField::PrecondAux, out.field(fields::PRECOND_AUX)),
                (ArtifactField::Precond, out.field(fields::PRECOND)),
                (ArtifactField::PostcondAux, out.field(fields::POSTCOND_AUX)),
                (ArtifactField::Postcond, out.field(fields::POSTCOND)),
            ],
        )
        .map_err(|error| fail(step, error, &artifact))?;

        // Code and specification are final from here on.
        artifact.seal();

        let step = TranslateStep::Proof;
        let template = render_with_proof_placeholder(signature, &artifact);
        let out = self
            .call(prompts::proof_prompt(&ctx, &template), &ctx, step)
            .await
            .map_err(|error| fail(step, error, &artifact))?;
        fill(
            &mut artifact,
            &[
                (ArtifactField::ProofImports, out.field(fields::IMPORTS)),
                (ArtifactField::ProofAux, out.field(fields::PROOF_AUX)),
                (ArtifactField::Proof, out.field(fields::PROOF)),
            ],
        )
        .map_err(|error| fail(step, error, &artifact))?;

        debug!(item_id = %ctx.item_id, "translation complete");
        Ok(artifact)
    }

    async fn call(
        &self,
        prompt: PromptSpec,
        ctx: &TaskContext<'_>,
        step: TranslateStep,
    ) -> Result<GenerationOutput, FormalizeError> {
        debug!(item_id = %ctx.item_id, step = %step, model = %self.model.label(), "translating");
        Ok(self.generator.generate(&self.model, &prompt).await?)
    }
}

fn fail(step: TranslateStep, error: FormalizeError, partial: &FormalizationArtifact) -> TranslationFailure {
    TranslationFailure {
        step,
        error,
        partial: partial.clone(),
    }
}

/// Write cleaned generation outputs; empty outputs leave their field untouched.
fn fill(
    artifact: &mut FormalizationArtifact,
    outputs: &[(ArtifactField, &str)],
) -> Result<(), FormalizeError> {
    for (field, raw) in outputs {
        let value = clean_output(raw);
        if !value.is_empty() {
            artifact.set_baseline(*field, value)?;
        }
    }
    Ok(())
}
