//! Autoformal Core Library
//!
//! Turns solved programming tasks into Lean 4 code, specification and proof.
//! Each item is translated once, refined against compiler diagnostics,
//! then scored by a judge that can trigger further refinement. The batch
//! driver runs many items under a concurrency cap.

pub mod batch;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod item;
pub mod judge;
pub mod lean;
pub mod obs;
pub mod persist;
pub mod prompts;
pub mod refiner;
pub mod services;
pub mod signature;
pub mod summary;
pub mod telemetry;
pub mod translator;

pub use batch::{BatchDriver, ItemRunner};
pub use config::{
    BatchConfig, CompilerConfig, JudgeConfig, ModelConfig, ModelsConfig, OutputConfig,
    PipelineConfig, RefineConfig,
};
pub use domain::{
    ArtifactField, CompileDiagnostic, CompileOutcome, DiagnosticMessage, FormalizationArtifact,
    FormalizeError, ItemResult, ItemStatus, IterationCounts, JudgeScores, JudgeVerdict,
    Provenance, RefinementAttempt, Result, Severity, SignatureError, SourceLocation, TaskContext,
    WorkItem,
};
pub use item::FormalizationPipeline;
pub use judge::{Judge, JudgeOutcome, JudgeReport};
pub use lean::{render_lean_file, render_with_proof_placeholder};
pub use persist::ResultStore;
pub use refiner::{EpisodeStart, RefineFault, RefineOutcome, RefineReport, Refiner};
pub use services::{
    CompilerOracle, GenerationClient, GenerationOutput, OutputField, PromptKind, PromptSpec,
    ServiceError, ServiceKind,
};
pub use signature::{python_type_to_lean, Parameter, Signature};
pub use summary::BatchSummary;
pub use translator::{TranslateStep, TranslationFailure, Translator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
