//! Domain models for the formalization engine.
//!
//! - `WorkItem`: immutable solved task
//! - `FormalizationArtifact`: Lean code, spec and proof with provenance
//! - `CompileDiagnostic`: compiler oracle output
//! - `JudgeVerdict`: judge scores
//! - `ItemResult`: terminal per-item record

pub mod artifact;
pub mod diagnostic;
pub mod error;
pub mod result;
pub mod verdict;
pub mod work_item;

pub use artifact::{ArtifactField, FormalizationArtifact, Provenance};
pub use diagnostic::{CompileDiagnostic, CompileOutcome, DiagnosticMessage, Severity, SourceLocation};
pub use error::{FormalizeError, Result, SignatureError};
pub use result::{ItemResult, ItemStatus, IterationCounts, RefinementAttempt};
pub use verdict::{parse_score, JudgeScores, JudgeVerdict};
pub use work_item::{TaskContext, WorkItem};
