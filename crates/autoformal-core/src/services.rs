//! Contracts for the external services the engine depends on.
//!
//! The engine never talks to a compiler or a model directly. It goes
//! through [`CompilerOracle`] and [`GenerationClient`], so tests can swap in
//! the scripted fakes from [`crate::fakes`].

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::domain::diagnostic::CompileDiagnostic;

/// Which external dependency raised a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Generation,
    Compiler,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Generation => f.write_str("generation"),
            ServiceKind::Compiler => f.write_str("compiler"),
        }
    }
}

/// Fault raised by an external service.
///
/// Transient faults may succeed on retry and are absorbed inside the
/// refinement and judge budgets. Fatal faults end the item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} transient fault: {message}")]
    Transient { service: ServiceKind, message: String },

    #[error("{service} fatal fault: {message}")]
    Fatal { service: ServiceKind, message: String },
}

impl ServiceError {
    pub fn transient(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::Transient {
            service,
            message: message.into(),
        }
    }

    pub fn fatal(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::Fatal {
            service,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn service(&self) -> ServiceKind {
        match self {
            Self::Transient { service, .. } | Self::Fatal { service, .. } => *service,
        }
    }
}

/// The generation step a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Code,
    Spec,
    Proof,
    Repair,
    Judge,
    Reflect,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Code => "code",
            PromptKind::Spec => "spec",
            PromptKind::Proof => "proof",
            PromptKind::Repair => "repair",
            PromptKind::Judge => "judge",
            PromptKind::Reflect => "reflect",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named field the model must fill in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputField {
    pub name: String,
    pub description: String,
}

/// Structured generation request: instructions, named inputs and the
/// output fields expected back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSpec {
    pub kind: PromptKind,
    pub item_id: String,
    pub instructions: String,
    pub inputs: Vec<(String, String)>,
    pub outputs: Vec<OutputField>,
}

impl PromptSpec {
    pub fn new(kind: PromptKind, item_id: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            kind,
            item_id: item_id.into(),
            instructions: instructions.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.push((name.into(), value.into()));
        self
    }

    pub fn output(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.outputs.push(OutputField {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    pub fn input_value(&self, name: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Named text fields returned by a generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub fields: BTreeMap<String, String>,
}

impl GenerationOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Field value, or the empty string when the model omitted it.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Compiles a rendered Lean file and reports diagnostics.
#[async_trait]
pub trait CompilerOracle: Send + Sync {
    async fn compile(&self, source: &str) -> Result<CompileDiagnostic, ServiceError>;
}

/// Answers structured prompts with a language model.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        model: &ModelConfig,
        prompt: &PromptSpec,
    ) -> Result<GenerationOutput, ServiceError>;
}
