//! Compiler oracle output.

use serde::{Deserialize, Serialize};

use crate::services::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// One compiler message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    pub location: Option<SourceLocation>,
    pub severity: Severity,
    pub message: String,
}

impl DiagnosticMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            location: None,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = Some(SourceLocation { line, column });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileOutcome {
    Success,
    Failure,
}

/// Result of compiling one rendered artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileDiagnostic {
    pub outcome: CompileOutcome,
    pub messages: Vec<DiagnosticMessage>,
}

impl CompileDiagnostic {
    pub fn success() -> Self {
        Self {
            outcome: CompileOutcome::Success,
            messages: Vec::new(),
        }
    }

    pub fn failure(messages: Vec<DiagnosticMessage>) -> Self {
        Self {
            outcome: CompileOutcome::Failure,
            messages,
        }
    }

    /// A transient oracle fault, expressed as a failed compile so the
    /// refinement loop can spend an attempt on it.
    pub fn from_service_error(err: &ServiceError) -> Self {
        Self::failure(vec![DiagnosticMessage::error(format!(
            "compiler unavailable: {err}"
        ))])
    }

    pub fn is_success(&self) -> bool {
        self.outcome == CompileOutcome::Success
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticMessage> {
        self.messages
            .iter()
            .filter(|m| m.severity == Severity::Error)
    }

    /// Render at most `limit` messages as repair-prompt feedback, errors first.
    pub fn render_feedback(&self, limit: usize) -> String {
        let mut ordered: Vec<&DiagnosticMessage> = self.errors().collect();
        ordered.extend(
            self.messages
                .iter()
                .filter(|m| m.severity != Severity::Error),
        );

        let mut out = String::new();
        for msg in ordered.into_iter().take(limit) {
            match msg.location {
                Some(loc) => out.push_str(&format!(
                    "{}:{}: {}: {}\n",
                    loc.line,
                    loc.column,
                    msg.severity.as_str(),
                    msg.message
                )),
                None => out.push_str(&format!("{}: {}\n", msg.severity.as_str(), msg.message)),
            }
        }
        if out.is_empty() && !self.is_success() {
            out.push_str("compilation failed without diagnostics\n");
        }
        out
    }
}
