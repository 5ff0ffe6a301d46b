//! Work items handed to the engine by the upstream solving stage.

use serde::{Deserialize, Serialize};

use crate::domain::error::{FormalizeError, Result};
use crate::signature::Signature;

/// A solved task awaiting formalization. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub description: String,
    /// Solved program text that passed its tests.
    pub source: String,
    /// Extracted signature; derived from `source` when absent.
    #[serde(default)]
    pub signature: Option<Signature>,
    /// Test assertions shown to the specification step.
    #[serde(default)]
    pub tests: Vec<String>,
    /// Auxiliary proof text supplied with the task. Pinned in the artifact.
    #[serde(default)]
    pub proof_aux: Option<String>,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
        signature: Option<Signature>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            source: source.into(),
            signature,
            tests: Vec::new(),
            proof_aux: None,
        }
    }

    pub fn with_tests(mut self, tests: Vec<String>) -> Self {
        self.tests = tests;
        self
    }

    pub fn with_proof_aux(mut self, proof_aux: impl Into<String>) -> Self {
        self.proof_aux = Some(proof_aux.into());
        self
    }

    /// Validate the item and return its signature, extracting it from the
    /// source when none was supplied.
    pub fn resolve_signature(&self) -> Result<Signature> {
        let malformed = |reason: String| FormalizeError::MalformedItem {
            item_id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(malformed("empty identifier".to_string()));
        }
        if self.source.trim().is_empty() {
            return Err(malformed("empty solved source".to_string()));
        }

        let signature = match &self.signature {
            Some(sig) => sig.clone(),
            None => Signature::from_python_source_with_tests(&self.source, None, &self.tests)
                .map_err(|e| malformed(format!("signature extraction failed: {e}")))?,
        };
        signature
            .validate()
            .map_err(|e| malformed(format!("invalid signature: {e}")))?;
        Ok(signature)
    }

    pub fn context<'a>(&'a self, signature: &'a Signature) -> TaskContext<'a> {
        TaskContext {
            item_id: &self.id,
            signature,
            description: &self.description,
            source: &self.source,
        }
    }
}

/// Borrowed view of an item shared by every stage of one run.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub item_id: &'a str,
    pub signature: &'a Signature,
    pub description: &'a str,
    pub source: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_extracted_when_missing() {
        let item = WorkItem::new(
            "mbpp_1",
            "Add one",
            "def add_one(n: int) -> int:\n    return n + 1\n",
            None,
        );
        let sig = item.resolve_signature().unwrap();
        assert_eq!(sig.name, "add_one");
        assert_eq!(sig.return_type, "Int");
    }

    #[test]
    fn test_missing_function_is_malformed() {
        let item = WorkItem::new("mbpp_2", "No def", "x = 1\n", None);
        let err = item.resolve_signature().unwrap_err();
        assert!(matches!(err, FormalizeError::MalformedItem { .. }));
        assert!(err.to_string().contains("signature extraction failed"));
    }

    #[test]
    fn test_empty_source_is_malformed() {
        let item = WorkItem::new("mbpp_3", "Empty", "   ", None);
        assert!(item.resolve_signature().is_err());
    }
}
