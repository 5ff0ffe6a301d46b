//! Formalization artifact: the Lean code, specification and proof for one item.
//!
//! Code and specification fields are written once by the translator and then
//! sealed. After sealing only the proof fields can change, and a field pinned
//! by the work item is never rewritten.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{FormalizeError, Result};

/// Addressable slot of a [`FormalizationArtifact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactField {
    Imports,
    CodeAux,
    Code,
    PrecondAux,
    Precond,
    PostcondAux,
    Postcond,
    ProofImports,
    ProofAux,
    Proof,
}

impl ArtifactField {
    pub const ALL: [ArtifactField; 10] = [
        ArtifactField::Imports,
        ArtifactField::CodeAux,
        ArtifactField::Code,
        ArtifactField::PrecondAux,
        ArtifactField::Precond,
        ArtifactField::PostcondAux,
        ArtifactField::Postcond,
        ArtifactField::ProofImports,
        ArtifactField::ProofAux,
        ArtifactField::Proof,
    ];

    /// Whether the field stays writable after translation.
    pub fn is_proof(self) -> bool {
        matches!(
            self,
            ArtifactField::ProofImports | ArtifactField::ProofAux | ArtifactField::Proof
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ArtifactField::Imports => "imports",
            ArtifactField::CodeAux => "code_aux",
            ArtifactField::Code => "code",
            ArtifactField::PrecondAux => "precond_aux",
            ArtifactField::Precond => "precond",
            ArtifactField::PostcondAux => "postcond_aux",
            ArtifactField::Postcond => "postcond",
            ArtifactField::ProofImports => "proof_imports",
            ArtifactField::ProofAux => "proof_aux",
            ArtifactField::Proof => "proof",
        }
    }
}

impl fmt::Display for ArtifactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which stage last produced a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Empty,
    Baseline,
    Refined { episode: u32, attempt: u32 },
    /// Supplied with the work item; never rewritten.
    Pinned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Fields {
    imports: String,
    code_aux: String,
    code: String,
    precond_aux: String,
    precond: String,
    postcond_aux: String,
    postcond: String,
    proof_imports: String,
    proof_aux: String,
    proof: String,
}

impl Fields {
    fn slot(&self, field: ArtifactField) -> &String {
        match field {
            ArtifactField::Imports => &self.imports,
            ArtifactField::CodeAux => &self.code_aux,
            ArtifactField::Code => &self.code,
            ArtifactField::PrecondAux => &self.precond_aux,
            ArtifactField::Precond => &self.precond,
            ArtifactField::PostcondAux => &self.postcond_aux,
            ArtifactField::Postcond => &self.postcond,
            ArtifactField::ProofImports => &self.proof_imports,
            ArtifactField::ProofAux => &self.proof_aux,
            ArtifactField::Proof => &self.proof,
        }
    }

    fn slot_mut(&mut self, field: ArtifactField) -> &mut String {
        match field {
            ArtifactField::Imports => &mut self.imports,
            ArtifactField::CodeAux => &mut self.code_aux,
            ArtifactField::Code => &mut self.code,
            ArtifactField::PrecondAux => &mut self.precond_aux,
            ArtifactField::Precond => &mut self.precond,
            ArtifactField::PostcondAux => &mut self.postcond_aux,
            ArtifactField::Postcond => &mut self.postcond,
            ArtifactField::ProofImports => &mut self.proof_imports,
            ArtifactField::ProofAux => &mut self.proof_aux,
            ArtifactField::Proof => &mut self.proof,
        }
    }
}

/// Lean artifact accumulated across translation, refinement and judging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormalizationArtifact {
    #[serde(flatten)]
    fields: Fields,
    #[serde(default)]
    provenance: BTreeMap<ArtifactField, Provenance>,
    #[serde(default)]
    sealed: bool,
}

impl FormalizationArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: ArtifactField) -> &str {
        self.fields.slot(field)
    }

    pub fn provenance(&self, field: ArtifactField) -> Provenance {
        self.provenance
            .get(&field)
            .copied()
            .unwrap_or(Provenance::Empty)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Write a translator output. Code and spec fields refuse once sealed.
    pub fn set_baseline(&mut self, field: ArtifactField, value: impl Into<String>) -> Result<()> {
        if self.sealed && !field.is_proof() {
            return Err(FormalizeError::SealedField(field));
        }
        if self.provenance(field) == Provenance::Pinned {
            return Ok(());
        }
        *self.fields.slot_mut(field) = value.into();
        self.provenance.insert(field, Provenance::Baseline);
        Ok(())
    }

    /// Install a caller-supplied value that no later stage may overwrite.
    pub fn pin(&mut self, field: ArtifactField, value: impl Into<String>) {
        *self.fields.slot_mut(field) = value.into();
        self.provenance.insert(field, Provenance::Pinned);
    }

    /// Freeze code and specification fields.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Rewrite a proof field during refinement.
    ///
    /// Returns `false` (leaving the artifact untouched) for code/spec fields
    /// and for pinned fields.
    pub fn revise(
        &mut self,
        field: ArtifactField,
        value: impl Into<String>,
        episode: u32,
        attempt: u32,
    ) -> bool {
        if !field.is_proof() || self.provenance(field) == Provenance::Pinned {
            return false;
        }
        *self.fields.slot_mut(field) = value.into();
        self.provenance
            .insert(field, Provenance::Refined { episode, attempt });
        true
    }

    /// Whether code and specification match `other` exactly.
    pub fn same_code_and_spec(&self, other: &FormalizationArtifact) -> bool {
        ArtifactField::ALL
            .iter()
            .filter(|f| !f.is_proof())
            .all(|f| self.get(*f) == other.get(*f))
    }

    /// An artifact without code or postcondition cannot be submitted to the compiler.
    pub fn missing_required(&self) -> Option<ArtifactField> {
        [ArtifactField::Code, ArtifactField::Postcond]
            .into_iter()
            .find(|f| self.get(*f).trim().is_empty())
    }

    pub fn imports(&self) -> &str {
        &self.fields.imports
    }

    pub fn code(&self) -> &str {
        &self.fields.code
    }

    pub fn postcond(&self) -> &str {
        &self.fields.postcond
    }

    pub fn proof(&self) -> &str {
        &self.fields.proof
    }
}
