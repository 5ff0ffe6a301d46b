//! Rendering artifacts into Lean 4 source.
//!
//! Each section is wrapped in `-- !benchmark @start <section>` /
//! `-- !benchmark @end <section>` markers so downstream metrics can recover
//! individual fields from a rendered file.

use crate::domain::artifact::{ArtifactField, FormalizationArtifact};
use crate::signature::Signature;

/// Proof text used before a proof has been generated.
pub const PROOF_PLACEHOLDER: &str = "sorry";

const DEFAULT_PRECOND: &str = "True";

fn indent(body: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    body.lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn marked(section: &str, body: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    format!(
        "{pad}-- !benchmark @start {section}\n{}\n{pad}-- !benchmark @end {section}\n",
        indent(body.trim_end(), width)
    )
}

fn aux_section(out: &mut String, section: &str, body: &str) {
    if !body.trim().is_empty() {
        out.push_str(&marked(section, body, 0));
        out.push('\n');
    }
}

/// Remove markdown code fences and surrounding blank lines from model output.
pub fn clean_output(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim_matches('\n').to_string()
}

/// Concatenate import blocks, dropping blank and repeated lines.
pub fn merge_imports<'a>(blocks: impl IntoIterator<Item = &'a str>) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for block in blocks {
        for line in block.lines().map(str::trim) {
            if !line.is_empty() && !seen.contains(&line) {
                seen.push(line);
            }
        }
    }
    seen.join("\n")
}

/// Render the complete Lean file for `artifact`.
pub fn render_lean_file(signature: &Signature, artifact: &FormalizationArtifact) -> String {
    render_with(signature, artifact, None)
}

/// Render code and specification with the proof replaced by
/// [`PROOF_PLACEHOLDER`], as shown to the proof generation step.
pub fn render_with_proof_placeholder(
    signature: &Signature,
    artifact: &FormalizationArtifact,
) -> String {
    render_with(signature, artifact, Some(PROOF_PLACEHOLDER))
}

fn render_with(
    signature: &Signature,
    artifact: &FormalizationArtifact,
    proof_override: Option<&str>,
) -> String {
    let name = &signature.name;
    let binders = signature.lean_binders();
    let args = signature.argument_names();
    let ret = &signature.return_type;
    let sep = if binders.is_empty() { "" } else { " " };

    let mut out = String::new();

    let proof_imports = if proof_override.is_some() {
        ""
    } else {
        artifact.get(ArtifactField::ProofImports)
    };
    let imports = merge_imports([artifact.imports(), proof_imports]);
    if !imports.is_empty() {
        out.push_str(&marked("imports", &imports, 0));
        out.push('\n');
    }

    aux_section(&mut out, "precond_aux", artifact.get(ArtifactField::PrecondAux));
    let precond = match artifact.get(ArtifactField::Precond).trim() {
        "" => DEFAULT_PRECOND,
        p => p,
    };
    out.push_str("@[reducible, simp]\n");
    out.push_str(&format!("def {name}_precond{sep}{binders} : Prop :=\n"));
    out.push_str(&marked("precond", precond, 2));
    out.push('\n');

    let precond_app = format!("{name}_precond{sep}{args}");

    aux_section(&mut out, "code_aux", artifact.get(ArtifactField::CodeAux));
    out.push_str(&format!(
        "def {name}{sep}{binders} (h_precond : {precond_app}) : {ret} :=\n"
    ));
    out.push_str(&marked("code", artifact.code(), 2));
    out.push('\n');

    aux_section(&mut out, "postcond_aux", artifact.get(ArtifactField::PostcondAux));
    out.push_str("@[reducible, simp]\n");
    out.push_str(&format!(
        "def {name}_postcond{sep}{binders} (result: {ret}) (h_precond : {precond_app}) : Prop :=\n"
    ));
    out.push_str(&marked("postcond", artifact.postcond(), 2));
    out.push('\n');

    let (proof_aux, proof) = match proof_override {
        Some(placeholder) => ("", placeholder),
        None => (artifact.get(ArtifactField::ProofAux), artifact.proof()),
    };
    aux_section(&mut out, "proof_aux", proof_aux);
    let proof = if proof.trim().is_empty() {
        PROOF_PLACEHOLDER
    } else {
        proof
    };
    out.push_str(&format!(
        "theorem {name}_spec_satisfied{sep}{binders} (h_precond : {precond_app}) :\n    {name}_postcond{sep}{args} ({name}{sep}{args} h_precond) h_precond := by\n"
    ));
    out.push_str(&marked("proof", proof, 2));

    out
}

/// Extract the body between `@start`/`@end` markers for `section`.
pub fn extract_section(lean: &str, section: &str) -> Option<String> {
    let start = format!("-- !benchmark @start {section}");
    let end = format!("-- !benchmark @end {section}");
    let mut body = Vec::new();
    let mut inside = false;
    for line in lean.lines() {
        let trimmed = line.trim();
        if trimmed == start {
            inside = true;
            continue;
        }
        if trimmed == end {
            return Some(body.join("\n"));
        }
        if inside {
            body.push(line.trim());
        }
    }
    None
}
