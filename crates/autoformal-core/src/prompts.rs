//! Prompt builders for every generation step.

use crate::domain::artifact::{ArtifactField, FormalizationArtifact};
use crate::domain::verdict::JudgeVerdict;
use crate::domain::work_item::TaskContext;
use crate::services::{PromptKind, PromptSpec};

const CODE_INSTRUCTIONS: &str = "\
You are an expert in both Python and Lean 4.
Given Python code, a task description, and a Lean 4 function signature,
translate the Python code into equivalent Lean 4 code.
Rules:
- Use Lean 4 syntax only (NOT Lean 3).
- Do NOT use sorry, admit, or axiom.
- Do NOT import Std or Init.
- Use a[i]! instead of a[i] for array/list access when needed.";

const SPEC_INSTRUCTIONS: &str = "\
You are an expert in Lean 4 formal verification.
Given Python code, its Lean 4 translation, its test cases, and a task description,
generate a Lean 4 precondition and postcondition that formally specify the function.
The precondition should be as permissive as possible.
The postcondition should be sound and complete with respect to the task description.
Rules:
- Use Lean 4 syntax only (NOT Lean 3).
- Add @[reducible, simp] to auxiliary definitions.
- Do NOT import Std or Init.";

const PROOF_INSTRUCTIONS: &str = "\
You are an expert in Lean 4 theorem proving.
Given a complete Lean 4 task template with code and specification,
generate a proof that the code satisfies the specification.
Rules:
- Use Lean 4 syntax only (NOT Lean 3).
- Do NOT use sorry, admit, or axiom.
- Unfold definitions and use simp/omega/decide as appropriate.";

const REPAIR_INSTRUCTIONS: &str = "\
You are an expert in Lean 4 theorem proving.
A previous proof attempt failed or was criticised by a reviewer.
Fix the proof using the compiler errors, the reviewer critique and the previous attempt.
Only the proof may change; the code and specification are fixed.
Rules:
- Use Lean 4 syntax only (NOT Lean 3).
- Do NOT use sorry, admit, or axiom.
- You can ignore unused variable warnings.";

const JUDGE_INSTRUCTIONS: &str = "\
You are a Lean 4 expert judge. Evaluate the quality of the generated Lean 4 code,
specification, and proof against the original Python task.
Score each dimension from 1-10 and provide actionable feedback.";

const REFLECT_INSTRUCTIONS: &str = "\
You are an expert in Lean 4. Given the current Lean 4 file and a judge's feedback,
write a concise critique telling a proof engineer how to strengthen the proof.
Focus on the weakest areas identified by the judge.
The code and specification cannot change; direct every suggestion at the proof.";

/// Output field names shared by prompt builders and their consumers.
pub mod fields {
    pub const IMPORTS: &str = "imports";
    pub const CODE_AUX: &str = "code_aux";
    pub const CODE: &str = "code";
    pub const PRECOND_AUX: &str = "precond_aux";
    pub const PRECOND: &str = "precond";
    pub const POSTCOND_AUX: &str = "postcond_aux";
    pub const POSTCOND: &str = "postcond";
    pub const PROOF_AUX: &str = "proof_aux";
    pub const PROOF: &str = "proof";
    pub const CORRECTNESS: &str = "correctness_score";
    pub const COMPLETENESS: &str = "completeness_score";
    pub const PROOF_SCORE: &str = "proof_score";
    pub const FEEDBACK: &str = "feedback";
    pub const CRITIQUE: &str = "critique";
}

/// Lean header the generated code body must fit under.
fn code_signature(ctx: &TaskContext<'_>) -> String {
    let sig = ctx.signature;
    let binders = sig.lean_binders();
    let sep = if binders.is_empty() { "" } else { " " };
    format!(
        "def {name}{sep}{binders} (h_precond : {name}_precond{sep}{args}) : {ret} :=",
        name = sig.name,
        args = sig.argument_names(),
        ret = sig.return_type,
    )
}

pub fn code_prompt(ctx: &TaskContext<'_>) -> PromptSpec {
    PromptSpec::new(PromptKind::Code, ctx.item_id, CODE_INSTRUCTIONS)
        .input("python_code", ctx.source)
        .input("description", ctx.description)
        .input("lean_signature", code_signature(ctx))
        .output(fields::IMPORTS, "Lean 4 imports needed. Keep empty if not needed.")
        .output(fields::CODE_AUX, "Auxiliary Lean 4 definitions. Keep empty if not needed.")
        .output(fields::CODE, "Lean 4 function body implementing the task.")
}

pub fn spec_prompt(
    ctx: &TaskContext<'_>,
    tests: &[String],
    artifact: &FormalizationArtifact,
) -> PromptSpec {
    PromptSpec::new(PromptKind::Spec, ctx.item_id, SPEC_INSTRUCTIONS)
        .input("python_code", ctx.source)
        .input("lean_code", artifact.code())
        .input("tests", tests.join("\n"))
        .input("description", ctx.description)
        .output(fields::IMPORTS, "Lean 4 imports needed. Keep empty if not needed.")
        .output(
            fields::PRECOND_AUX,
            "Auxiliary definitions for precondition. Keep empty if not needed.",
        )
        .output(fields::PRECOND, "Lean 4 precondition body (Prop).")
        .output(
            fields::POSTCOND_AUX,
            "Auxiliary definitions for postcondition. Keep empty if not needed.",
        )
        .output(fields::POSTCOND, "Lean 4 postcondition body (Prop).")
}

pub fn proof_prompt(ctx: &TaskContext<'_>, task_template: &str) -> PromptSpec {
    PromptSpec::new(PromptKind::Proof, ctx.item_id, PROOF_INSTRUCTIONS)
        .input("task_template", format!("```lean4\n{task_template}```"))
        .input("description", ctx.description)
        .output(fields::IMPORTS, "Lean 4 imports needed. Keep empty if not needed.")
        .output(fields::PROOF_AUX, "Auxiliary lemmas for the proof. Keep empty if not needed.")
        .output(fields::PROOF, "Lean 4 proof that the code satisfies the specification.")
}

/// Repair request for one refinement attempt. `feedback` carries compiler
/// diagnostics, `critique` the judge-derived critique that opened the episode.
pub fn repair_prompt(
    ctx: &TaskContext<'_>,
    task_template: &str,
    artifact: &FormalizationArtifact,
    feedback: Option<&str>,
    critique: Option<&str>,
) -> PromptSpec {
    PromptSpec::new(PromptKind::Repair, ctx.item_id, REPAIR_INSTRUCTIONS)
        .input("task_template", format!("```lean4\n{task_template}```"))
        .input("description", ctx.description)
        .input("prev_imports", artifact.get(ArtifactField::ProofImports))
        .input("prev_proof_aux", artifact.get(ArtifactField::ProofAux))
        .input("prev_proof", artifact.proof())
        .input("prev_error", feedback.unwrap_or(""))
        .input("judge_critique", critique.unwrap_or(""))
        .output(fields::IMPORTS, "Lean 4 imports needed. Keep empty if not needed.")
        .output(fields::PROOF_AUX, "Auxiliary lemmas for the proof. Keep empty if not needed.")
        .output(fields::PROOF, "Improved Lean 4 proof.")
}

pub fn judge_prompt(ctx: &TaskContext<'_>, lean_file: &str) -> PromptSpec {
    PromptSpec::new(PromptKind::Judge, ctx.item_id, JUDGE_INSTRUCTIONS)
        .input("python_code", ctx.source)
        .input("lean_code", lean_file)
        .input("description", ctx.description)
        .output(
            fields::CORRECTNESS,
            "Score 1-10: Does the Lean code match the Python semantics?",
        )
        .output(fields::COMPLETENESS, "Score 1-10: How complete is the specification?")
        .output(fields::PROOF_SCORE, "Score 1-10: How sound is the proof?")
        .output(fields::FEEDBACK, "Specific, actionable feedback for improvement.")
}

pub fn reflect_prompt(
    ctx: &TaskContext<'_>,
    lean_file: &str,
    verdict: &JudgeVerdict,
) -> PromptSpec {
    let judge_feedback = format!(
        "correctness={} completeness={} proof={}\n{}",
        verdict.scores.correctness,
        verdict.scores.completeness,
        verdict.scores.proof,
        verdict.rationale
    );
    PromptSpec::new(PromptKind::Reflect, ctx.item_id, REFLECT_INSTRUCTIONS)
        .input("lean_code", lean_file)
        .input("judge_feedback", judge_feedback)
        .input("description", ctx.description)
        .output(fields::CRITIQUE, "Concrete guidance for revising the proof.")
}
