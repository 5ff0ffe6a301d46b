use std::sync::Arc;

use autoformal_core::fakes::{ScriptedGenerator, ScriptedOracle};
use autoformal_core::{
    ArtifactField, FormalizationArtifact, Judge, JudgeConfig, JudgeOutcome, ModelConfig,
    Parameter, PromptKind, Provenance, RefineConfig, Refiner, ServiceError, ServiceKind,
    Signature, TaskContext,
};

const BASELINE_PROOF: &str = "simp [add_one]";

fn signature() -> Signature {
    Signature::new("add_one", vec![Parameter::new("n", "Int")], "Int")
}

fn ctx(sig: &Signature) -> TaskContext<'_> {
    TaskContext {
        item_id: "mbpp_2",
        signature: sig,
        description: "Add one to n",
        source: "def add_one(n: int) -> int:\n    return n + 1\n",
    }
}

fn compiled_artifact() -> FormalizationArtifact {
    let mut artifact = FormalizationArtifact::new();
    artifact.set_baseline(ArtifactField::Code, "n + 1").unwrap();
    artifact.set_baseline(ArtifactField::Precond, "True").unwrap();
    artifact
        .set_baseline(ArtifactField::Postcond, "result = n + 1")
        .unwrap();
    artifact.seal();
    artifact
        .set_baseline(ArtifactField::Proof, BASELINE_PROOF)
        .unwrap();
    artifact
}

struct Harness {
    generator: Arc<ScriptedGenerator>,
    refiner: Refiner,
    judge: Judge,
}

fn harness(oracle: ScriptedOracle, generator: ScriptedGenerator, rounds: u32, refine_max: u32) -> Harness {
    let generator = Arc::new(generator);
    let refiner = Refiner::new(
        Arc::new(oracle),
        generator.clone(),
        ModelConfig::default(),
        RefineConfig {
            max_iterations: refine_max,
            ..RefineConfig::default()
        },
    );
    let judge = Judge::new(
        generator.clone(),
        ModelConfig::judge_default(),
        ModelConfig::default(),
        JudgeConfig {
            enabled: true,
            max_iterations: rounds,
            min_score: 7,
        },
    );
    Harness {
        generator,
        refiner,
        judge,
    }
}

#[tokio::test]
async fn passing_first_round_accepts_without_refining() {
    let sig = signature();
    let h = harness(
        ScriptedOracle::always_ok(),
        ScriptedGenerator::new().with_scores([8]),
        3,
        3,
    );
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert_eq!(report.outcome, JudgeOutcome::Accepted { compiled: true });
    assert_eq!(report.rounds, 1);
    assert_eq!(report.refine_iterations, 0);
    assert_eq!(report.final_score, Some(8));
    assert_eq!(h.generator.calls_of(PromptKind::Reflect), 0);
    assert_eq!(h.generator.calls_of(PromptKind::Repair), 0);
    assert_eq!(artifact.proof(), BASELINE_PROOF);
}

#[tokio::test]
async fn threshold_is_inclusive() {
    let sig = signature();
    let h = harness(
        ScriptedOracle::always_ok(),
        ScriptedGenerator::new().with_scores([7]),
        3,
        3,
    );
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert_eq!(report.outcome, JudgeOutcome::Accepted { compiled: true });
    assert!(report.verdicts[0].passed);
}

#[tokio::test]
async fn low_score_triggers_reflect_and_revision() {
    let sig = signature();
    let h = harness(
        ScriptedOracle::always_ok(),
        ScriptedGenerator::new().with_scores([4, 9]),
        3,
        3,
    );
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert_eq!(report.outcome, JudgeOutcome::Accepted { compiled: true });
    assert_eq!(report.rounds, 2);
    assert_eq!(report.refine_iterations, 1);
    assert_eq!(report.final_score, Some(9));
    assert_eq!(
        artifact.provenance(ArtifactField::Proof),
        Provenance::Refined {
            episode: 1,
            attempt: 1
        }
    );

    let calls = h.generator.calls();
    let repair = calls
        .iter()
        .find(|c| c.kind == PromptKind::Repair)
        .expect("a repair call");
    assert_eq!(
        repair.prompt.input_value("judge_critique"),
        Some("prove the postcondition directly")
    );
}

#[tokio::test]
async fn budget_exhaustion_rejects_and_keeps_latest_on_ties() {
    let sig = signature();
    let h = harness(
        ScriptedOracle::always_ok(),
        ScriptedGenerator::new().with_scores([5, 5, 5]),
        3,
        3,
    );
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert_eq!(report.outcome, JudgeOutcome::Rejected);
    assert_eq!(report.rounds, 3);
    assert_eq!(report.verdicts.len(), 3);
    assert_eq!(report.refine_iterations, 2);
    assert!(report.compiled);
    // no reflection after the last round
    assert_eq!(h.generator.calls_of(PromptKind::Reflect), 2);
    assert_eq!(
        artifact.provenance(ArtifactField::Proof),
        Provenance::Refined {
            episode: 2,
            attempt: 1
        }
    );
}

#[tokio::test]
async fn rejection_restores_best_scoring_candidate() {
    let sig = signature();
    let h = harness(
        ScriptedOracle::always_ok(),
        ScriptedGenerator::new().with_scores([6, 4, 3]),
        3,
        3,
    );
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert_eq!(report.outcome, JudgeOutcome::Rejected);
    assert_eq!(report.final_score, Some(6));
    assert_eq!(artifact.proof(), BASELINE_PROOF);
    assert_eq!(artifact.provenance(ArtifactField::Proof), Provenance::Baseline);
}

#[tokio::test]
async fn accepted_revision_that_does_not_compile_falls_back() {
    let sig = signature();
    // every compile in the judge episode fails
    let h = harness(
        ScriptedOracle::always_failing(),
        ScriptedGenerator::new().with_scores([3, 9]),
        3,
        2,
    );
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert_eq!(report.outcome, JudgeOutcome::Accepted { compiled: false });
    assert_eq!(report.refine_iterations, 2);
    assert!(report.compiled);
    assert_eq!(report.final_score, Some(3));
    assert_eq!(artifact.proof(), BASELINE_PROOF);
}

#[tokio::test]
async fn transient_judge_fault_scores_zero_and_continues() {
    let sig = signature();
    let h = harness(
        ScriptedOracle::always_ok(),
        ScriptedGenerator::new().with_scores([8]).fail_kind_times(
            PromptKind::Judge,
            ServiceError::transient(ServiceKind::Generation, "connection reset"),
            1,
        ),
        3,
        3,
    );
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert_eq!(report.outcome, JudgeOutcome::Accepted { compiled: true });
    assert_eq!(report.rounds, 2);
    assert_eq!(report.verdicts[0].score, 0);
    assert!(report.verdicts[0].rationale.contains("judge unavailable"));
}

#[tokio::test]
async fn fatal_judge_fault_ends_loop() {
    let sig = signature();
    let h = harness(
        ScriptedOracle::always_ok(),
        ScriptedGenerator::new().fail_kind(
            PromptKind::Judge,
            ServiceError::fatal(ServiceKind::Generation, "403 model access denied"),
        ),
        3,
        3,
    );
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert!(matches!(report.outcome, JudgeOutcome::Fatal(_)));
    assert_eq!(report.rounds, 1);
    assert!(report.verdicts.is_empty());
}

#[tokio::test]
async fn reflect_fault_falls_back_to_rationale() {
    let sig = signature();
    let h = harness(
        ScriptedOracle::always_ok(),
        ScriptedGenerator::new().with_scores([4, 9]).fail_kind(
            PromptKind::Reflect,
            ServiceError::transient(ServiceKind::Generation, "502 bad gateway"),
        ),
        3,
        3,
    );
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert_eq!(report.outcome, JudgeOutcome::Accepted { compiled: true });
    let calls = h.generator.calls();
    let repair = calls
        .iter()
        .find(|c| c.kind == PromptKind::Repair)
        .expect("a repair call");
    assert_eq!(
        repair.prompt.input_value("judge_critique"),
        Some("specification could be tighter")
    );
}

#[tokio::test]
async fn zero_round_budget_skips_judging() {
    let sig = signature();
    let h = harness(ScriptedOracle::always_ok(), ScriptedGenerator::new(), 0, 3);
    let mut artifact = compiled_artifact();

    let report = h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    assert_eq!(report.outcome, JudgeOutcome::Skipped);
    assert_eq!(report.rounds, 0);
    assert!(h.generator.calls().is_empty());
}

#[tokio::test]
async fn judge_and_reflect_use_their_own_models() {
    let sig = signature();
    let h = harness(
        ScriptedOracle::always_ok(),
        ScriptedGenerator::new().with_scores([4, 9]),
        3,
        3,
    );
    let mut artifact = compiled_artifact();

    h.judge.improve(&mut artifact, &ctx(&sig), &h.refiner, true).await;

    let calls = h.generator.calls();
    let judge_model = ModelConfig::judge_default().label();
    let reflect_model = ModelConfig::default().label();
    assert!(calls
        .iter()
        .filter(|c| c.kind == PromptKind::Judge)
        .all(|c| c.model == judge_model));
    assert!(calls
        .iter()
        .filter(|c| c.kind == PromptKind::Reflect)
        .all(|c| c.model == reflect_model));
}
