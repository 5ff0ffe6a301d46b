use std::sync::Arc;

use autoformal_core::fakes::{ScriptedGenerator, ScriptedOracle};
use autoformal_core::{
    ArtifactField, CompileDiagnostic, EpisodeStart, FormalizationArtifact, ModelConfig,
    Parameter, PromptKind, Provenance, RefineConfig, RefineFault, RefineOutcome, Refiner,
    ServiceError, ServiceKind, Signature, TaskContext,
};

fn signature() -> Signature {
    Signature::new("add_one", vec![Parameter::new("n", "Int")], "Int")
}

fn sealed_artifact() -> FormalizationArtifact {
    let mut artifact = FormalizationArtifact::new();
    artifact.set_baseline(ArtifactField::Code, "n + 1").unwrap();
    artifact.set_baseline(ArtifactField::Precond, "True").unwrap();
    artifact
        .set_baseline(ArtifactField::Postcond, "result = n + 1")
        .unwrap();
    artifact.set_baseline(ArtifactField::Proof, "sorry").unwrap();
    artifact.seal();
    artifact
}

fn refiner(oracle: Arc<ScriptedOracle>, generator: Arc<ScriptedGenerator>, max: u32) -> Refiner {
    Refiner::new(
        oracle,
        generator,
        ModelConfig::default(),
        RefineConfig {
            max_iterations: max,
            ..RefineConfig::default()
        },
    )
}

fn ctx(sig: &Signature) -> TaskContext<'_> {
    TaskContext {
        item_id: "mbpp_1",
        signature: sig,
        description: "Add one to n",
        source: "def add_one(n: int) -> int:\n    return n + 1\n",
    }
}

#[tokio::test]
async fn single_repair_then_verified() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::fail_then_ok(1));
    let generator = Arc::new(ScriptedGenerator::new());
    let refiner = refiner(oracle.clone(), generator.clone(), 3);
    let mut artifact = sealed_artifact();

    let report = refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    assert_eq!(report.outcome, RefineOutcome::Verified);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(oracle.calls(), 2);
    assert_eq!(artifact.proof(), "unfold add_one\nomega");
    assert_eq!(
        artifact.provenance(ArtifactField::Proof),
        Provenance::Refined {
            episode: 0,
            attempt: 1
        }
    );
}

#[tokio::test]
async fn repair_output_never_touches_code_or_spec() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::always_failing());
    let generator = Arc::new(ScriptedGenerator::new());
    let refiner = refiner(oracle, generator, 4);
    let before = sealed_artifact();
    let mut artifact = before.clone();

    refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    assert!(artifact.same_code_and_spec(&before));
    assert_eq!(artifact.code(), "n + 1");
}

#[tokio::test]
async fn always_failing_oracle_exhausts_budget() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::always_failing());
    let generator = Arc::new(ScriptedGenerator::new());
    let refiner = refiner(oracle.clone(), generator.clone(), 3);
    let mut artifact = sealed_artifact();

    let report = refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    assert_eq!(report.outcome, RefineOutcome::Exhausted);
    assert_eq!(report.iterations, 3);
    assert_eq!(generator.calls_of(PromptKind::Repair), 3);
    // initial compile plus one per repair
    assert_eq!(oracle.calls(), 4);
    assert!(report.last_diagnostic.is_some_and(|d| !d.is_success()));
}

#[tokio::test]
async fn transient_compiler_fault_consumes_an_attempt() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::sequence(vec![
        Err(ServiceError::transient(ServiceKind::Compiler, "timed out after 120s")),
        Ok(CompileDiagnostic::success()),
    ]));
    let generator = Arc::new(ScriptedGenerator::new());
    let refiner = refiner(oracle, generator.clone(), 3);
    let mut artifact = sealed_artifact();

    let report = refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    assert_eq!(report.outcome, RefineOutcome::Verified);
    assert_eq!(report.iterations, 1);
    let repair = &generator.calls()[0];
    assert!(repair
        .prompt
        .input_value("prev_error")
        .unwrap_or("")
        .contains("compiler unavailable"));
}

#[tokio::test]
async fn transient_generation_fault_consumes_an_attempt() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::fail_then_ok(1));
    let generator = Arc::new(ScriptedGenerator::new().fail_kind_times(
        PromptKind::Repair,
        ServiceError::transient(ServiceKind::Generation, "429 too many requests"),
        1,
    ));
    let refiner = refiner(oracle.clone(), generator.clone(), 3);
    let mut artifact = sealed_artifact();

    let report = refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    assert_eq!(report.outcome, RefineOutcome::Verified);
    assert_eq!(report.iterations, 2);
    assert_eq!(generator.calls_of(PromptKind::Repair), 2);
    assert_eq!(oracle.calls(), 2);
}

#[tokio::test]
async fn transient_generation_faults_can_exhaust_budget() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::always_failing());
    let generator = Arc::new(ScriptedGenerator::new().fail_kind(
        PromptKind::Repair,
        ServiceError::transient(ServiceKind::Generation, "503 upstream overloaded"),
    ));
    let refiner = refiner(oracle.clone(), generator, 2);
    let mut artifact = sealed_artifact();

    let report = refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    assert_eq!(report.outcome, RefineOutcome::Exhausted);
    assert_eq!(report.iterations, 2);
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn fatal_generation_fault_is_hard() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::always_failing());
    let generator = Arc::new(ScriptedGenerator::new().fail_kind(
        PromptKind::Repair,
        ServiceError::fatal(ServiceKind::Generation, "401 invalid api key"),
    ));
    let refiner = refiner(oracle, generator, 5);
    let mut artifact = sealed_artifact();

    let report = refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    match report.outcome {
        RefineOutcome::Fatal(fault) => assert!(fault.is_hard()),
        other => panic!("expected fatal, got {other:?}"),
    }
    assert_eq!(report.iterations, 1);
}

#[tokio::test]
async fn fatal_compiler_fault_is_hard() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::erroring(ServiceError::fatal(
        ServiceKind::Compiler,
        "lake: command not found",
    )));
    let refiner = refiner(oracle, Arc::new(ScriptedGenerator::new()), 5);
    let mut artifact = sealed_artifact();

    let report = refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    assert!(matches!(
        report.outcome,
        RefineOutcome::Fatal(RefineFault::Service(ServiceError::Fatal { .. }))
    ));
    assert_eq!(report.iterations, 0);
}

#[tokio::test]
async fn malformed_artifact_is_soft_fatal_without_compiling() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::always_ok());
    let refiner = refiner(oracle.clone(), Arc::new(ScriptedGenerator::new()), 5);
    let mut artifact = FormalizationArtifact::new();

    let report = refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    match report.outcome {
        RefineOutcome::Fatal(fault) => {
            assert!(!fault.is_hard());
            assert!(matches!(fault, RefineFault::MalformedArtifact(_)));
        }
        other => panic!("expected malformed fault, got {other:?}"),
    }
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn pinned_proof_aux_survives_repairs() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::fail_then_ok(2));
    let generator = Arc::new(ScriptedGenerator::new());
    let refiner = refiner(oracle, generator, 5);
    let mut artifact = sealed_artifact();
    artifact.pin(ArtifactField::ProofAux, "lemma succ_pos' : True := trivial");

    let report = refiner
        .refine(&mut artifact, &ctx(&sig), 0, EpisodeStart::Compile)
        .await;

    assert_eq!(report.outcome, RefineOutcome::Verified);
    assert_eq!(
        artifact.get(ArtifactField::ProofAux),
        "lemma succ_pos' : True := trivial"
    );
    assert_eq!(artifact.provenance(ArtifactField::ProofAux), Provenance::Pinned);
}

#[tokio::test]
async fn revise_episode_repairs_before_compiling() {
    let sig = signature();
    let oracle = Arc::new(ScriptedOracle::always_ok());
    let generator = Arc::new(ScriptedGenerator::new());
    let refiner = refiner(oracle.clone(), generator.clone(), 3);
    let mut artifact = sealed_artifact();

    let report = refiner
        .refine(
            &mut artifact,
            &ctx(&sig),
            2,
            EpisodeStart::Revise {
                critique: "avoid simp_all; induct on n".to_string(),
            },
        )
        .await;

    assert_eq!(report.outcome, RefineOutcome::Verified);
    assert_eq!(report.episode, 2);
    assert_eq!(report.iterations, 1);
    assert!(report.attempts[0].diagnostic.is_none());
    let calls = generator.calls();
    assert_eq!(calls[0].kind, PromptKind::Repair);
    assert_eq!(
        calls[0].prompt.input_value("judge_critique"),
        Some("avoid simp_all; induct on n")
    );
    assert_eq!(
        artifact.provenance(ArtifactField::Proof),
        Provenance::Refined {
            episode: 2,
            attempt: 1
        }
    );
    assert_eq!(oracle.calls(), 1);
}
