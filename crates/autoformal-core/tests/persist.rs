use std::sync::Arc;

use autoformal_core::fakes::{ScriptedGenerator, ScriptedOracle};
use autoformal_core::persist::record_stem;
use autoformal_core::{
    BatchSummary, FormalizationPipeline, FormalizeError, ItemResult, ItemStatus, PipelineConfig,
    ResultStore, WorkItem,
};
use tempfile::tempdir;

async fn finished_result(id: &str) -> ItemResult {
    let mut config = PipelineConfig::default();
    config.judge.enabled = false;
    let pipeline = FormalizationPipeline::new(
        &config,
        Arc::new(ScriptedOracle::fail_then_ok(1)),
        Arc::new(ScriptedGenerator::new()),
    );
    let item = WorkItem::new(
        id,
        "Return n plus one.",
        "def add_one(n: int) -> int:\n    return n + 1\n",
        None,
    );
    pipeline.run(&item).await
}

#[tokio::test]
async fn written_record_reloads_with_rendered_lean() {
    let dir = tempdir().unwrap();
    let store = ResultStore::new(dir.path());
    let result = finished_result("mbpp_11").await;

    let path = store.write(&result).unwrap();

    assert!(path.ends_with("mbpp_11.json"));
    assert!(dir.path().join("mbpp_11.digest").exists());
    let lean = std::fs::read_to_string(dir.path().join("mbpp_11.lean")).unwrap();
    assert!(lean.contains("def add_one (n : Int)"));
    assert!(lean.contains("theorem add_one_spec_satisfied"));
    assert!(lean.contains("unfold add_one"));

    let loaded = store.load("mbpp_11").unwrap();
    assert_eq!(loaded, result);
}

#[tokio::test]
async fn tampered_record_fails_digest_check() {
    let dir = tempdir().unwrap();
    let store = ResultStore::new(dir.path());
    let result = finished_result("mbpp_12").await;
    let path = store.write(&result).unwrap();

    let json = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, json.replace("\"success\"", "\"fatal\"")).unwrap();

    let err = store.load("mbpp_12").unwrap_err();
    assert!(matches!(err, FormalizeError::DigestMismatch { .. }));
    // load_all skips it instead of failing
    assert!(store.load_all().unwrap().is_empty());
}

#[test]
fn missing_record_is_reported() {
    let dir = tempdir().unwrap();
    let store = ResultStore::new(dir.path());

    let err = store.load("nope").unwrap_err();
    assert!(matches!(err, FormalizeError::RecordNotFound(id) if id == "nope"));
}

#[test]
fn fatal_record_without_artifact_writes_no_lean() {
    let dir = tempdir().unwrap();
    let store = ResultStore::new(dir.path());

    store
        .write(&ItemResult::fatal("mbpp_13", "empty solved source"))
        .unwrap();

    assert!(dir.path().join("mbpp_13.json").exists());
    assert!(!dir.path().join("mbpp_13.lean").exists());
}

#[tokio::test]
async fn resolved_ids_exclude_fatal_records_and_summary() {
    let dir = tempdir().unwrap();
    let store = ResultStore::new(dir.path());

    let done = finished_result("mbpp_20").await;
    assert_eq!(done.status, ItemStatus::Success);
    store.write(&done).unwrap();
    store
        .write(&ItemResult::fatal("mbpp_21", "401 unauthorized"))
        .unwrap();
    store
        .write_summary(&BatchSummary::from_results(&[done]))
        .unwrap();

    let resolved = store.resolved_ids().unwrap();
    assert_eq!(resolved.into_iter().collect::<Vec<_>>(), vec!["mbpp_20"]);
    assert_eq!(store.load_all().unwrap().len(), 2);
}

#[test]
fn missing_directory_loads_nothing() {
    let dir = tempdir().unwrap();
    let store = ResultStore::new(dir.path().join("not-yet-created"));

    assert!(store.load_all().unwrap().is_empty());
    assert!(store.resolved_ids().unwrap().is_empty());
}

#[test]
fn ids_that_sanitize_alike_keep_separate_records() {
    let dir = tempdir().unwrap();
    let store = ResultStore::new(dir.path());

    store.write(&ItemResult::fatal("task 1", "first")).unwrap();
    store.write(&ItemResult::fatal("task_1", "second")).unwrap();

    let ids: Vec<String> = store
        .load_all()
        .unwrap()
        .into_iter()
        .map(|r| r.item_id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"task 1".to_string()));
    assert!(ids.contains(&"task_1".to_string()));
    assert_eq!(store.load("task 1").unwrap().item_id, "task 1");
    assert_eq!(
        store.load("task_1").unwrap().error.as_deref(),
        Some("second")
    );
}

#[test]
fn record_under_the_wrong_stem_is_rejected() {
    let dir = tempdir().unwrap();
    let store = ResultStore::new(dir.path());
    store.write(&ItemResult::fatal("task_1", "401 unauthorized")).unwrap();

    // copy task_1's record into the files belonging to "task 1"
    let stem = record_stem("task 1");
    for ext in ["json", "digest"] {
        std::fs::copy(
            dir.path().join(format!("task_1.{ext}")),
            dir.path().join(format!("{stem}.{ext}")),
        )
        .unwrap();
    }

    let err = store.load("task 1").unwrap_err();
    assert!(matches!(
        err,
        FormalizeError::RecordMismatch { requested, found } if requested == "task 1" && found == "task_1"
    ));
}
