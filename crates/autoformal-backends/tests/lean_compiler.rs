#![cfg(unix)]

use autoformal_backends::{BackendError, LeanCompiler};
use autoformal_core::{CompilerConfig, CompilerOracle, ServiceError};
use tempfile::tempdir;

fn compiler(command: &[&str], project_dir: &std::path::Path, timeout_secs: u64) -> LeanCompiler {
    LeanCompiler::new(CompilerConfig {
        command: command.iter().map(|s| s.to_string()).collect(),
        project_dir: project_dir.to_path_buf(),
        timeout_secs,
    })
    .unwrap()
}

#[test]
fn empty_command_is_rejected() {
    let err = LeanCompiler::new(CompilerConfig {
        command: Vec::new(),
        ..CompilerConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, BackendError::EmptyCommand));
}

// `cat` echoes the source back, so diagnostics embedded in the source are
// what the parser sees.

#[tokio::test]
async fn clean_output_compiles() {
    let dir = tempdir().unwrap();
    let oracle = compiler(&["cat"], dir.path(), 30);

    let diag = oracle.compile("def add_one (n : Int) : Int := n + 1\n").await.unwrap();

    assert!(diag.is_success());
}

#[tokio::test]
async fn reported_errors_fail_the_compile() {
    let dir = tempdir().unwrap();
    let oracle = compiler(&["cat"], dir.path(), 30);

    let diag = oracle
        .compile("X.lean:14:2: error: unsolved goals\n⊢ True\n")
        .await
        .unwrap();

    assert!(!diag.is_success());
    let errors: Vec<_> = diag.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "unsolved goals\n⊢ True");
}

#[tokio::test]
async fn sorry_warning_fails_the_compile() {
    let dir = tempdir().unwrap();
    let oracle = compiler(&["cat"], dir.path(), 30);

    let diag = oracle
        .compile("X.lean:9:8: warning: declaration uses 'sorry'\n")
        .await
        .unwrap();

    assert!(!diag.is_success());
}

#[tokio::test]
async fn nonzero_exit_fails_the_compile() {
    let dir = tempdir().unwrap();
    let oracle = compiler(&["false"], dir.path(), 30);

    let diag = oracle.compile("anything").await.unwrap();

    assert!(!diag.is_success());
    assert_eq!(diag.errors().count(), 1);
}

#[tokio::test]
async fn temp_file_is_removed_after_compile() {
    let dir = tempdir().unwrap();
    let oracle = compiler(&["cat"], dir.path(), 30);

    oracle.compile("theorem t : True := trivial\n").await.unwrap();

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_program_is_fatal() {
    let dir = tempdir().unwrap();
    let oracle = compiler(&["autoformal-no-such-lean-binary"], dir.path(), 30);

    let err = oracle.compile("x").await.unwrap_err();

    assert!(matches!(err, ServiceError::Fatal { .. }));
    assert!(err.to_string().contains("failed to spawn"));
}

#[tokio::test]
async fn missing_project_dir_is_fatal() {
    let dir = tempdir().unwrap();
    let oracle = compiler(&["cat"], &dir.path().join("absent"), 30);

    let err = oracle.compile("x").await.unwrap_err();

    assert!(!err.is_transient());
}

#[tokio::test]
async fn slow_compiler_times_out_as_transient() {
    let dir = tempdir().unwrap();
    let oracle = compiler(&["sh", "-c", "sleep 5", "sh"], dir.path(), 1);

    let err = oracle.compile("x").await.unwrap_err();

    assert!(err.is_transient());
    assert!(err.to_string().contains("timed out after 1s"));
}
