//! Compiler oracle backed by a local Lean toolchain.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use autoformal_core::{CompileDiagnostic, CompilerConfig, CompilerOracle, ServiceError, ServiceKind};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::diagnostics;
use crate::error::{BackendError, Result};

/// Runs the configured command on each source, inside the Lean project.
///
/// Every compile writes a fresh temporary `.lean` file into
/// `project_dir`, so concurrent items never share a file.
#[derive(Debug, Clone)]
pub struct LeanCompiler {
    config: CompilerConfig,
}

impl LeanCompiler {
    pub fn new(config: CompilerConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(BackendError::EmptyCommand);
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    #[instrument(skip_all, fields(project_dir = %self.config.project_dir.display()))]
    async fn run(&self, source: &str) -> Result<CompileDiagnostic> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or(BackendError::EmptyCommand)?;

        let file = tempfile::Builder::new()
            .prefix("autoformal_")
            .suffix(".lean")
            .tempfile_in(&self.config.project_dir)?;
        tokio::fs::write(file.path(), source).await?;

        let start = Instant::now();
        let child = Command::new(program)
            .args(args)
            .arg(file.path())
            .current_dir(&self.config.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: program.clone(),
                source,
            })?;

        let output = if self.config.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| BackendError::Timeout(self.config.timeout_secs))??
        } else {
            child.wait_with_output().await?
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostic = diagnostics::interpret(output.status.success(), &stdout, &stderr);
        debug!(
            exit_code = output.status.code().unwrap_or(-1),
            success = diagnostic.is_success(),
            messages = diagnostic.messages.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "lean compile finished"
        );
        Ok(diagnostic)
    }
}

#[async_trait]
impl CompilerOracle for LeanCompiler {
    async fn compile(&self, source: &str) -> std::result::Result<CompileDiagnostic, ServiceError> {
        self.run(source)
            .await
            .map_err(|err| err.into_service_error(ServiceKind::Compiler))
    }
}
