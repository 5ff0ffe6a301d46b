//! Scripted in-memory services for tests.
//!
//! [`ScriptedOracle`] and [`ScriptedGenerator`] satisfy the service traits
//! with canned behaviour and record every call they receive.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ModelConfig;
use crate::domain::diagnostic::{CompileDiagnostic, DiagnosticMessage};
use crate::prompts::fields;
use crate::services::{
    CompilerOracle, GenerationClient, GenerationOutput, PromptKind, PromptSpec, ServiceError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ScriptedOracle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum OracleScript {
    AlwaysOk,
    AlwaysFail,
    FailThenOk(usize),
    FailWhenContains(String),
    Error(ServiceError),
    Sequence(VecDeque<Result<CompileDiagnostic, ServiceError>>),
}

/// Compiler oracle driven by a fixed script.
#[derive(Debug)]
pub struct ScriptedOracle {
    script: Mutex<OracleScript>,
    delay: Option<Duration>,
    submitted: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    fn with_script(script: OracleScript) -> Self {
        Self {
            script: Mutex::new(script),
            delay: None,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self::with_script(OracleScript::AlwaysOk)
    }

    pub fn always_failing() -> Self {
        Self::with_script(OracleScript::AlwaysFail)
    }

    /// The first `failures` compiles fail, later ones succeed.
    pub fn fail_then_ok(failures: usize) -> Self {
        Self::with_script(OracleScript::FailThenOk(failures))
    }

    /// Fail any source containing `pattern`; compile everything else.
    pub fn fail_when_contains(pattern: impl Into<String>) -> Self {
        Self::with_script(OracleScript::FailWhenContains(pattern.into()))
    }

    /// Every call returns `error`.
    pub fn erroring(error: ServiceError) -> Self {
        Self::with_script(OracleScript::Error(error))
    }

    /// Replay `responses` in order, then fail every later call.
    pub fn sequence(responses: Vec<Result<CompileDiagnostic, ServiceError>>) -> Self {
        Self::with_script(OracleScript::Sequence(responses.into()))
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.submitted).len()
    }

    pub fn submitted(&self) -> Vec<String> {
        lock(&self.submitted).clone()
    }

    pub fn failure_diagnostic() -> CompileDiagnostic {
        CompileDiagnostic::failure(vec![
            DiagnosticMessage::error("unsolved goals\n⊢ n + 1 = n + 1").at(14, 2)
        ])
    }
}

#[async_trait]
impl CompilerOracle for ScriptedOracle {
    async fn compile(&self, source: &str) -> Result<CompileDiagnostic, ServiceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call_index = {
            let mut submitted = lock(&self.submitted);
            submitted.push(source.to_string());
            submitted.len() - 1
        };

        let mut script = lock(&self.script);
        match &mut *script {
            OracleScript::AlwaysOk => Ok(CompileDiagnostic::success()),
            OracleScript::AlwaysFail => Ok(Self::failure_diagnostic()),
            OracleScript::FailThenOk(failures) => {
                if call_index < *failures {
                    Ok(Self::failure_diagnostic())
                } else {
                    Ok(CompileDiagnostic::success())
                }
            }
            OracleScript::FailWhenContains(pattern) => {
                if source.contains(pattern.as_str()) {
                    Ok(Self::failure_diagnostic())
                } else {
                    Ok(CompileDiagnostic::success())
                }
            }
            OracleScript::Error(error) => Err(error.clone()),
            OracleScript::Sequence(responses) => responses
                .pop_front()
                .unwrap_or_else(|| Ok(Self::failure_diagnostic())),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FailureRule {
    kind: Option<PromptKind>,
    item_id: Option<String>,
    error: ServiceError,
    /// Remaining matches before the rule stops firing; `None` fires forever.
    remaining: Option<usize>,
}

impl FailureRule {
    fn matches(&self, prompt: &PromptSpec) -> bool {
        self.kind.map_or(true, |k| k == prompt.kind)
            && self.item_id.as_deref().map_or(true, |id| id == prompt.item_id)
            && self.remaining.map_or(true, |n| n > 0)
    }
}

/// One recorded generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: PromptKind,
    pub item_id: String,
    pub model: String,
    pub prompt: PromptSpec,
}

/// Generation client answering each prompt kind with a canned output.
///
/// Judge prompts pop scores from a queue (falling back to a default
/// score once it is empty).
#[derive(Debug)]
pub struct ScriptedGenerator {
    outputs: BTreeMap<PromptKind, GenerationOutput>,
    scores: Mutex<VecDeque<u8>>,
    default_score: u8,
    failures: Mutex<Vec<FailureRule>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    /// Outputs for a one-parameter `Int -> Int` function.
    pub fn new() -> Self {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            PromptKind::Code,
            GenerationOutput::new()
                .with(fields::IMPORTS, "")
                .with(fields::CODE_AUX, "")
                .with(fields::CODE, "n + 1"),
        );
        outputs.insert(
            PromptKind::Spec,
            GenerationOutput::new()
                .with(fields::IMPORTS, "")
                .with(fields::PRECOND, "True")
                .with(fields::POSTCOND, "result = n + 1"),
        );
        outputs.insert(
            PromptKind::Proof,
            GenerationOutput::new()
                .with(fields::IMPORTS, "")
                .with(fields::PROOF_AUX, "")
                .with(fields::PROOF, "simp [add_one]"),
        );
        outputs.insert(
            PromptKind::Repair,
            GenerationOutput::new()
                .with(fields::IMPORTS, "")
                .with(fields::PROOF_AUX, "")
                .with(fields::PROOF, "unfold add_one\nomega")
                // Must never reach the artifact.
                .with(fields::CODE, "0"),
        );
        outputs.insert(
            PromptKind::Reflect,
            GenerationOutput::new().with(fields::CRITIQUE, "prove the postcondition directly"),
        );
        Self {
            outputs,
            scores: Mutex::new(VecDeque::new()),
            default_score: 8,
            failures: Mutex::new(Vec::new()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_output(mut self, kind: PromptKind, output: GenerationOutput) -> Self {
        self.outputs.insert(kind, output);
        self
    }

    /// Queue judge scores, applied to all three dimensions.
    pub fn with_scores(self, scores: impl IntoIterator<Item = u8>) -> Self {
        lock(&self.scores).extend(scores);
        self
    }

    pub fn with_default_score(mut self, score: u8) -> Self {
        self.default_score = score;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every prompt of `kind` fails with `error`.
    pub fn fail_kind(self, kind: PromptKind, error: ServiceError) -> Self {
        self.push_rule(Some(kind), None, error, None)
    }

    /// The next `times` prompts of `kind` fail with `error`.
    pub fn fail_kind_times(self, kind: PromptKind, error: ServiceError, times: usize) -> Self {
        self.push_rule(Some(kind), None, error, Some(times))
    }

    /// Every prompt for `item_id` fails with `error`.
    pub fn fail_item(self, item_id: impl Into<String>, error: ServiceError) -> Self {
        self.push_rule(None, Some(item_id.into()), error, None)
    }

    pub fn fail_all(self, error: ServiceError) -> Self {
        self.push_rule(None, None, error, None)
    }

    fn push_rule(
        self,
        kind: Option<PromptKind>,
        item_id: Option<String>,
        error: ServiceError,
        remaining: Option<usize>,
    ) -> Self {
        lock(&self.failures).push(FailureRule {
            kind,
            item_id,
            error,
            remaining,
        });
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_of(&self, kind: PromptKind) -> usize {
        lock(&self.calls).iter().filter(|c| c.kind == kind).count()
    }

    fn take_failure(&self, prompt: &PromptSpec) -> Option<ServiceError> {
        let mut rules = lock(&self.failures);
        let rule = rules.iter_mut().find(|r| r.matches(prompt))?;
        if let Some(n) = rule.remaining.as_mut() {
            *n -= 1;
        }
        Some(rule.error.clone())
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn generate(
        &self,
        model: &ModelConfig,
        prompt: &PromptSpec,
    ) -> Result<GenerationOutput, ServiceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.calls).push(RecordedCall {
            kind: prompt.kind,
            item_id: prompt.item_id.clone(),
            model: model.label(),
            prompt: prompt.clone(),
        });

        if let Some(error) = self.take_failure(prompt) {
            return Err(error);
        }

        if prompt.kind == PromptKind::Judge {
            let score = lock(&self.scores)
                .pop_front()
                .unwrap_or(self.default_score)
                .to_string();
            return Ok(GenerationOutput::new()
                .with(fields::CORRECTNESS, score.clone())
                .with(fields::COMPLETENESS, format!("{score}/10"))
                .with(fields::PROOF_SCORE, score)
                .with(fields::FEEDBACK, "specification could be tighter"));
        }

        Ok(self.outputs.get(&prompt.kind).cloned().unwrap_or_default())
    }
}
