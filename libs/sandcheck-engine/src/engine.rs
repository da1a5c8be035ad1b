/// Verification Engine - High-Level Orchestration
///
/// **Responsibility:**
/// Turn a `Submission` into a `Verdict`.
///
/// **Architecture:**
/// 1. Look the challenge up in the registry (unknown ids are the caller's error)
/// 2. Compile the source (failures become a single-check verdict)
/// 3. Dispatch to the algorithmic or UI verifier
/// 4. Return the aggregated verdict
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (the sandbox's job)
/// - How outputs are judged (the verifiers' job)

use crate::algorithmic;
use crate::challenges::{Challenge, ChallengeRegistry};
use crate::compiler;
use crate::error::EngineError;
use crate::sandbox::Sandbox;
use crate::ui;
use sandcheck_common::config::EngineConfig;
use sandcheck_common::types::{Submission, Verdict};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared, read-only verification service; clone freely across tasks
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    registry: Arc<ChallengeRegistry>,
    sandbox: Sandbox,
}

impl Engine {
    /// Build an engine with the built-in catalogue plus `config.challenges_path`
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let registry = match &config.challenges_path {
            Some(path) => ChallengeRegistry::with_file(path)?,
            None => ChallengeRegistry::builtin()?,
        };
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: EngineConfig, registry: ChallengeRegistry) -> Self {
        let sandbox = Sandbox::from_config(&config);
        info!(
            challenges = registry.len(),
            time_limit_ms = config.default_time_limit_ms,
            iteration_cap = config.iteration_cap,
            "Verification engine ready"
        );
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            sandbox,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ChallengeRegistry {
        &self.registry
    }

    /// Verify one submission
    ///
    /// Only configuration faults come back as `Err`; everything the submitted
    /// code does wrong is a failing check inside the verdict.
    #[tracing::instrument(
        skip(self, submission),
        fields(submission_id = %submission.id, challenge_id = %submission.challenge_id)
    )]
    pub async fn verify(&self, submission: &Submission) -> Result<Verdict, EngineError> {
        let started = Instant::now();
        let challenge = self.registry.get(&submission.challenge_id)?;

        let unit = match compiler::compile(&submission.source_text, challenge.entry_point()) {
            Ok(unit) => unit,
            Err(err) => {
                warn!(kind = %err.kind, line = ?err.line, "Compilation failed");
                return Ok(Verdict::single_failure(err.learner_message()));
            }
        };

        let verdict = match challenge {
            Challenge::Algorithm(challenge) => {
                algorithmic::verify(&self.sandbox, &self.config, &unit, challenge).await
            }
            Challenge::Ui(challenge) => ui::verify(&self.sandbox, &self.config, &unit, challenge).await,
        };

        info!(
            kind = %challenge.kind(),
            passed = verdict.passed_count(),
            total = verdict.total(),
            is_correct = verdict.is_correct,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Verification complete"
        );
        Ok(verdict)
    }
}
