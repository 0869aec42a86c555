/// Executor - the execution pipeline
///
/// Validator → Workspace (acquire, write source + input) → Sandbox (run)
/// → classify → Workspace (release, always).
///
/// Teardown is tied to the `Workspace` value: every early return and every
/// `?` drops it, which removes the directory. One request gets exactly one
/// execution attempt; nothing is retried.

use scriptorium_common::config::SandboxConfig;
use scriptorium_common::languages::LanguageTable;
use scriptorium_common::types::{ExecutionOutcome, ExecutionRequest};
use scriptorium_common::validation::{validate, RequestLimits};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::classify::classify;
use crate::engine::{ExecutionLimits, RunPlan, Sandbox};
use crate::error::ExecuteError;
use crate::workspace::{WorkspaceManager, INPUT_FILE};

#[derive(Clone)]
pub struct Executor {
    languages: Arc<LanguageTable>,
    workspaces: WorkspaceManager,
    sandbox: Arc<dyn Sandbox>,
    limits: ExecutionLimits,
    request_limits: RequestLimits,
}

impl Executor {
    pub fn new(languages: LanguageTable, sandbox: Arc<dyn Sandbox>, config: &SandboxConfig) -> Self {
        Self {
            languages: Arc::new(languages),
            workspaces: WorkspaceManager::new(config.scratch_root.clone()),
            sandbox,
            limits: ExecutionLimits::from(config),
            request_limits: config.request_limits(),
        }
    }

    pub fn languages(&self) -> &LanguageTable {
        &self.languages
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Validate a raw body, then execute it
    pub async fn execute_json(&self, body: &Value) -> Result<ExecutionOutcome, ExecuteError> {
        let request = validate(body, &self.languages, &self.request_limits)?;
        self.execute(&request).await
    }

    /// Execute an already validated request
    #[instrument(skip(self, request), fields(language = %request.language, source_size = request.source.len()))]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, ExecuteError> {
        let Some(spec) = self.languages.get(&request.language) else {
            warn!("Language missing from table");
            return Ok(ExecutionOutcome::unsupported(&request.language));
        };

        let workspace = self.workspaces.acquire()?;
        let source_file = spec.source_filename(&request.source);
        workspace.write_source(&source_file, &request.source)?;
        workspace.write_input(&request.stdin)?;

        let plan = RunPlan {
            run_id: workspace.id(),
            image: spec.image.clone(),
            shell_command: spec.shell_command(&source_file, INPUT_FILE),
            workspace: workspace.path().to_path_buf(),
        };

        let raw = self
            .sandbox
            .run(&plan, &self.limits)
            .await
            .map_err(ExecuteError::Sandbox)?;

        let outcome = classify(raw, &self.limits);
        workspace.release();

        info!(
            run_id = %plan.run_id,
            classification = %outcome.classification,
            exit_code = ?outcome.exit_code,
            execution_ms = outcome.execution_time_ms,
            "Execution finished"
        );

        Ok(outcome)
    }
}
