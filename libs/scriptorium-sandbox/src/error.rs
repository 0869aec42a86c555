use scriptorium_common::validation::ValidationError;
use thiserror::Error;

use crate::workspace::WorkspaceError;

/// Failures of the execution pipeline itself.
///
/// Misbehaving programs are not errors; they come back as a classified
/// `ExecutionOutcome`.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("sandbox failure: {0:#}")]
    Sandbox(anyhow::Error),
}

impl ExecuteError {
    /// True when the caller sent a bad request
    pub fn is_client_error(&self) -> bool {
        matches!(self, ExecuteError::Validation(_))
    }
}
