pub mod classify;
pub mod engine;
pub mod error;
pub mod executor;
pub mod workspace;


pub use engine::{DockerEngine, ExecutionLimits, RawRun, RunPlan, Sandbox};
pub use error::ExecuteError;
pub use executor::Executor;
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};
