use serde::{Deserialize, Serialize};
use std::fmt;

/// A request that passed validation.
/// `language` is lowercased and `stdin` always ends with a newline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub source: String,
    pub stdin: String,
}

/// Terminal tag for one execution attempt. Exactly one holds per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Completed,
    CompileOrRuntimeError,
    TimedOut,
    MemoryExceeded,
    OutputOverflow,
    UnsupportedLanguage,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Completed => "completed",
            Classification::CompileOrRuntimeError => "compile_or_runtime_error",
            Classification::TimedOut => "timed_out",
            Classification::MemoryExceeded => "memory_exceeded",
            Classification::OutputOverflow => "output_overflow",
            Classification::UnsupportedLanguage => "unsupported_language",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result of running untrusted code.
///
/// `stdout` and `stderr` are already shaped for the caller: resource
/// exhaustion cases carry a fixed message instead of raw process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub classification: Classification,
    pub exit_code: Option<i64>,
    pub execution_time_ms: u64,
}

impl ExecutionOutcome {
    pub fn unsupported(language: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("Unsupported language: {}", language),
            classification: Classification::UnsupportedLanguage,
            exit_code: None,
            execution_time_ms: 0,
        }
    }
}

/// Wire shape of `POST /execute` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub error: String,
    pub status: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    pub execution_time_ms: u64,
}

impl From<ExecutionOutcome> for ExecuteResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        Self {
            output: outcome.stdout,
            error: outcome.stderr,
            status: outcome.classification,
            exit_code: outcome.exit_code,
            execution_time_ms: outcome.execution_time_ms,
        }
    }
}
