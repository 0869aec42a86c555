// Runtime configuration, read from the environment with defaults

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::validation::RequestLimits;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 512;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1024 * 1024;
pub const DEFAULT_KILL_GRACE_SECS: u64 = 1;
pub const DEFAULT_CPU_LIMIT: f64 = 1.0;
pub const DEFAULT_PIDS_LIMIT: i64 = 128;

/// Limits and paths for the execution pipeline
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub scratch_root: PathBuf,
    pub timeout_secs: u64,
    pub kill_grace_secs: u64,
    pub memory_limit_mb: u64,
    pub cpu_limit: f64,
    pub pids_limit: i64,
    pub output_limit_bytes: usize,
    pub max_source_bytes: usize,
    pub max_stdin_bytes: usize,
    pub languages_config: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let limits = RequestLimits::default();
        Self {
            scratch_root: std::env::temp_dir().join("scriptorium"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            kill_grace_secs: DEFAULT_KILL_GRACE_SECS,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            cpu_limit: DEFAULT_CPU_LIMIT,
            pids_limit: DEFAULT_PIDS_LIMIT,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            max_source_bytes: limits.max_source_bytes,
            max_stdin_bytes: limits.max_stdin_bytes,
            languages_config: None,
        }
    }
}

impl SandboxConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    /// Unparseable or non-positive limits keep the default; zero would mean
    /// "unlimited" to the container runtime.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            scratch_root: lookup("SCRATCH_ROOT")
                .map(|raw| absolute_scratch_root(PathBuf::from(raw), &defaults.scratch_root))
                .unwrap_or(defaults.scratch_root),
            timeout_secs: parse_positive(&lookup, "EXECUTION_TIMEOUT_SECS", defaults.timeout_secs),
            kill_grace_secs: parse_positive(&lookup, "KILL_GRACE_SECS", defaults.kill_grace_secs),
            memory_limit_mb: parse_positive(&lookup, "MEMORY_LIMIT_MB", defaults.memory_limit_mb),
            cpu_limit: parse_positive(&lookup, "CPU_LIMIT", defaults.cpu_limit),
            pids_limit: parse_positive(&lookup, "PIDS_LIMIT", defaults.pids_limit),
            output_limit_bytes: parse_positive(&lookup, "OUTPUT_LIMIT_BYTES", defaults.output_limit_bytes),
            max_source_bytes: parse_positive(&lookup, "MAX_SOURCE_BYTES", defaults.max_source_bytes),
            max_stdin_bytes: parse_positive(&lookup, "MAX_STDIN_BYTES", defaults.max_stdin_bytes),
            languages_config: lookup("LANGUAGES_CONFIG").map(PathBuf::from),
        }
    }

    pub fn request_limits(&self) -> RequestLimits {
        RequestLimits {
            max_source_bytes: self.max_source_bytes,
            max_stdin_bytes: self.max_stdin_bytes,
        }
    }
}

/// Whether `POST /execute` needs credentials.
/// Token issuance lives outside this service; only a static token set is checked here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    Open,
    BearerTokens(HashSet<String>),
}

impl AuthPolicy {
    pub fn allows(&self, token: Option<&str>) -> bool {
        match self {
            AuthPolicy::Open => true,
            AuthPolicy::BearerTokens(tokens) => token.map_or(false, |t| tokens.contains(t)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub auth: AuthPolicy,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());

        let auth = match lookup("EXECUTE_AUTH").as_deref().map(str::trim) {
            None | Some("") | Some("open") => AuthPolicy::Open,
            Some("token") => {
                let tokens: HashSet<String> = lookup("EXECUTE_TOKENS")
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                if tokens.is_empty() {
                    warn!("EXECUTE_AUTH=token but EXECUTE_TOKENS is empty; every execute request will be rejected");
                }
                AuthPolicy::BearerTokens(tokens)
            }
            Some(other) => {
                warn!(value = other, "Unknown EXECUTE_AUTH value, falling back to open");
                AuthPolicy::Open
            }
        };

        Self { bind_addr, auth }
    }
}

fn parse_positive<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => value,
            _ => {
                warn!(key = key, value = %raw, "Invalid configuration value, using default");
                default
            }
        },
        None => default,
    }
}

/// Bind mounts need absolute host paths; relative roots resolve against the cwd
fn absolute_scratch_root(path: PathBuf, fallback: &Path) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot resolve relative SCRATCH_ROOT, using default");
            fallback.to_path_buf()
        }
    }
}
