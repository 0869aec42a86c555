// Route table for the Scriptorium API

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use scriptorium_common::config::SandboxConfig;
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

/// Headroom for JSON framing and escaping on top of the payload limits
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/execute", post(handlers::execute_code))
        .route("/languages", get(handlers::list_languages))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
}

/// Worst-case growth of a string under JSON escaping (`\u0001` for one byte)
const JSON_ESCAPE_FACTOR: usize = 6;

/// Largest body that can still carry payloads within the validator's limits.
/// Anything bigger is refused before it is buffered.
pub fn body_limit(config: &SandboxConfig) -> usize {
    config
        .max_source_bytes
        .saturating_add(config.max_stdin_bytes)
        .saturating_mul(JSON_ESCAPE_FACTOR)
        .saturating_add(BODY_OVERHEAD_BYTES)
}

/// Full application with state and a body limit sized to the request limits
pub fn app(state: Arc<AppState>, config: &SandboxConfig) -> Router {
    Router::new()
        .merge(routes())
        .layer(DefaultBodyLimit::max(body_limit(config)))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_covers_fully_escaped_payloads() {
        let config = SandboxConfig {
            max_source_bytes: 1000,
            max_stdin_bytes: 500,
            ..Default::default()
        };
        assert_eq!(body_limit(&config), 1500 * 6 + BODY_OVERHEAD_BYTES);

        let config = SandboxConfig {
            max_source_bytes: usize::MAX,
            ..Default::default()
        };
        assert_eq!(body_limit(&config), usize::MAX);
    }
}
