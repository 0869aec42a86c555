// HTTP route handlers for the Scriptorium execution API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use scriptorium_common::types::ExecuteResponse;
use scriptorium_common::validation::ValidationError;
use scriptorium_sandbox::ExecuteError;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{auth, metrics, AppState};

/// Body for every refused or failed execute request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub output: String,
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            output: String::new(),
            error: message.into(),
        }),
    )
        .into_response()
}

fn validation_status(err: &ValidationError) -> (StatusCode, &'static str) {
    match err {
        ValidationError::InvalidBody => (StatusCode::BAD_REQUEST, "invalid_body"),
        ValidationError::MissingField(_) => (StatusCode::BAD_REQUEST, "missing_field"),
        ValidationError::TypeMismatch(_) => (StatusCode::BAD_REQUEST, "type_mismatch"),
        ValidationError::UnsupportedLanguage(_) => (StatusCode::NOT_FOUND, "unsupported_language"),
        ValidationError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "too_large"),
    }
}

/// POST /execute - Run untrusted code and return its classified outcome
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    if !auth::authorize(&state.auth, &headers) {
        metrics::record_rejection("unauthorized");
        return error_response(StatusCode::UNAUTHORIZED, "Missing or invalid bearer token");
    }

    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            metrics::record_rejection("invalid_json");
            return error_response(rejection.status(), rejection.body_text());
        }
    };

    match state.executor.execute_json(&body).await {
        Ok(outcome) => {
            // Validation succeeded, so `language` is a string
            let language = body
                .get("language")
                .and_then(Value::as_str)
                .map(|l| l.trim().to_lowercase())
                .unwrap_or_default();
            metrics::record_outcome(&language, &outcome);

            (StatusCode::OK, Json(ExecuteResponse::from(outcome))).into_response()
        }
        Err(ExecuteError::Validation(err)) => {
            let (status, reason) = validation_status(&err);
            info!(reason = reason, error = %err, "Execute request rejected");
            metrics::record_rejection(reason);
            error_response(status, err.to_string())
        }
        Err(err) => {
            error!(error = %err, "Execution pipeline failed");
            metrics::record_internal_failure();
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error while executing code")
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub name: String,
    pub image: String,
    pub source_file: String,
    pub compiled: bool,
}

/// GET /languages - Supported languages and their images
pub async fn list_languages(State(state): State<Arc<AppState>>) -> Json<Vec<LanguageInfo>> {
    let languages = state
        .executor
        .languages()
        .specs()
        .into_iter()
        .map(|spec| LanguageInfo {
            name: spec.name.clone(),
            image: spec.image.clone(),
            source_file: spec.source_file.clone(),
            compiled: spec.is_compiled(),
        })
        .collect();
    Json(languages)
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::routes;
    use crate::AppState;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use scriptorium_common::config::{AuthPolicy, SandboxConfig};
    use scriptorium_common::languages::LanguageTable;
    use scriptorium_sandbox::{ExecutionLimits, Executor, RawRun, RunPlan, Sandbox};
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Echoes the input file back as stdout
    struct EchoSandbox;

    #[async_trait]
    impl Sandbox for EchoSandbox {
        async fn run(&self, plan: &RunPlan, _limits: &ExecutionLimits) -> anyhow::Result<RawRun> {
            let stdin = std::fs::read_to_string(plan.workspace.join("input.txt"))?;
            Ok(RawRun {
                stdout: stdin,
                exit_code: Some(0),
                elapsed: Duration::from_millis(3),
                ..Default::default()
            })
        }
    }

    fn app(root: &Path, auth: AuthPolicy) -> Router {
        app_with(
            SandboxConfig {
                scratch_root: root.to_path_buf(),
                ..Default::default()
            },
            auth,
        )
    }

    fn app_with(config: SandboxConfig, auth: AuthPolicy) -> Router {
        let executor = Executor::new(LanguageTable::builtin(), Arc::new(EchoSandbox), &config);
        routes::app(Arc::new(AppState { executor, auth }), &config)
    }

    fn execute_request(body: Value) -> Request<Body> {
        Request::post("/execute")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_execute_success() {
        let scratch = tempfile::tempdir().unwrap();
        let response = app(scratch.path(), AuthPolicy::Open)
            .oneshot(execute_request(json!({
                "language": "python",
                "source": "print(input())",
                "stdin": "hello"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["output"], "hello\n");
        assert_eq!(body["error"], "");
        assert_eq!(body["status"], "completed");
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let scratch = tempfile::tempdir().unwrap();
        let response = app(scratch.path(), AuthPolicy::Open)
            .oneshot(execute_request(json!({"source": "print(1)"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["output"], "");
        assert!(body["error"].as_str().unwrap().contains("language"));
        assert_eq!(std::fs::read_dir(scratch.path()).map(|d| d.count()).unwrap_or(0), 0);
    }

    #[tokio::test]
    async fn test_unsupported_language_is_not_found() {
        let scratch = tempfile::tempdir().unwrap();
        let response = app(scratch.path(), AuthPolicy::Open)
            .oneshot(execute_request(json!({"language": "fortran", "source": "x"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = read_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("fortran"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_client_error() {
        let scratch = tempfile::tempdir().unwrap();
        let request = Request::post("/execute")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app(scratch.path(), AuthPolicy::Open)
            .oneshot(request)
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_token_policy() {
        let scratch = tempfile::tempdir().unwrap();
        let policy = AuthPolicy::BearerTokens(HashSet::from(["letmein".to_string()]));
        let body = json!({"language": "ruby", "source": ""});

        let response = app(scratch.path(), policy.clone())
            .oneshot(execute_request(body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = execute_request(body);
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer letmein".parse().unwrap());
        let response = app(scratch.path(), policy).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_languages_and_health() {
        let scratch = tempfile::tempdir().unwrap();
        let router = app(scratch.path(), AuthPolicy::Open);

        let response = router
            .clone()
            .oneshot(Request::get("/languages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"java"));
        assert_eq!(names.len(), 11);

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_exposed() {
        let scratch = tempfile::tempdir().unwrap();
        let router = app(scratch.path(), AuthPolicy::Open);

        router
            .clone()
            .oneshot(execute_request(json!({"language": "lua", "source": "print(1)"})))
            .await
            .unwrap();

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("scriptorium_executions_total"));
    }

    #[tokio::test]
    async fn test_control_character_stdin_within_limit_is_accepted() {
        let scratch = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            scratch_root: scratch.path().to_path_buf(),
            max_source_bytes: 100_000,
            max_stdin_bytes: 100_000,
            ..Default::default()
        };

        // Every byte serializes as `\u0001`, six times its raw size
        let stdin = "\u{1}".repeat(100_000);
        let body = json!({"language": "python", "source": "import sys", "stdin": stdin});
        assert!(body.to_string().len() > 6 * 100_000);

        let response = app_with(config, AuthPolicy::Open)
            .oneshot(execute_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["output"].as_str().unwrap().len(), 100_001);
    }
}
