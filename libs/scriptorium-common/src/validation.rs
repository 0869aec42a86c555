// Request validation for the execution endpoint.
// Pure: no filesystem or process work happens here.

use serde_json::Value;
use thiserror::Error;

use crate::languages::LanguageTable;
use crate::types::ExecutionRequest;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("request body must be a JSON object")]
    InvalidBody,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` must be a string")]
    TypeMismatch(&'static str),
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("field `{field}` exceeds the limit of {limit} bytes")]
    TooLarge { field: &'static str, limit: usize },
}

/// Size guardrails applied before anything touches the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_source_bytes: usize,
    pub max_stdin_bytes: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_source_bytes: 1024 * 1024,
            max_stdin_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Validate a raw request body against the language table.
///
/// Check order: body shape, presence (`language`, then `source`), types,
/// language membership, sizes. JSON `null` counts as absent.
pub fn validate(
    body: &Value,
    languages: &LanguageTable,
    limits: &RequestLimits,
) -> Result<ExecutionRequest, ValidationError> {
    let object = body.as_object().ok_or(ValidationError::InvalidBody)?;
    let field = |name: &str| object.get(name).filter(|v| !v.is_null());

    let language = field("language").ok_or(ValidationError::MissingField("language"))?;
    let source = field("source").ok_or(ValidationError::MissingField("source"))?;

    let language = language
        .as_str()
        .ok_or(ValidationError::TypeMismatch("language"))?;
    let source = source
        .as_str()
        .ok_or(ValidationError::TypeMismatch("source"))?;
    let stdin = match field("stdin") {
        Some(value) => value.as_str().ok_or(ValidationError::TypeMismatch("stdin"))?,
        None => "",
    };

    let language = language.trim().to_lowercase();
    if !languages.contains(&language) {
        return Err(ValidationError::UnsupportedLanguage(language));
    }

    if source.len() > limits.max_source_bytes {
        return Err(ValidationError::TooLarge {
            field: "source",
            limit: limits.max_source_bytes,
        });
    }
    if stdin.len() > limits.max_stdin_bytes {
        return Err(ValidationError::TooLarge {
            field: "stdin",
            limit: limits.max_stdin_bytes,
        });
    }

    Ok(ExecutionRequest {
        language,
        source: source.to_string(),
        stdin: normalize_stdin(stdin),
    })
}

/// Interpreters that read a line block or fail without a terminator
pub fn normalize_stdin(stdin: &str) -> String {
    let mut normalized = stdin.to_string();
    if !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(body: Value) -> Result<ExecutionRequest, ValidationError> {
        validate(&body, &LanguageTable::builtin(), &RequestLimits::default())
    }

    #[test]
    fn test_valid_request_normalizes() {
        let request = check(json!({
            "language": "Python",
            "source": "print(input())",
            "stdin": "hello"
        }))
        .unwrap();

        assert_eq!(request.language, "python");
        assert_eq!(request.source, "print(input())");
        assert_eq!(request.stdin, "hello\n");
    }

    #[test]
    fn test_stdin_defaults_to_newline() {
        let request = check(json!({"language": "ruby", "source": ""})).unwrap();
        assert_eq!(request.stdin, "\n");

        let request = check(json!({"language": "ruby", "source": "", "stdin": null})).unwrap();
        assert_eq!(request.stdin, "\n");

        let request = check(json!({"language": "ruby", "source": "", "stdin": "a\nb\n"})).unwrap();
        assert_eq!(request.stdin, "a\nb\n");
    }

    #[test]
    fn test_missing_fields_have_distinct_errors() {
        let missing_language = check(json!({"source": "x"})).unwrap_err();
        let missing_source = check(json!({"language": "python"})).unwrap_err();

        assert_eq!(missing_language, ValidationError::MissingField("language"));
        assert_eq!(missing_source, ValidationError::MissingField("source"));
        assert_ne!(missing_language.to_string(), missing_source.to_string());
    }

    #[test]
    fn test_type_mismatch() {
        assert_eq!(
            check(json!({"language": 3, "source": "x"})).unwrap_err(),
            ValidationError::TypeMismatch("language")
        );
        assert_eq!(
            check(json!({"language": "python", "source": ["x"]})).unwrap_err(),
            ValidationError::TypeMismatch("source")
        );
        assert_eq!(
            check(json!({"language": "python", "source": "x", "stdin": 42})).unwrap_err(),
            ValidationError::TypeMismatch("stdin")
        );
    }

    #[test]
    fn test_unsupported_language() {
        assert_eq!(
            check(json!({"language": "COBOL", "source": "x"})).unwrap_err(),
            ValidationError::UnsupportedLanguage("cobol".to_string())
        );
    }

    #[test]
    fn test_invalid_body() {
        assert_eq!(check(json!("python")).unwrap_err(), ValidationError::InvalidBody);
        assert_eq!(check(json!([1, 2])).unwrap_err(), ValidationError::InvalidBody);
    }

    #[test]
    fn test_size_limits() {
        let limits = RequestLimits {
            max_source_bytes: 4,
            max_stdin_bytes: 2,
        };
        let table = LanguageTable::builtin();

        let err = validate(&json!({"language": "python", "source": "12345"}), &table, &limits)
            .unwrap_err();
        assert_eq!(err, ValidationError::TooLarge { field: "source", limit: 4 });

        let err = validate(
            &json!({"language": "python", "source": "1", "stdin": "abc"}),
            &table,
            &limits,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::TooLarge { field: "stdin", limit: 2 });
    }
}
