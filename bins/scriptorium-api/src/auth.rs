// Execute-endpoint auth policy check

use axum::http::{header::AUTHORIZATION, HeaderMap};
use scriptorium_common::config::AuthPolicy;

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn authorize(policy: &AuthPolicy, headers: &HeaderMap) -> bool {
    policy.allows(bearer_token(headers))
}
