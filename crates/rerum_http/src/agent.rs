//! Caller identity forwarded by the upstream auth gateway.
//!
//! # Responsibility
//! - Parse the configured user-claims header into a request extension.
//! - Resolve the agent claim for mutating handlers.
//!
//! # Invariants
//! - A present but malformed claims header is rejected before any handler.
//! - Mutating handlers never run without a non-empty agent claim.

use crate::error::ApiError;
use crate::state::AppState;
use axum::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};

/// Claims object of the authenticated user.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser(pub Map<String, Value>);

/// Agent claim of the caller, required by every mutating route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent(pub String);

/// Middleware: decodes the user-claims header when present.
pub(crate) async fn authenticate(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let header_name = state.config().user_header.as_str();
    let Some(raw) = request.headers().get(header_name) else {
        return next.run(request).await;
    };

    let parsed = raw
        .to_str()
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(text).ok());
    match parsed {
        Some(Value::Object(claims)) => {
            request.extensions_mut().insert(AuthenticatedUser(claims));
            next.run(request).await
        }
        _ => ApiError::unauthorized(format!("header `{header_name}` is not a JSON object"))
            .into_response(),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Agent {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claim_key = state.config().agent_claim_key.as_str();
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .ok_or_else(|| ApiError::unauthorized("authentication required"))?;
        match user.0.get(claim_key).and_then(Value::as_str).map(str::trim) {
            Some(agent) if !agent.is_empty() => Ok(Self(agent.to_string())),
            _ => Err(ApiError::unauthorized(format!(
                "user claims carry no `{claim_key}` agent"
            ))),
        }
    }
}
