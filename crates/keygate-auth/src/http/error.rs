//! Error responses.
//!
//! Implements `IntoResponse` for [`AuthError`]. Synthesized bodies use the
//! OAuth 2.0 error shape `{"error", "error_description"}`; provider
//! rejections are replayed with the provider's own status and JSON body.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{AuthError, ErrorCategory};

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let category = self.category();
        match category {
            ErrorCategory::Internal | ErrorCategory::Configuration => {
                tracing::error!(category = %category, error = %self, "Request failed");
            }
            ErrorCategory::Transient | ErrorCategory::Upstream => {
                tracing::warn!(category = %category, error = %self, "Request failed");
            }
            _ => tracing::debug!(category = %category, error = %self, "Request rejected"),
        }

        if let AuthError::UpstreamRejection { status, body, .. } = &self
            && let Some(response) = upstream_response(*status, body)
        {
            return response;
        }

        let status = status_for(&self);
        let code = self.oauth_error_code().to_string();
        let description = description_for(&self);

        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(&code, &description);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        let body = json!({
            "error": code,
            "error_description": description,
        });
        (status, headers, Json(body)).into_response()
    }
}

/// Replays a provider rejection when its body is JSON and its status is an
/// error status.
fn upstream_response(status: u16, body: &str) -> Option<Response> {
    let status = StatusCode::from_u16(status).ok()?;
    if !(status.is_client_error() || status.is_server_error()) {
        return None;
    }
    let body: serde_json::Value = serde_json::from_str(body).ok()?;
    Some(
        (
            status,
            [(header::CACHE_CONTROL, "no-store")],
            Json(body),
        )
            .into_response(),
    )
}

fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::InvalidToken { .. }
        | AuthError::TokenExpired
        | AuthError::TokenNotYetValid
        | AuthError::UnknownSigningKey { .. }
        | AuthError::Unauthorized { .. }
        | AuthError::Account { .. } => StatusCode::UNAUTHORIZED,
        AuthError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        // Only reached when the provider body was not replayable
        AuthError::UpstreamRejection { status, .. } => StatusCode::from_u16(*status)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or(StatusCode::BAD_GATEWAY),
        AuthError::Conflict { .. } => StatusCode::CONFLICT,
        AuthError::TransientNetwork { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Returns the client-facing description. Internal details stay in the logs.
fn description_for(error: &AuthError) -> String {
    match error {
        AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            "Internal server error".to_string()
        }
        AuthError::Account { .. } => "Unknown account".to_string(),
        AuthError::UpstreamRejection {
            description: Some(description),
            ..
        } => description.clone(),
        other => other.to_string(),
    }
}

/// Builds the WWW-Authenticate header value for 401 responses.
///
/// Format: `Bearer realm="keygate", error="invalid_token", error_description="..."`
fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped_desc = description.replace('\\', "\\\\").replace('"', "\\\"");
    format!("Bearer realm=\"keygate\", error=\"{error}\", error_description=\"{escaped_desc}\"")
}
