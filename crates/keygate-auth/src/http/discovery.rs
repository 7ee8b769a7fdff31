//! OpenID Connect discovery handler.
//!
//! Serves `/.well-known/openid-configuration`.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use super::GatewayState;
use crate::discovery::{OpenIdConfiguration, RequestBase};

/// Handler for `GET /.well-known/openid-configuration`.
///
/// The document is rebuilt for every request from the request's own base URL,
/// so the same gateway can be reached under several host names.
///
/// # Example
///
/// ```text
/// GET /.well-known/openid-configuration HTTP/1.1
/// Host: api.example.com
/// X-Forwarded-Proto: https
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {
///   "issuer": "https://api.example.com",
///   "token_endpoint": "https://api.example.com/api/token",
///   ...
/// }
/// ```
pub async fn openid_configuration_handler(
    State(state): State<GatewayState>,
    base: RequestBase,
) -> impl IntoResponse {
    let config = OpenIdConfiguration::build(&base, &state.endpoints.certs);
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(config),
    )
}
