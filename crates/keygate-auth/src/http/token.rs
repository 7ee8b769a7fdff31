//! Token endpoint handler.
//!
//! Forwards grants to the provider's token endpoint. Supported grant types:
//!
//! - `authorization_code`
//! - `refresh_token`
//! - `client_credentials`
//!
//! Client credentials are taken from HTTP Basic auth, then from the
//! `client_id`/`client_secret` form fields, and default to the gateway's own
//! client.
//!
//! # Example
//!
//! ```text
//! POST /api/token
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://app.example.com/callback
//! ```

use std::collections::HashMap;

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};

use super::GatewayState;
use super::extract::basic_client_credentials;
use crate::error::AuthError;
use crate::oauth::{ClientCredentials, Grant};

/// Handler for `POST /api/token`.
///
/// # Errors
///
/// Provider rejections are returned with the provider's status and error
/// body, e.g. `400 {"error": "invalid_grant", ...}` for an expired code.
pub async fn token_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Result<Response, AuthError> {
    let grant = Grant::from_params(&params)?;
    let credentials = match basic_client_credentials(&headers)? {
        Some(credentials) => Some(credentials),
        None => form_client_credentials(&params),
    };

    let tokens = state.exchange.exchange(&grant, credentials.as_ref()).await?;

    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(tokens),
    )
        .into_response())
}

fn form_client_credentials(params: &HashMap<String, String>) -> Option<ClientCredentials> {
    let client_id = params.get("client_id").filter(|id| !id.is_empty())?;
    Some(ClientCredentials {
        client_id: client_id.clone(),
        client_secret: params.get("client_secret").filter(|s| !s.is_empty()).cloned(),
    })
}
