//! Request extractors.
//!
//! - [`RequestBase`] - scheme and host the request was addressed to
//! - [`BearerToken`] - raw bearer token from the `Authorization` header
//! - [`basic_client_credentials`] - client credentials from HTTP Basic auth

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::discovery::RequestBase;
use crate::error::AuthError;
use crate::oauth::ClientCredentials;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

impl<S> FromRequestParts<S> for RequestBase
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(request_base(parts))
    }
}

/// Computes the request base from `Host` and `X-Forwarded-Proto`.
///
/// Falls back to the request URI authority when `Host` is absent, and to
/// `http` when no scheme is known.
fn request_base(parts: &Parts) -> RequestBase {
    let header_str = |name: &'static str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let scheme = header_str(FORWARDED_PROTO)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| parts.uri.scheme_str())
        .unwrap_or("http");

    let host = header_str("host")
        .map(String::from)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());

    RequestBase::new(scheme, host)
}

/// A raw bearer token taken from `Authorization: Bearer <token>`.
///
/// The token is not validated here.
#[derive(Clone)]
pub struct BearerToken(pub String);

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken([redacted])")
    }
}

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AuthError::unauthorized("Missing Authorization header"))?
            .to_str()
            .map_err(|_| AuthError::unauthorized("Invalid Authorization header"))?;

        let (scheme, token) = value
            .split_once(' ')
            .ok_or_else(|| AuthError::unauthorized("Invalid Authorization header"))?;

        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::unauthorized(
                "Authorization header must use the Bearer scheme",
            ));
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::unauthorized("Empty bearer token"));
        }

        Ok(Self(token.to_string()))
    }
}

/// Reads client credentials from `Authorization: Basic <base64(id:secret)>`.
///
/// Returns `Ok(None)` when the request carries no Basic credentials.
///
/// # Errors
///
/// Returns `InvalidRequest` if the Basic credentials are malformed.
pub fn basic_client_credentials(headers: &HeaderMap) -> Result<Option<ClientCredentials>, AuthError> {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return Ok(None);
    };

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::invalid_request("Invalid base64 encoding in Authorization header"))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AuthError::invalid_request("Invalid UTF-8 in decoded credentials"))?;
    let (client_id, client_secret) = decoded
        .split_once(':')
        .ok_or_else(|| AuthError::invalid_request("Credentials must be in format 'id:secret'"))?;

    Ok(Some(ClientCredentials::new(client_id, client_secret)))
}
