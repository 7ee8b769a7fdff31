//! Bearer token validation.
//!
//! [`TokenValidator`] verifies provider-issued JWTs against the cached
//! [`SigningKeyCache`] and returns the identity claims they carry.
//!
//! # Rejections
//!
//! A token is rejected when:
//!
//! - it is not a structurally valid JWT, or has no `kid` header
//! - its algorithm is not one of the configured algorithms
//! - its `kid` is unknown even after one forced key set refresh
//! - its signature does not verify
//! - `now >= exp` or `iat > now` (both widened by the configured leeway)
//! - the issuer or audience do not match, when those checks are configured
//!
//! A key set refresh happens at most once per validation, so a key rotation
//! on the provider is picked up without unbounded retries.

use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::jwks::{SigningKey, SigningKeyCache};
use crate::config::{ConfigError, TokenValidationConfig};
use crate::error::AuthError;

/// Claims extracted from a validated bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject; the provider-side identity id.
    pub sub: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued-at time (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Username of the authenticated identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Email of the authenticated identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Any other claims.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenClaims {
    /// Returns the username claim, if present.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.preferred_username.as_deref()
    }
}

/// Validates bearer tokens against the provider's signing key set.
pub struct TokenValidator {
    keys: Arc<SigningKeyCache>,
    algorithms: Vec<Algorithm>,
    config: TokenValidationConfig,
}

impl TokenValidator {
    /// Creates a validator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured algorithms cannot be parsed.
    pub fn new(keys: Arc<SigningKeyCache>, config: TokenValidationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            keys,
            algorithms: config.parsed_algorithms()?,
            config,
        })
    }

    /// Returns the shared signing key cache.
    #[must_use]
    pub fn key_cache(&self) -> &Arc<SigningKeyCache> {
        &self.keys
    }

    /// Validates a raw bearer token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns a validation error ([`AuthError::is_validation_error`]) when the
    /// token is rejected, or the key set fetch error when an unknown `kid`
    /// forced a refresh that failed.
    pub async fn validate(&self, raw_token: &str) -> Result<TokenClaims, AuthError> {
        let header = decode_header(raw_token)
            .map_err(|e| AuthError::invalid_token(format!("Malformed token: {e}")))?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_token("Token is missing key ID (kid) header"))?;

        if !self.algorithms.contains(&header.alg) {
            return Err(AuthError::invalid_token(format!(
                "Signing algorithm {:?} is not accepted",
                header.alg
            )));
        }

        let key = self.signing_key(&kid).await?;
        if let Some(alg) = key.algorithm
            && alg != header.alg
        {
            return Err(AuthError::invalid_token(format!(
                "Key {kid} is pinned to {alg:?}, token uses {:?}",
                header.alg
            )));
        }

        let validation = self.validation(header.alg);
        let claims = decode::<TokenClaims>(raw_token, &key.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                ErrorKind::InvalidSignature => AuthError::invalid_token("Signature mismatch"),
                _ => AuthError::invalid_token(e.to_string()),
            })?
            .claims;

        self.check_validity_window(&claims)?;

        tracing::trace!(sub = %claims.sub, kid = %kid, "Validated bearer token");
        Ok(claims)
    }

    /// Looks the key up in the current set, refreshing the set once on a miss.
    async fn signing_key(&self, kid: &str) -> Result<SigningKey, AuthError> {
        if let Some(key) = self.keys.snapshot().get(kid) {
            return Ok(key.clone());
        }

        tracing::debug!(kid = %kid, "Unknown signing key, refreshing key set");
        let refreshed = self.keys.refresh_for(kid).await?;

        refreshed.get(kid).cloned().ok_or_else(|| {
            tracing::debug!(kid = %kid, "Signing key still unknown after refresh");
            AuthError::unknown_signing_key(kid)
        })
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.config.leeway.as_secs();
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        match &self.config.audience {
            Some(audience) => validation.set_audience(audience),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.config.expected_issuer {
            validation.set_issuer(&[issuer.trim_end_matches('/')]);
        }

        validation
    }

    /// Enforces the half-open validity window `[iat, exp)`.
    fn check_validity_window(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let leeway = i64::try_from(self.config.leeway.as_secs()).unwrap_or(i64::MAX);

        if now >= claims.exp.saturating_add(leeway) {
            return Err(AuthError::TokenExpired);
        }
        if let Some(iat) = claims.iat
            && iat > now.saturating_add(leeway)
        {
            return Err(AuthError::TokenNotYetValid);
        }
        Ok(())
    }
}
