//! Bearer token validation.
//!
//! This module provides:
//!
//! - A copy-on-write cache of the identity provider's signing keys
//! - Validation of provider-issued JWTs against that cache

pub mod jwks;
pub mod validator;

pub use jwks::{JwksError, SigningKey, SigningKeyCache, SigningKeySet};
pub use validator::{TokenClaims, TokenValidator};
