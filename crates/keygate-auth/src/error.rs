//! Gateway error types.
//!
//! This module defines the errors returned by the token, exchange, linking,
//! profile and user-info layers, and how they are classified.

use std::fmt;

use crate::config::ConfigError;
use crate::token::jwks::JwksError;

/// Errors that can occur in the gateway's token and identity layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The bearer token is malformed or its signature or claims do not verify.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The bearer token's `exp` is in the past.
    #[error("Token expired")]
    TokenExpired,

    /// The bearer token's `iat` is in the future.
    #[error("Token is not yet valid")]
    TokenNotYetValid,

    /// The token was signed with a key that is not in the provider's key set,
    /// even after a refresh.
    #[error("Unknown signing key: {kid}")]
    UnknownSigningKey {
        /// The `kid` header of the rejected token.
        kid: String,
    },

    /// The request carries no usable credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The request is malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The identity provider answered with a non-success status.
    #[error("Identity provider rejected the request with status {status}: {}", .error.as_deref().unwrap_or("unclassified"))]
    UpstreamRejection {
        /// HTTP status returned by the provider.
        status: u16,
        /// OAuth2 `error` code from the provider body, when present.
        error: Option<String>,
        /// OAuth2 `error_description` from the provider body, when present.
        description: Option<String>,
        /// Raw provider response body.
        body: String,
    },

    /// The identity provider reported a conflicting resource (e.g. a duplicate username).
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict, as reported by the provider.
        message: String,
    },

    /// A connection-level failure talking to the identity provider.
    #[error("Transient network error: {message}")]
    TransientNetwork {
        /// Description of the network failure.
        message: String,
    },

    /// Looking up the local account failed.
    #[error("Account lookup failed: {message}")]
    Account {
        /// Description of the lookup failure.
        message: String,
    },

    /// The gateway configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `UnknownSigningKey` error.
    #[must_use]
    pub fn unknown_signing_key(kid: impl Into<String>) -> Self {
        Self::UnknownSigningKey { kid: kid.into() }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `UpstreamRejection` error from a provider response.
    ///
    /// The body is kept verbatim; if it is an OAuth2 error document its
    /// `error` and `error_description` are extracted for classification.
    #[must_use]
    pub fn upstream_rejection(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let parsed = serde_json::from_str::<serde_json::Value>(&body).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        Self::UpstreamRejection {
            status,
            error: field("error"),
            description: field("error_description").or_else(|| field("errorMessage")),
            body,
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `TransientNetwork` error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }

    /// Creates a new `Account` error.
    #[must_use]
    pub fn account(message: impl Into<String>) -> Self {
        Self::Account {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error means the bearer token must be rejected.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Validation)
    }

    /// Returns `true` if the provider rejected the call.
    #[must_use]
    pub fn is_upstream_rejection(&self) -> bool {
        matches!(self, Self::UpstreamRejection { .. })
    }

    /// Returns `true` if the provider reported a conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if this is a connection-level failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    /// Returns the provider's OAuth2 error code, if this is an upstream rejection.
    #[must_use]
    pub fn upstream_error_code(&self) -> Option<&str> {
        match self {
            Self::UpstreamRejection { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    /// Returns the error category for logging and response mapping.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidToken { .. }
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::UnknownSigningKey { .. }
            | Self::Unauthorized { .. } => ErrorCategory::Validation,
            Self::InvalidRequest { .. } => ErrorCategory::Request,
            Self::UpstreamRejection { .. } => ErrorCategory::Upstream,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::TransientNetwork { .. } => ErrorCategory::Transient,
            Self::Account { .. } => ErrorCategory::Account,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code used when the gateway renders this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &str {
        match self {
            Self::InvalidToken { .. }
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::UnknownSigningKey { .. } => "invalid_token",
            Self::Unauthorized { .. } | Self::Account { .. } => "unauthorized",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::UpstreamRejection { error, .. } => error.as_deref().unwrap_or("server_error"),
            Self::Conflict { .. } => "conflict",
            Self::TransientNetwork { .. } => "temporarily_unavailable",
            Self::Configuration { .. } | Self::Internal { .. } => "server_error",
        }
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// A key set that cannot be fetched leaves tokens unverifiable for now. The
/// certs endpoint's own status and body are never replayed to the caller.
impl From<JwksError> for AuthError {
    fn from(err: JwksError) -> Self {
        Self::transient(format!("Signing keys unavailable: {err}"))
    }
}

/// Categories of gateway errors, following the error kinds callers act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed, expired or unverifiable credentials.
    Validation,
    /// Malformed inbound request.
    Request,
    /// Classified rejection from the identity provider.
    Upstream,
    /// Conflicting resource on the identity provider.
    Conflict,
    /// Connection-level failure reaching the identity provider.
    Transient,
    /// Local account lookup failure.
    Account,
    /// Invalid static configuration.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Request => write!(f, "request"),
            Self::Upstream => write!(f, "upstream"),
            Self::Conflict => write!(f, "conflict"),
            Self::Transient => write!(f, "transient"),
            Self::Account => write!(f, "account"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
