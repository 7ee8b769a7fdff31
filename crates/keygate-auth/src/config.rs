//! Gateway configuration.
//!
//! This module provides the configuration types for the gateway's token and
//! identity-linking layer: where the upstream identity provider lives, which
//! client the gateway authenticates as, how bearer tokens are validated and
//! how outbound HTTP calls behave.
//!
//! Configuration is loaded once at startup by the binary and treated as
//! read-only afterwards. Everything that can be wrong with it is reported by
//! [`GatewayConfig::validate`] and [`ProviderEndpoints::from_config`], so a
//! bad value aborts startup instead of failing individual requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Root gateway configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.provider]
/// url = "https://sso.example.com"
/// realm = "gateway"
/// client_id = "gateway-api"
/// client_secret = "secret"
///
/// [auth.tokens]
/// leeway = "0s"
/// algorithms = ["RS256"]
///
/// [auth.http]
/// request_timeout = "30s"
///
/// [auth.accounts]
/// auto_provision = true
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upstream identity provider configuration.
    pub provider: ProviderConfig,

    /// Bearer token validation configuration.
    pub tokens: TokenValidationConfig,

    /// Outbound HTTP client configuration.
    pub http: HttpClientConfig,

    /// Local account handling.
    pub accounts: AccountConfig,
}

impl GatewayConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a required value is missing or malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.validate()?;
        self.tokens.validate()?;
        self.http.validate()?;
        Ok(())
    }
}

/// Upstream identity provider configuration.
///
/// Endpoint URLs default to the Keycloak realm layout derived from `url` and
/// `realm`; each one can be overridden individually.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the identity provider (e.g. `https://sso.example.com`).
    pub url: String,

    /// Realm the gateway's users live in.
    pub realm: String,

    /// Client ID the gateway authenticates as.
    pub client_id: String,

    /// Client secret for the gateway's confidential client.
    #[serde(skip_serializing)]
    pub client_secret: String,

    /// Override for the token endpoint.
    pub token_endpoint: Option<String>,

    /// Override for the JWKS (certs) endpoint.
    pub certs_endpoint: Option<String>,

    /// Override for the authorization endpoint.
    pub authorization_endpoint: Option<String>,

    /// Override for the end-session (logout) endpoint.
    pub logout_endpoint: Option<String>,

    /// Override for the admin users endpoint.
    pub admin_users_endpoint: Option<String>,
}

impl ProviderConfig {
    /// Validates the provider section.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider location or client credentials are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::missing("provider.url"));
        }
        if self.realm.trim().is_empty() {
            return Err(ConfigError::missing("provider.realm"));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::missing("provider.client_id"));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::missing("provider.client_secret"));
        }
        Ok(())
    }
}

/// Bearer token validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenValidationConfig {
    /// Clock skew tolerance applied to `exp` and `iat`.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,

    /// Expected `iss` claim. When unset, the issuer is not checked.
    pub expected_issuer: Option<String>,

    /// Accepted `aud` values. When unset, the audience is not checked.
    pub audience: Option<Vec<String>>,

    /// Accepted signing algorithms.
    pub algorithms: Vec<String>,
}

impl Default for TokenValidationConfig {
    fn default() -> Self {
        Self {
            leeway: Duration::ZERO,
            expected_issuer: None,
            audience: None,
            algorithms: vec!["RS256".to_string()],
        }
    }
}

impl TokenValidationConfig {
    /// Validates the token section.
    ///
    /// # Errors
    ///
    /// Returns an error if no algorithm is configured or one is unknown.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.algorithms.is_empty() {
            return Err(ConfigError::invalid(
                "tokens.algorithms",
                "at least one algorithm is required",
            ));
        }
        self.parsed_algorithms().map(|_| ())
    }

    /// Parses the configured algorithm names.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown algorithm.
    pub fn parsed_algorithms(&self) -> Result<Vec<jsonwebtoken::Algorithm>, ConfigError> {
        self.algorithms
            .iter()
            .map(|name| {
                name.parse::<jsonwebtoken::Algorithm>().map_err(|_| {
                    ConfigError::invalid("tokens.algorithms", format!("unknown algorithm {name}"))
                })
            })
            .collect()
    }
}

/// Local account handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Create a local account from the token claims the first time an
    /// unknown subject asks for its user-info.
    pub auto_provision: bool,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            auto_provision: true,
        }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Timeout for every outbound request (token, JWKS, admin API).
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Whether plain-HTTP provider endpoints are allowed.
    /// This should only be enabled for local development and tests.
    pub allow_http: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            allow_http: false,
        }
    }
}

impl HttpClientConfig {
    /// Validates the HTTP section.
    ///
    /// # Errors
    ///
    /// Returns an error if the request timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "http.request_timeout",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Builds the shared outbound HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn build_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| ConfigError::invalid("http", e.to_string()))
    }
}

/// Provider endpoint URLs, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    /// OAuth2 token endpoint.
    pub token: Url,
    /// JWKS endpoint advertised as `jwks_uri`.
    pub certs: Url,
    /// Authorization endpoint users are redirected to.
    pub authorization: Url,
    /// End-session endpoint users are redirected to on logout.
    pub logout: Url,
    /// Admin users collection endpoint.
    pub admin_users: Url,
}

impl ProviderEndpoints {
    /// Resolves all provider endpoints from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL cannot be parsed, or if it uses plain HTTP
    /// while `allow_http` is disabled.
    pub fn from_config(provider: &ProviderConfig, http: &HttpClientConfig) -> Result<Self, ConfigError> {
        provider.validate()?;

        let base = provider.url.trim_end_matches('/');
        let realm = provider.realm.trim_matches('/');
        let oidc = format!("{base}/auth/realms/{realm}/protocol/openid-connect");

        let resolve = |field: &'static str, configured: &Option<String>, default: String| {
            let raw = configured.clone().unwrap_or(default);
            let url = Url::parse(&raw).map_err(|e| ConfigError::invalid(field, e.to_string()))?;
            check_scheme(field, &url, http.allow_http)?;
            Ok::<Url, ConfigError>(url)
        };

        Ok(Self {
            token: resolve(
                "provider.token_endpoint",
                &provider.token_endpoint,
                format!("{oidc}/token"),
            )?,
            certs: resolve(
                "provider.certs_endpoint",
                &provider.certs_endpoint,
                format!("{oidc}/certs"),
            )?,
            authorization: resolve(
                "provider.authorization_endpoint",
                &provider.authorization_endpoint,
                format!("{oidc}/auth"),
            )?,
            logout: resolve(
                "provider.logout_endpoint",
                &provider.logout_endpoint,
                format!("{oidc}/logout"),
            )?,
            admin_users: resolve(
                "provider.admin_users_endpoint",
                &provider.admin_users_endpoint,
                format!("{base}/auth/admin/realms/{realm}/users"),
            )?,
        })
    }

    /// Returns the admin URL of a single provider-side user.
    #[must_use]
    pub fn user_url(&self, identity_id: &str) -> Url {
        let mut url = self.admin_users.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(identity_id);
        }
        url
    }

    /// Returns the federated-identity link URL for a user and identity provider.
    #[must_use]
    pub fn link_url(&self, identity_id: &str, identity_provider: &str) -> Url {
        let mut url = self.user_url(identity_id);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("federated-identity").push(identity_provider);
        }
        url
    }
}

fn check_scheme(field: &'static str, url: &Url, allow_http: bool) -> Result<(), ConfigError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        scheme => Err(ConfigError::invalid(
            field,
            format!("scheme {scheme} is not allowed"),
        )),
    }
}

/// Configuration errors. These are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required value is missing.
    #[error("Missing configuration value: {0}")]
    Missing(String),

    /// A value is present but invalid.
    #[error("Invalid configuration value for {field}: {message}")]
    Invalid {
        /// The offending configuration key.
        field: String,
        /// Why the value is invalid.
        message: String,
    },
}

impl ConfigError {
    /// Creates a `Missing` error.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing(field.into())
    }

    /// Creates an `Invalid` error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
