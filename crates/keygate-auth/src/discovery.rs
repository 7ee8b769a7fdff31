//! OpenID Connect discovery document.
//!
//! The gateway advertises its own authorize, token and logout endpoints,
//! computed from the base URL of the incoming request, while `jwks_uri` points
//! straight at the provider's certs endpoint so clients verify tokens against
//! the provider's keys.
//!
//! # References
//!
//! - [OpenID Connect Discovery 1.0](https://openid.net/specs/openid-connect-discovery-1_0.html)

use serde::{Deserialize, Serialize};
use url::Url;

/// Gateway path of the authorization redirect endpoint.
pub const AUTHORIZE_PATH: &str = "/api/authorize";
/// Gateway path of the token exchange endpoint.
pub const TOKEN_PATH: &str = "/api/token";
/// Gateway path of the logout redirect endpoint.
pub const LOGOUT_PATH: &str = "/api/logout";
/// Gateway path of the user-info endpoint.
pub const USERINFO_PATH: &str = "/api/userinfo";
/// Gateway path of the discovery document.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Scheme and host the current request was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBase {
    scheme: String,
    host: String,
}

impl RequestBase {
    /// Creates a request base. A trailing slash on `host` is dropped.
    #[must_use]
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the request scheme (`http` or `https`).
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the request host, including any port.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the absolute URL of `path` on this base.
    ///
    /// An empty path yields the bare base URL with no trailing slash.
    #[must_use]
    pub fn absolute_url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{}://{}", self.scheme, self.host)
        } else {
            format!("{}://{}/{}", self.scheme, self.host, path)
        }
    }
}

/// OpenID provider configuration document.
///
/// # Example Response
///
/// ```json
/// {
///   "issuer": "https://api.example.com",
///   "authorization_endpoint": "https://api.example.com/api/authorize",
///   "token_endpoint": "https://api.example.com/api/token",
///   "end_session_endpoint": "https://api.example.com/api/logout",
///   "jwks_uri": "https://sso.example.com/auth/realms/gateway/protocol/openid-connect/certs",
///   "response_types_supported": ["code"],
///   "grant_types_supported": ["authorization_code", "refresh_token", "client_credentials"],
///   "subject_types_supported": [],
///   "id_token_signing_alg_values_supported": ["RS256"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    /// Base URL of this gateway.
    pub issuer: String,
    /// Gateway authorization endpoint.
    pub authorization_endpoint: String,
    /// Gateway token endpoint.
    pub token_endpoint: String,
    /// Gateway logout endpoint.
    pub end_session_endpoint: String,
    /// Provider certs endpoint.
    pub jwks_uri: String,
    /// Supported response types.
    pub response_types_supported: Vec<String>,
    /// Supported grant types.
    pub grant_types_supported: Vec<String>,
    /// Supported subject types; intentionally empty.
    pub subject_types_supported: Vec<String>,
    /// Supported ID token signing algorithms.
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl OpenIdConfiguration {
    /// Builds the document for a request addressed to `base`.
    #[must_use]
    pub fn build(base: &RequestBase, jwks_uri: &Url) -> Self {
        let strings =
            |values: &[&str]| -> Vec<String> { values.iter().map(|v| (*v).to_string()).collect() };

        Self {
            issuer: base.absolute_url(""),
            authorization_endpoint: base.absolute_url(AUTHORIZE_PATH),
            token_endpoint: base.absolute_url(TOKEN_PATH),
            end_session_endpoint: base.absolute_url(LOGOUT_PATH),
            jwks_uri: jwks_uri.to_string(),
            response_types_supported: strings(&["code"]),
            grant_types_supported: strings(&[
                "authorization_code",
                "refresh_token",
                "client_credentials",
            ]),
            subject_types_supported: Vec::new(),
            id_token_signing_alg_values_supported: strings(&["RS256"]),
        }
    }
}
