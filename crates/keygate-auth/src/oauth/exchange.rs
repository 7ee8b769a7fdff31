//! Token exchange client.
//!
//! Forwards `authorization_code`, `refresh_token` and `client_credentials`
//! grants to the provider's token endpoint as form-encoded POSTs.
//!
//! # Failure handling
//!
//! - Any HTTP response with a non-success status becomes
//!   [`AuthError::UpstreamRejection`] carrying the provider's status and body
//!   verbatim. Such responses are never retried.
//! - A connection-level failure (the request never reached the provider) is
//!   retried exactly once, then surfaced as [`AuthError::TransientNetwork`].
//!   At most two requests are ever sent for one exchange.
//! - Timeouts and other transport errors are surfaced immediately as
//!   [`AuthError::TransientNetwork`].

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// An OAuth2 grant forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// `authorization_code` grant.
    AuthorizationCode {
        /// Code returned by the authorization endpoint.
        code: String,
        /// Redirect URI used in the authorization request.
        redirect_uri: Option<String>,
        /// PKCE verifier for the code challenge sent to the authorization
        /// endpoint.
        code_verifier: Option<String>,
    },
    /// `refresh_token` grant.
    RefreshToken {
        /// Refresh token previously issued by the provider.
        refresh_token: String,
        /// Narrower scope for the refreshed tokens.
        scope: Option<String>,
    },
    /// `client_credentials` grant.
    ClientCredentials {
        /// Requested scope.
        scope: Option<String>,
    },
}

impl Grant {
    /// Returns the `grant_type` form value.
    #[must_use]
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
            Self::ClientCredentials { .. } => "client_credentials",
        }
    }

    /// Parses a grant from token endpoint form parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if `grant_type` is missing or unsupported, or
    /// if a parameter the grant needs is missing.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, AuthError> {
        let required = |name: &str| {
            params
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| AuthError::invalid_request(format!("Missing parameter: {name}")))
        };
        let optional = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();

        match required("grant_type")?.as_str() {
            "authorization_code" => Ok(Self::AuthorizationCode {
                code: required("code")?,
                redirect_uri: optional("redirect_uri"),
                code_verifier: optional("code_verifier"),
            }),
            "refresh_token" => Ok(Self::RefreshToken {
                refresh_token: required("refresh_token")?,
                scope: optional("scope"),
            }),
            "client_credentials" => Ok(Self::ClientCredentials {
                scope: optional("scope"),
            }),
            other => Err(AuthError::invalid_request(format!(
                "Unsupported grant_type: {other}"
            ))),
        }
    }

    fn form_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![("grant_type", self.grant_type())];
        match self {
            Self::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                params.push(("code", code));
                if let Some(uri) = redirect_uri {
                    params.push(("redirect_uri", uri));
                }
                if let Some(verifier) = code_verifier {
                    params.push(("code_verifier", verifier));
                }
            }
            Self::RefreshToken {
                refresh_token,
                scope,
            } => {
                params.push(("refresh_token", refresh_token));
                if let Some(scope) = scope {
                    params.push(("scope", scope));
                }
            }
            Self::ClientCredentials { scope } => {
                if let Some(scope) = scope {
                    params.push(("scope", scope));
                }
            }
        }
        params
    }
}

/// Client credentials presented to the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Client ID.
    pub client_id: String,
    /// Client secret; `None` for public clients.
    pub client_secret: Option<String>,
}

impl ClientCredentials {
    /// Creates credentials for a confidential client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Token response from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// The token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Access token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Refresh token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<u64>,

    /// Refresh token, absent for `client_credentials`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// ID token, when `openid` was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Provider-specific fields passed through unchanged.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Performs OAuth2 grants against the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    http_client: reqwest::Client,
    token_endpoint: Url,
    default_credentials: ClientCredentials,
}

impl TokenExchangeClient {
    /// Creates a client for the given token endpoint.
    ///
    /// `default_credentials` are the gateway's own client, used when a caller
    /// does not present credentials and for [`Self::protected_api_token`].
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        token_endpoint: Url,
        default_credentials: ClientCredentials,
    ) -> Self {
        Self {
            http_client,
            token_endpoint,
            default_credentials,
        }
    }

    /// Returns the provider token endpoint.
    #[must_use]
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    /// Returns the gateway's own client credentials.
    #[must_use]
    pub fn default_credentials(&self) -> &ClientCredentials {
        &self.default_credentials
    }

    /// Exchanges a grant for tokens.
    ///
    /// When `credentials` is `None` the gateway's own client is used.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamRejection` when the provider refuses the grant and
    /// `TransientNetwork` when it cannot be reached.
    pub async fn exchange(
        &self,
        grant: &Grant,
        credentials: Option<&ClientCredentials>,
    ) -> Result<TokenResponse, AuthError> {
        let credentials = credentials.unwrap_or(&self.default_credentials);

        let mut params = grant.form_params();
        params.push(("client_id", &credentials.client_id));
        if let Some(secret) = &credentials.client_secret {
            params.push(("client_secret", secret));
        }

        tracing::debug!(
            grant_type = grant.grant_type(),
            client_id = %credentials.client_id,
            endpoint = %self.token_endpoint,
            "Exchanging grant with provider token endpoint"
        );

        let response = self.send_form(&params).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::transient(format!("Failed to read token response: {e}")))?;

        if !status.is_success() {
            let err = AuthError::upstream_rejection(status.as_u16(), body);
            tracing::warn!(
                status = %status,
                error = err.upstream_error_code().unwrap_or("unclassified"),
                grant_type = grant.grant_type(),
                "Provider rejected token exchange"
            );
            return Err(err);
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::internal(format!("Failed to parse token response: {e}")))
    }

    /// Obtains an access token for the provider's admin API using the
    /// gateway's own client (`client_credentials` grant).
    ///
    /// # Errors
    ///
    /// Same as [`Self::exchange`].
    pub async fn protected_api_token(&self) -> Result<String, AuthError> {
        let tokens = self
            .exchange(&Grant::ClientCredentials { scope: None }, None)
            .await?;
        Ok(tokens.access_token)
    }

    /// Posts the form, retrying once if the connection could not be established.
    async fn send_form(&self, params: &[(&str, &str)]) -> Result<reqwest::Response, AuthError> {
        retry_on_connect(|| {
            self.http_client
                .post(self.token_endpoint.as_str())
                .form(params)
                .send()
        })
        .await
    }
}

/// Runs `send`, and runs it a second time only if the first attempt failed to
/// connect.
async fn retry_on_connect<F, Fut>(mut send: F) -> Result<reqwest::Response, AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut retried = false;
    loop {
        match send().await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_connect() && !retried => {
                tracing::debug!(error = %e, "Token endpoint connection failed, retrying once");
                retried = true;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token endpoint unreachable");
                return Err(AuthError::transient(format!(
                    "Token endpoint request failed: {e}"
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TokenExchangeClient {
        TokenExchangeClient::new(
            reqwest::Client::new(),
            Url::parse(&format!("{}/token", server.uri())).unwrap(),
            ClientCredentials::new("gateway-api", "s3cret"),
        )
    }

    fn token_body() -> serde_json::Value {
        serde_json::json!({
            "access_token": "access-abc",
            "token_type": "Bearer",
            "expires_in": 300,
            "refresh_expires_in": 1800,
            "refresh_token": "refresh-abc",
            "scope": "openid profile",
            "session_state": "7b1c"
        })
    }

    #[test]
    fn test_grant_from_params() {
        let params: HashMap<String, String> = [
            ("grant_type", "authorization_code"),
            ("code", "abc"),
            ("redirect_uri", "https://app.example.com/cb"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(
            Grant::from_params(&params).unwrap(),
            Grant::AuthorizationCode {
                code: "abc".into(),
                redirect_uri: Some("https://app.example.com/cb".into()),
                code_verifier: None,
            }
        );
    }

    #[tokio::test]
    async fn test_pkce_verifier_and_refresh_scope_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=dBjftJeZ4CVP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("scope=openid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let params = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        let client = client_for(&server);

        let code = Grant::from_params(&params(&[
            ("grant_type", "authorization_code"),
            ("code", "abc"),
            ("code_verifier", "dBjftJeZ4CVP"),
        ]))
        .unwrap();
        client.exchange(&code, None).await.unwrap();

        let refresh = Grant::from_params(&params(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", "refresh-abc"),
            ("scope", "openid"),
        ]))
        .unwrap();
        client.exchange(&refresh, None).await.unwrap();
    }

    #[test]
    fn test_grant_from_params_rejects_bad_input() {
        let params = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };

        let err = Grant::from_params(&params(&[])).unwrap_err();
        assert!(err.to_string().contains("grant_type"));

        let err = Grant::from_params(&params(&[("grant_type", "password")])).unwrap_err();
        assert!(err.to_string().contains("Unsupported grant_type: password"));

        let err = Grant::from_params(&params(&[("grant_type", "refresh_token")])).unwrap_err();
        assert!(err.to_string().contains("refresh_token"));
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = ClientCredentials::new("gateway-api", "s3cret");
        let debug = format!("{creds:?}");
        assert!(debug.contains("gateway-api"));
        assert!(!debug.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_authorization_code_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("client_id=gateway-api"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client_for(&server)
            .exchange(
                &Grant::AuthorizationCode {
                    code: "abc".into(),
                    redirect_uri: None,
                    code_verifier: None,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "access-abc");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-abc"));
        assert_eq!(tokens.expires_in, Some(300));
        assert_eq!(tokens.extra["session_state"], "7b1c");
    }

    #[tokio::test]
    async fn test_caller_credentials_override_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=mobile-app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let creds = ClientCredentials {
            client_id: "mobile-app".into(),
            client_secret: None,
        };
        client_for(&server)
            .exchange(
                &Grant::RefreshToken {
                    refresh_token: "refresh-abc".into(),
                    scope: None,
                },
                Some(&creds),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_grant_preserved_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Code not valid"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .exchange(
                &Grant::AuthorizationCode {
                    code: "expired".into(),
                    redirect_uri: None,
                    code_verifier: None,
                },
                None,
            )
            .await
            .unwrap_err();

        match &err {
            AuthError::UpstreamRejection {
                status,
                error,
                description,
                body,
            } => {
                assert_eq!(*status, 400);
                assert_eq!(error.as_deref(), Some("invalid_grant"));
                assert_eq!(description.as_deref(), Some("Code not valid"));
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_server_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .exchange(&Grant::ClientCredentials { scope: None }, None)
            .await
            .unwrap_err();

        assert!(err.is_upstream_rejection());
        assert_eq!(err.oauth_error_code(), "server_error");
    }

    #[tokio::test]
    async fn test_connection_failure_is_transient() {
        // Nothing listens on the discard port
        let client = TokenExchangeClient::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9/token").unwrap(),
            ClientCredentials::new("gateway-api", "s3cret"),
        );

        let err = client
            .exchange(&Grant::ClientCredentials { scope: None }, None)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_connection_failure_retried_exactly_once() {
        let http = reqwest::Client::new();
        let attempts = AtomicUsize::new(0);

        let err = retry_on_connect(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            http.post("http://127.0.0.1:9/token").send()
        })
        .await
        .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_attempt_succeeds_after_connection_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let reachable = format!("{}/token", server.uri());
        let attempts = AtomicUsize::new(0);

        let response = retry_on_connect(|| {
            let url = match attempts.fetch_add(1, Ordering::SeqCst) {
                0 => "http://127.0.0.1:9/token",
                _ => reachable.as_str(),
            };
            http.post(url).send()
        })
        .await
        .unwrap();

        assert!(response.status().is_success());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_request_timeout_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body())
                    .set_delay(Duration::from_secs(5)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let client = TokenExchangeClient::new(
            http,
            Url::parse(&format!("{}/token", server.uri())).unwrap(),
            ClientCredentials::new("gateway-api", "s3cret"),
        );

        let started = Instant::now();
        let err = client.protected_api_token().await.unwrap_err();
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_dropped_exchange_stops_promptly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let started = Instant::now();
        let result =
            tokio::time::timeout(Duration::from_millis(100), client.protected_api_token()).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_protected_api_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "admin-token",
                "expires_in": 60
            })))
            .mount(&server)
            .await;

        let token = client_for(&server).protected_api_token().await.unwrap();
        assert_eq!(token, "admin-token");
    }
}
