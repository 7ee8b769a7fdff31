//! Federated identity linking.
//!
//! Links a provider-side user to an account at a third-party identity provider
//! (e.g. a social login) through the provider's admin API:
//!
//! ```text
//! POST {admin users}/{identity id}/federated-identity/{identity provider}
//! Authorization: Bearer <protected API token>
//!
//! {"userId": "...", "userName": "...", "identityProvider": "..."}
//! ```
//!
//! Linking is idempotent per (user, identity provider): when the provider
//! answers `409 Conflict` the link already exists and the call succeeds with
//! [`LinkOutcome::AlreadyLinked`].

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// Federated identity link request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
    /// Account id at the federated identity provider.
    #[serde(rename = "userId")]
    pub user_id: String,

    /// Username at the federated identity provider.
    #[serde(rename = "userName")]
    pub username: String,

    /// Alias of the federated identity provider (e.g. `rhd`, `github`).
    #[serde(rename = "identityProvider")]
    pub identity_provider: String,
}

/// Outcome of a successful link call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The link was created by this call.
    Created,

    /// The link already existed.
    AlreadyLinked,
}

impl LinkOutcome {
    /// Returns `true` if this call created the link.
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

impl std::fmt::Display for LinkOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::AlreadyLinked => write!(f, "already_linked"),
        }
    }
}

/// Client for the provider's federated-identity admin endpoint.
#[derive(Debug, Clone)]
pub struct IdentityLinkService {
    http_client: reqwest::Client,
}

impl IdentityLinkService {
    /// Creates a link service using the given HTTP client.
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Links a federated identity to a provider-side user.
    ///
    /// `link_url` is the user's federated-identity URL for the identity
    /// provider, see [`ProviderEndpoints::link_url`](crate::config::ProviderEndpoints::link_url).
    ///
    /// # Errors
    ///
    /// Returns `UpstreamRejection` for any non-2xx status other than 409, and
    /// `TransientNetwork` when the provider cannot be reached. Nothing is
    /// retried here.
    pub async fn link(
        &self,
        request: &LinkRequest,
        access_token: &str,
        link_url: &Url,
    ) -> Result<LinkOutcome, AuthError> {
        let response = self
            .http_client
            .post(link_url.as_str())
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthError::transient(format!("Identity link request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            tracing::debug!(
                identity_provider = %request.identity_provider,
                username = %request.username,
                "Federated identity already linked"
            );
            return Ok(LinkOutcome::AlreadyLinked);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = %status,
                identity_provider = %request.identity_provider,
                "Provider rejected federated identity link"
            );
            return Err(AuthError::upstream_rejection(status.as_u16(), body));
        }

        tracing::info!(
            identity_provider = %request.identity_provider,
            username = %request.username,
            "Linked federated identity"
        );
        Ok(LinkOutcome::Created)
    }
}
