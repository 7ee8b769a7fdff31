//! Account provisioning.
//!
//! This module provides the [`ProvisioningService`] that runs the post-signup
//! flow for a new account:
//!
//! 1. **Protected API token** - `client_credentials` grant for the gateway client
//! 2. **Create user** - POST the profile to the provider's admin users API
//! 3. **Resolve identity id** - last path segment of the returned `Location`
//! 4. **Link identity** - attach the federated identity provider account
//! 5. **Record account** - store the local [`Identity`] and [`User`]
//!
//! A run that failed after step 2 can be retried. When creation reports a
//! conflict, the existing provider user is looked up by username and, if its
//! email matches the profile, the run resumes at step 4 with that user's id.
//! Linking is idempotent and storing reuses the local user of a known
//! identity, so a retry never duplicates anything. A conflict with a user
//! whose email differs is returned unchanged.
//!
//! # Example
//!
//! ```ignore
//! use keygate_auth::federation::ProvisioningService;
//!
//! let service = ProvisioningService::new(exchange, profiles, links, endpoints, storage);
//! let account = service.provision(&profile, "rhd").await?;
//! println!("Identity {} provisioned ({})", account.identity.id, account.link);
//! ```

use std::sync::Arc;

use uuid::Uuid;

use super::link::{IdentityLinkService, LinkOutcome, LinkRequest};
use super::profile::{UserProfileRequest, UserProfileService, identity_id_from_location};
use crate::config::ProviderEndpoints;
use crate::error::AuthError;
use crate::oauth::TokenExchangeClient;
use crate::storage::AccountStorage;
use crate::types::{Identity, User};

/// Result of a successful provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedAccount {
    /// The stored identity; its id is the provider-side user id.
    pub identity: Identity,

    /// The stored user.
    pub user: User,

    /// Whether the federated link was created or already present.
    pub link: LinkOutcome,
}

/// Orchestrates user creation, identity linking and local account storage.
pub struct ProvisioningService {
    exchange: Arc<TokenExchangeClient>,
    profiles: UserProfileService,
    links: IdentityLinkService,
    endpoints: Arc<ProviderEndpoints>,
    storage: Arc<dyn AccountStorage>,
}

impl ProvisioningService {
    /// Creates a provisioning service.
    #[must_use]
    pub fn new(
        exchange: Arc<TokenExchangeClient>,
        profiles: UserProfileService,
        links: IdentityLinkService,
        endpoints: Arc<ProviderEndpoints>,
        storage: Arc<dyn AccountStorage>,
    ) -> Self {
        Self {
            exchange,
            profiles,
            links,
            endpoints,
            storage,
        }
    }

    /// Provisions a new account and links it to `identity_provider`.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the profile has no username
    /// - `Conflict` if the username already exists on the provider
    /// - `UpstreamRejection` / `TransientNetwork` from any provider call
    /// - `Account` if the local account cannot be stored
    pub async fn provision(
        &self,
        profile: &UserProfileRequest,
        identity_provider: &str,
    ) -> Result<ProvisionedAccount, AuthError> {
        let username = profile
            .username
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AuthError::invalid_request("Profile username is required"))?;

        let access_token = self.exchange.protected_api_token().await?;

        let identity_id = match self
            .profiles
            .create(profile, &access_token, &self.endpoints.admin_users)
            .await
        {
            Ok(location) => identity_id_from_location(&location)?,
            Err(err) if err.is_conflict() => {
                self.existing_identity_id(profile, username, &access_token, err)
                    .await?
            }
            Err(err) => return Err(err),
        };
        let identity_uuid = Uuid::parse_str(&identity_id).map_err(|e| {
            AuthError::internal(format!("Provider identity id {identity_id} is not a UUID: {e}"))
        })?;

        let link_request = LinkRequest {
            user_id: identity_id.clone(),
            username: username.to_string(),
            identity_provider: identity_provider.to_string(),
        };
        let link_url = self.endpoints.link_url(&identity_id, identity_provider);
        let link = self
            .links
            .link(&link_request, &access_token, &link_url)
            .await?;

        let user_id = match self.storage.find_identity(identity_uuid).await? {
            Some(existing) => existing.user_id,
            None => Uuid::new_v4(),
        };
        let user = profile.to_user(user_id);
        let identity = Identity::new(identity_uuid, username, user.id);
        self.storage.save_account(&identity, &user).await?;

        tracing::info!(
            identity_id = %identity.id,
            username = %identity.username,
            identity_provider,
            link = %link,
            "Provisioned account"
        );

        Ok(ProvisionedAccount {
            identity,
            user,
            link,
        })
    }

    /// Resolves a create conflict to the provider user left by an earlier run.
    ///
    /// Returns `conflict` when no user has the username or its email differs
    /// from the profile's.
    async fn existing_identity_id(
        &self,
        profile: &UserProfileRequest,
        username: &str,
        access_token: &str,
        conflict: AuthError,
    ) -> Result<String, AuthError> {
        let Some(existing) = self
            .profiles
            .find_by_username(username, access_token, &self.endpoints.admin_users)
            .await?
        else {
            return Err(conflict);
        };

        let same_email = match (&profile.email, &existing.email) {
            (Some(wanted), Some(found)) => wanted.eq_ignore_ascii_case(found),
            (None, _) => true,
            (Some(_), None) => false,
        };
        if !same_email || existing.id.is_empty() {
            return Err(conflict);
        }

        tracing::info!(
            username,
            identity_id = %existing.id,
            "Resuming provisioning for existing provider user"
        );
        Ok(existing.id)
    }
}
