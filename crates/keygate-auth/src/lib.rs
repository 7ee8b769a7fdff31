//! # keygate-auth
//!
//! Token and identity-linking layer of the Keygate OpenID Connect gateway.
//!
//! The gateway sits between API consumers and an upstream OAuth 2.0 / OpenID
//! Connect identity provider (Keycloak). Credentials, passwords and social
//! login handshakes stay with the provider; the gateway publishes a stable
//! discovery, token and user-info surface and provisions accounts through the
//! provider's admin API.
//!
//! This crate provides:
//! - OpenID Connect discovery for the gateway's own endpoints
//! - Bearer token validation against the provider's signing keys
//! - OAuth 2.0 token exchange with the provider
//! - Idempotent federated identity linking
//! - Provider user profile management and account provisioning
//! - User-info assembly from local accounts
//!
//! ## Modules
//!
//! - [`config`] - Gateway configuration and provider endpoints
//! - [`discovery`] - OpenID configuration document
//! - [`token`] - Signing key cache and token validation
//! - [`oauth`] - Token exchange with the provider
//! - [`federation`] - User profiles, identity linking and provisioning
//! - [`userinfo`] - User-info assembly
//! - [`storage`] - Storage traits for local accounts
//! - [`http`] - Axum HTTP handlers for the gateway endpoints

pub mod config;
pub mod discovery;
pub mod error;
pub mod federation;
pub mod http;
pub mod oauth;
pub mod storage;
pub mod token;
pub mod types;
pub mod userinfo;

pub use config::{ConfigError, GatewayConfig, ProviderEndpoints};
pub use discovery::{OpenIdConfiguration, RequestBase};
pub use error::{AuthError, ErrorCategory};
pub use federation::{
    IdentityLinkService, LinkOutcome, LinkRequest, ProfileAttributes, ProvisionedAccount,
    ProvisioningService, UserProfileRequest, UserProfileResponse, UserProfileService,
};
pub use http::{GatewayState, router};
pub use oauth::{ClientCredentials, Grant, TokenExchangeClient, TokenResponse};
pub use storage::{AccountStorage, InMemoryAccountStorage};
pub use token::{SigningKeyCache, TokenClaims, TokenValidator};
pub use types::{Identity, User};
pub use userinfo::{UserInfo, UserInfoAssembler};

/// Type alias for gateway results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use keygate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{ConfigError, GatewayConfig, ProviderEndpoints};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::federation::{LinkOutcome, ProvisioningService};
    pub use crate::http::{GatewayState, router};
    pub use crate::oauth::{Grant, TokenExchangeClient};
    pub use crate::storage::AccountStorage;
    pub use crate::token::{TokenClaims, TokenValidator};
    pub use crate::types::{Identity, User};
    pub use crate::userinfo::{UserInfo, UserInfoAssembler};
}
