//! HTTP handlers for the gateway endpoints.
//!
//! This module provides the Axum handlers and the [`router`] that mounts them.
//!
//! # Available Handlers
//!
//! - [`discovery`] - OpenID Connect discovery document
//! - [`redirect`] - authorization and logout redirects to the provider
//! - [`token`] - token exchange
//! - [`userinfo`] - user-info claims for a bearer token

pub mod discovery;
pub mod error;
pub mod extract;
pub mod redirect;
pub mod token;
pub mod userinfo;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::config::ProviderEndpoints;
use crate::discovery::{AUTHORIZE_PATH, DISCOVERY_PATH, LOGOUT_PATH, TOKEN_PATH, USERINFO_PATH};
use crate::oauth::TokenExchangeClient;
use crate::token::TokenValidator;
use crate::userinfo::UserInfoAssembler;

pub use discovery::openid_configuration_handler;
pub use extract::{BearerToken, basic_client_credentials};
pub use redirect::{authorize_handler, logout_handler};
pub use token::token_handler;
pub use userinfo::userinfo_handler;

/// Discovery document path under the API prefix.
pub const API_DISCOVERY_PATH: &str = "/api/.well-known/openid-configuration";

/// Shared state for all gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Provider endpoints resolved at startup.
    pub endpoints: Arc<ProviderEndpoints>,
    /// Bearer token validator.
    pub validator: Arc<TokenValidator>,
    /// Provider token endpoint client.
    pub exchange: Arc<TokenExchangeClient>,
    /// User-info assembler.
    pub userinfo: UserInfoAssembler,
}

impl GatewayState {
    /// Creates the handler state.
    pub fn new(
        endpoints: Arc<ProviderEndpoints>,
        validator: Arc<TokenValidator>,
        exchange: Arc<TokenExchangeClient>,
        userinfo: UserInfoAssembler,
    ) -> Self {
        Self {
            endpoints,
            validator,
            exchange,
            userinfo,
        }
    }
}

/// Builds the router with every gateway endpoint.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route(DISCOVERY_PATH, get(openid_configuration_handler))
        .route(API_DISCOVERY_PATH, get(openid_configuration_handler))
        .route(AUTHORIZE_PATH, get(authorize_handler))
        .route(TOKEN_PATH, post(token_handler))
        .route(LOGOUT_PATH, get(logout_handler))
        .route(USERINFO_PATH, get(userinfo_handler))
        .with_state(state)
}
