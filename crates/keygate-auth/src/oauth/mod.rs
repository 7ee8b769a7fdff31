//! OAuth 2.0 token exchange against the upstream identity provider.
//!
//! The gateway does not issue tokens itself. Every grant presented at the
//! gateway's token endpoint is forwarded to the provider by the
//! [`TokenExchangeClient`], and the provider's answer (tokens or a classified
//! OAuth2 error) is handed back to the caller.
//!
//! # Example
//!
//! ```ignore
//! use keygate_auth::oauth::{ClientCredentials, Grant, TokenExchangeClient};
//!
//! let client = TokenExchangeClient::new(http_client, endpoints.token.clone(), credentials);
//!
//! let tokens = client
//!     .exchange(
//!         &Grant::AuthorizationCode {
//!             code: "abc".into(),
//!             redirect_uri: Some("https://app.example.com/callback".into()),
//!             code_verifier: None,
//!         },
//!         None,
//!     )
//!     .await?;
//! ```

pub mod exchange;

pub use exchange::{ClientCredentials, Grant, TokenExchangeClient, TokenResponse};
