//! Local account types shared across the gateway.
//!
//! - [`Identity`] - a provider-side identity known to the gateway
//! - [`User`] - the profile owned by an identity

pub mod account;

pub use account::{Identity, User};
