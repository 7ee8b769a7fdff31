//! Storage traits for local account data.
//!
//! The gateway keeps a small local view of every provisioned account: the
//! [`Identity`](crate::types::Identity) the provider authenticates and the
//! [`User`](crate::types::User) profile it owns.
//!
//! # Implementations
//!
//! - [`InMemoryAccountStorage`] - process-local maps, used by tests and the
//!   default server build

pub mod account;

pub use account::{AccountStorage, InMemoryAccountStorage};
