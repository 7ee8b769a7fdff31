//! Provider-side account management.
//!
//! This module talks to the identity provider's admin API:
//!
//! - [`profile`] - create, update and read provider users
//! - [`link`] - idempotent federated identity linking
//! - [`provisioning`] - the post-signup flow tying both to local storage

pub mod link;
pub mod profile;
pub mod provisioning;

pub use link::{IdentityLinkService, LinkOutcome, LinkRequest};
pub use profile::{
    ProfileAttributes, UserProfileRequest, UserProfileResponse, UserProfileService,
    identity_id_from_location,
};
pub use provisioning::{ProvisionedAccount, ProvisioningService};
