//! Local identity and user records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated identity.
///
/// The id is the provider's subject for this identity and never changes; the
/// username can be renamed on the provider. Each identity owns exactly one
/// [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-side identity id (the token `sub`).
    pub id: Uuid,

    /// Current username.
    pub username: String,

    /// The user this identity owns.
    pub user_id: Uuid,
}

impl Identity {
    /// Creates an identity owning `user_id`.
    #[must_use]
    pub fn new(id: Uuid, username: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            id,
            username: username.into(),
            user_id,
        }
    }
}

/// Profile attributes of a local user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    /// Local user id.
    pub id: Uuid,

    /// Full display name, e.g. "Jane Doe".
    pub full_name: String,

    /// Email address.
    pub email: String,

    /// Short biography.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    /// Personal website.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Avatar image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}
