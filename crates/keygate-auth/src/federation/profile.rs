//! User profile management on the provider.
//!
//! [`UserProfileService`] creates, updates and reads the canonical user
//! record through the provider's admin users API, authenticated with a
//! protected API token. Profile attributes the provider stores as
//! multi-valued lists (avatar, bio, website) are modeled as named optional
//! string lists on [`ProfileAttributes`].

use reqwest::StatusCode;
use reqwest::header::LOCATION;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;
use crate::types::User;
use crate::userinfo::split_full_name;

/// Multi-valued profile attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileAttributes {
    /// Avatar image URL.
    #[serde(rename = "imageURL", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Vec<String>>,

    /// Short biography.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<Vec<String>>,

    /// Personal website.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Vec<String>>,
}

impl ProfileAttributes {
    /// Builds attributes holding a single value for each present field.
    #[must_use]
    pub fn single(image_url: Option<&str>, bio: Option<&str>, url: Option<&str>) -> Self {
        let one = |v: Option<&str>| v.map(|v| vec![v.to_string()]);
        Self {
            image_url: one(image_url),
            bio: one(bio),
            url: one(url),
        }
    }

    /// Returns `true` if no attribute is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image_url.is_none() && self.bio.is_none() && self.url.is_none()
    }
}

fn first(values: &Option<Vec<String>>) -> Option<String> {
    values.as_ref().and_then(|v| v.first()).cloned()
}

/// User record sent to the provider on create and update.
///
/// Absent fields are left untouched by an update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileRequest {
    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Whether the account is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Whether the email address is verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Multi-valued attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<ProfileAttributes>,
}

impl UserProfileRequest {
    /// Builds a full profile for `user` under `username`.
    #[must_use]
    pub fn for_user(username: impl Into<String>, user: &User) -> Self {
        let (first_name, last_name) = split_full_name(&user.full_name);
        let attributes = ProfileAttributes::single(
            user.image_url.as_deref(),
            user.bio.as_deref(),
            user.url.as_deref(),
        );

        Self {
            username: Some(username.into()),
            enabled: Some(true),
            email_verified: None,
            first_name: Some(first_name),
            last_name: Some(last_name),
            email: Some(user.email.clone()),
            attributes: (!attributes.is_empty()).then_some(attributes),
        }
    }

    /// Returns the full name assembled from first and last name.
    #[must_use]
    pub fn full_name(&self) -> String {
        join_name(self.first_name.as_deref(), self.last_name.as_deref())
    }

    /// Builds the local user record described by this profile.
    #[must_use]
    pub fn to_user(&self, id: uuid::Uuid) -> User {
        let attributes = self.attributes.clone().unwrap_or_default();
        User {
            id,
            full_name: self.full_name(),
            email: self.email.clone().unwrap_or_default(),
            bio: first(&attributes.bio),
            url: first(&attributes.url),
            image_url: first(&attributes.image_url),
        }
    }
}

/// User record returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileResponse {
    /// Provider-side identity id.
    #[serde(default)]
    pub id: String,

    /// Username.
    #[serde(default)]
    pub username: String,

    /// Whether the account is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Whether the email address is verified.
    #[serde(default)]
    pub email_verified: bool,

    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<i64>,

    /// Multi-valued attributes.
    #[serde(default)]
    pub attributes: ProfileAttributes,
}

impl UserProfileResponse {
    /// Copies the provider's profile onto a local user record.
    pub fn apply_to(&self, user: &mut User) {
        user.full_name = join_name(self.first_name.as_deref(), self.last_name.as_deref());
        if let Some(email) = &self.email {
            user.email.clone_from(email);
        }
        user.image_url = first(&self.attributes.image_url);
        user.bio = first(&self.attributes.bio);
        user.url = first(&self.attributes.url);
    }
}

fn join_name(first: Option<&str>, last: Option<&str>) -> String {
    [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts the identity id from a `Location` header returned by a create call.
///
/// The id is the last non-empty path segment, e.g.
/// `https://sso.example.com/auth/admin/realms/gateway/users/5f0e` gives `5f0e`.
///
/// # Errors
///
/// Returns an upstream error if the location has no path segment.
pub fn identity_id_from_location(location: &str) -> Result<String, AuthError> {
    let path = location
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');

    match path.rsplit('/').next() {
        Some(segment) if !segment.is_empty() && !segment.contains(':') => Ok(segment.to_string()),
        _ => Err(missing_location(format!(
            "Location {location:?} has no identity id"
        ))),
    }
}

fn missing_location(description: String) -> AuthError {
    AuthError::UpstreamRejection {
        status: StatusCode::CREATED.as_u16(),
        error: None,
        description: Some(description),
        body: String::new(),
    }
}

/// Client for the provider's admin users API.
#[derive(Debug, Clone)]
pub struct UserProfileService {
    http_client: reqwest::Client,
}

impl UserProfileService {
    /// Creates a profile service using the given HTTP client.
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Creates a user and returns the `Location` of the new record.
    ///
    /// Not idempotent: creating a username that already exists fails with a
    /// conflict.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for a duplicate username or email,
    /// `UpstreamRejection` for other non-2xx statuses or a missing `Location`
    /// header, and `TransientNetwork` when the provider cannot be reached.
    pub async fn create(
        &self,
        profile: &UserProfileRequest,
        access_token: &str,
        admin_users_url: &Url,
    ) -> Result<String, AuthError> {
        let response = self
            .http_client
            .post(admin_users_url.as_str())
            .bearer_auth(access_token)
            .json(profile)
            .send()
            .await
            .map_err(|e| AuthError::transient(format!("Create user request failed: {e}")))?;

        let response = check_response(response, "create user").await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| missing_location("Create user response has no Location header".into()))?;

        tracing::info!(
            username = profile.username.as_deref().unwrap_or_default(),
            location = %location,
            "Created provider user"
        );
        Ok(location)
    }

    /// Updates an existing user.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create`].
    pub async fn update(
        &self,
        profile: &UserProfileRequest,
        access_token: &str,
        user_url: &Url,
    ) -> Result<(), AuthError> {
        let response = self
            .http_client
            .put(user_url.as_str())
            .bearer_auth(access_token)
            .json(profile)
            .send()
            .await
            .map_err(|e| AuthError::transient(format!("Update user request failed: {e}")))?;

        check_response(response, "update user").await?;
        tracing::debug!(url = %user_url, "Updated provider user");
        Ok(())
    }

    /// Reads a user.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamRejection` for non-2xx statuses (including 404) and
    /// `TransientNetwork` when the provider cannot be reached.
    pub async fn get(&self, access_token: &str, user_url: &Url) -> Result<UserProfileResponse, AuthError> {
        let response = self
            .http_client
            .get(user_url.as_str())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::transient(format!("Get user request failed: {e}")))?;

        let response = check_response(response, "get user").await?;
        response
            .json()
            .await
            .map_err(|e| AuthError::internal(format!("Failed to parse user profile: {e}")))
    }

    /// Looks a user up by exact username.
    ///
    /// The provider stores usernames lowercased, so the match ignores ASCII
    /// case.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get`].
    pub async fn find_by_username(
        &self,
        username: &str,
        access_token: &str,
        admin_users_url: &Url,
    ) -> Result<Option<UserProfileResponse>, AuthError> {
        let response = self
            .http_client
            .get(admin_users_url.as_str())
            .query(&[("username", username), ("exact", "true")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::transient(format!("Find user request failed: {e}")))?;

        let response = check_response(response, "find user").await?;
        let users: Vec<UserProfileResponse> = response
            .json()
            .await
            .map_err(|e| AuthError::internal(format!("Failed to parse user search: {e}")))?;

        Ok(users
            .into_iter()
            .find(|user| user.username.eq_ignore_ascii_case(username)))
    }
}

async fn check_response(
    response: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, operation, "Provider rejected admin request");

    if status == StatusCode::CONFLICT {
        let message = match AuthError::upstream_rejection(status.as_u16(), body) {
            AuthError::UpstreamRejection {
                description: Some(description),
                ..
            } => description,
            _ => format!("Provider reported a conflict on {operation}"),
        };
        return Err(AuthError::conflict(message));
    }

    Err(AuthError::upstream_rejection(status.as_u16(), body))
}
