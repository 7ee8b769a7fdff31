//! User-info assembly.
//!
//! Resolves the account behind a validated token and renders the OpenID
//! Connect user-info claims for it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AuthError;
use crate::storage::AccountStorage;
use crate::token::TokenClaims;
use crate::types::{Identity, User};

/// User-info response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Identity id.
    pub sub: String,

    /// First token of the user's full name.
    pub given_name: String,

    /// Remainder of the user's full name; empty for single-word names.
    pub family_name: String,

    /// Identity username.
    pub preferred_username: String,

    /// User email.
    pub email: String,
}

impl UserInfo {
    /// Builds the user-info claims for an identity and the user it owns.
    #[must_use]
    pub fn from_account(identity: &Identity, user: &User) -> Self {
        let (given_name, family_name) = split_full_name(&user.full_name);
        Self {
            sub: identity.id.to_string(),
            given_name,
            family_name,
            preferred_username: identity.username.clone(),
            email: user.email.clone(),
        }
    }
}

/// Splits a full name into given and family name at the first whitespace.
///
/// The family name keeps any further words (`"Jane van Doe"` gives
/// `("Jane", "van Doe")`) and is empty when the name has a single word.
#[must_use]
pub fn split_full_name(full_name: &str) -> (String, String) {
    let full_name = full_name.trim();
    match full_name.split_once(char::is_whitespace) {
        Some((given, family)) => (given.to_string(), family.trim().to_string()),
        None => (full_name.to_string(), String::new()),
    }
}

/// Resolves token subjects to local accounts and renders user-info claims.
#[derive(Clone)]
pub struct UserInfoAssembler {
    storage: Arc<dyn AccountStorage>,
    auto_provision: bool,
    provision_lock: Arc<Mutex<()>>,
}

impl UserInfoAssembler {
    /// Creates an assembler backed by the given account storage.
    ///
    /// Unknown subjects are provisioned from their token claims; see
    /// [`with_auto_provision`](Self::with_auto_provision).
    #[must_use]
    pub fn new(storage: Arc<dyn AccountStorage>) -> Self {
        Self {
            storage,
            auto_provision: true,
            provision_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Sets whether unknown subjects get a local account created on first use.
    #[must_use]
    pub fn with_auto_provision(mut self, auto_provision: bool) -> Self {
        self.auto_provision = auto_provision;
        self
    }

    /// Assembles user-info claims for the token's subject.
    ///
    /// # Errors
    ///
    /// Returns an `Account` error if the subject is not an identity id, if it
    /// is unknown and auto-provisioning is off, or if the storage fails.
    pub async fn assemble(&self, claims: &TokenClaims) -> Result<UserInfo, AuthError> {
        let identity_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::account(format!("Subject {} is not an identity id", claims.sub)))?;

        let (identity, user) = match self.storage.find_account(identity_id).await? {
            Some(account) => account,
            None if self.auto_provision => self.provision(identity_id, claims).await?,
            None => {
                return Err(AuthError::account(format!(
                    "No account for identity {identity_id}"
                )));
            }
        };

        Ok(UserInfo::from_account(&identity, &user))
    }

    /// Creates the local account for a first-seen subject.
    ///
    /// Serialized so two first requests for one subject store one user.
    async fn provision(
        &self,
        identity_id: Uuid,
        claims: &TokenClaims,
    ) -> Result<(Identity, User), AuthError> {
        let _guard = self.provision_lock.lock().await;
        if let Some(account) = self.storage.find_account(identity_id).await? {
            return Ok(account);
        }

        let (identity, user) = account_from_claims(identity_id, claims);
        self.storage.save_account(&identity, &user).await?;
        tracing::info!(
            identity_id = %identity.id,
            user_id = %user.id,
            username = %identity.username,
            "Provisioned local account from token claims"
        );
        Ok((identity, user))
    }
}

/// Builds an identity and its user from token claims.
///
/// The full name comes from `name`, falling back to `given_name` and
/// `family_name`. A token without `preferred_username` uses the subject.
fn account_from_claims(identity_id: Uuid, claims: &TokenClaims) -> (Identity, User) {
    let claim = |name: &str| {
        claims
            .extra
            .get(name)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let full_name = match claim("name") {
        Some(name) => name.to_string(),
        None => [claim("given_name"), claim("family_name")]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" "),
    };

    let user = User {
        id: Uuid::new_v4(),
        full_name,
        email: claims.email.clone().unwrap_or_default(),
        ..Default::default()
    };
    let username = claims.username().unwrap_or(&claims.sub);
    (Identity::new(identity_id, username, user.id), user)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::storage::InMemoryAccountStorage;

    fn claims_for(sub: &str) -> TokenClaims {
        TokenClaims {
            sub: sub.to_string(),
            exp: i64::MAX,
            iat: None,
            iss: None,
            preferred_username: None,
            email: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(split_full_name("Jane Doe"), ("Jane".into(), "Doe".into()));
        assert_eq!(split_full_name("Jane van  Doe"), ("Jane".into(), "van  Doe".into()));
        assert_eq!(split_full_name("  Jane\tDoe "), ("Jane".into(), "Doe".into()));
        assert_eq!(split_full_name("Cher"), ("Cher".into(), String::new()));
        assert_eq!(split_full_name(""), (String::new(), String::new()));
    }

    #[tokio::test]
    async fn test_assemble_jane_doe() {
        let storage = Arc::new(InMemoryAccountStorage::new());
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            ..Default::default()
        };
        let identity = Identity::new(Uuid::new_v4(), "jdoe", user.id);
        storage.save_account(&identity, &user).await.unwrap();

        let assembler = UserInfoAssembler::new(storage);
        let info = assembler
            .assemble(&claims_for(&identity.id.to_string()))
            .await
            .unwrap();

        assert_eq!(
            info,
            UserInfo {
                sub: identity.id.to_string(),
                given_name: "Jane".into(),
                family_name: "Doe".into(),
                preferred_username: "jdoe".into(),
                email: "jane@example.com".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_assemble_unknown_identity_without_provisioning() {
        let assembler = UserInfoAssembler::new(Arc::new(InMemoryAccountStorage::new()))
            .with_auto_provision(false);

        let err = assembler
            .assemble(&claims_for(&Uuid::new_v4().to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Account);
    }

    #[tokio::test]
    async fn test_assemble_rejects_non_uuid_subject() {
        let storage = Arc::new(InMemoryAccountStorage::new());
        let assembler = UserInfoAssembler::new(storage.clone());

        let err = assembler.assemble(&claims_for("service-account")).await.unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Account);
        assert_eq!(storage.identity_count().await, 0);
    }

    #[tokio::test]
    async fn test_assemble_provisions_first_seen_subject() {
        let storage = Arc::new(InMemoryAccountStorage::new());
        let assembler = UserInfoAssembler::new(storage.clone());

        let sub = Uuid::new_v4();
        let mut claims = claims_for(&sub.to_string());
        claims.preferred_username = Some("jdoe".into());
        claims.email = Some("jane@example.com".into());
        claims.extra.insert("name".into(), "Jane van Doe".into());

        let info = assembler.assemble(&claims).await.unwrap();
        assert_eq!(
            info,
            UserInfo {
                sub: sub.to_string(),
                given_name: "Jane".into(),
                family_name: "van Doe".into(),
                preferred_username: "jdoe".into(),
                email: "jane@example.com".into(),
            }
        );

        let (identity, user) = storage.find_account(sub).await.unwrap().unwrap();
        assert_eq!(identity.username, "jdoe");
        assert_eq!(identity.user_id, user.id);
        assert_eq!(user.full_name, "Jane van Doe");

        // Later calls read the stored account, not the new claims
        claims.email = Some("other@example.com".into());
        let again = assembler.assemble(&claims).await.unwrap();
        assert_eq!(again.email, "jane@example.com");
        assert_eq!(storage.identity_count().await, 1);
    }

    #[tokio::test]
    async fn test_provisioned_name_from_given_and_family() {
        let assembler = UserInfoAssembler::new(Arc::new(InMemoryAccountStorage::new()));

        let sub = Uuid::new_v4();
        let mut claims = claims_for(&sub.to_string());
        claims.extra.insert("given_name".into(), "Jane".into());
        claims.extra.insert("family_name".into(), "Doe".into());

        let info = assembler.assemble(&claims).await.unwrap();
        assert_eq!(info.given_name, "Jane");
        assert_eq!(info.family_name, "Doe");
        assert_eq!(info.preferred_username, sub.to_string());
        assert_eq!(info.email, "");
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_provision_once() {
        let storage = Arc::new(InMemoryAccountStorage::new());
        let assembler = UserInfoAssembler::new(storage.clone());
        let sub = Uuid::new_v4();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let assembler = assembler.clone();
                let claims = claims_for(&sub.to_string());
                tokio::spawn(async move { assembler.assemble(&claims).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(storage.find_account(sub).await.unwrap().is_some());
        assert_eq!(storage.identity_count().await, 1);
        assert_eq!(storage.user_count().await, 1);
    }
}
