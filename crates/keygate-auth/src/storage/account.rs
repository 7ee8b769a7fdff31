//! Account storage trait and in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{Identity, User};

/// Storage trait for local identities and users.
///
/// # Example Implementation
///
/// ```ignore
/// use keygate_auth::storage::AccountStorage;
/// use keygate_auth::types::{Identity, User};
/// use keygate_auth::AuthResult;
///
/// struct PgAccountStorage {
///     pool: sqlx::PgPool,
/// }
///
/// #[async_trait::async_trait]
/// impl AccountStorage for PgAccountStorage {
///     async fn find_identity(&self, id: Uuid) -> AuthResult<Option<Identity>> {
///         // SELECT ... FROM identities WHERE id = $1
///     }
///     // ... other methods
/// }
/// ```
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Finds an identity by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_identity(&self, id: Uuid) -> AuthResult<Option<Identity>>;

    /// Finds a user by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_user(&self, id: Uuid) -> AuthResult<Option<User>>;

    /// Stores an identity together with the user it owns.
    ///
    /// Saving an identity id that already exists replaces its username and
    /// profile; it never creates a second identity.
    ///
    /// # Errors
    ///
    /// Returns an error if `identity.user_id` does not match `user.id`, or if
    /// the storage operation fails.
    async fn save_account(&self, identity: &Identity, user: &User) -> AuthResult<()>;

    /// Finds an identity and the user it owns.
    ///
    /// Returns `None` when the identity is unknown.
    ///
    /// # Errors
    ///
    /// Returns an `Account` error if the identity exists but its user does not.
    async fn find_account(&self, identity_id: Uuid) -> AuthResult<Option<(Identity, User)>> {
        let Some(identity) = self.find_identity(identity_id).await? else {
            return Ok(None);
        };
        let user = self.find_user(identity.user_id).await?.ok_or_else(|| {
            crate::AuthError::account(format!(
                "Identity {identity_id} references missing user {}",
                identity.user_id
            ))
        })?;
        Ok(Some((identity, user)))
    }
}

/// Account storage backed by in-process maps.
#[derive(Debug, Default)]
pub struct InMemoryAccountStorage {
    identities: RwLock<HashMap<Uuid, Identity>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryAccountStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored identities.
    pub async fn identity_count(&self) -> usize {
        self.identities.read().await.len()
    }

    /// Returns the number of stored users.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl AccountStorage for InMemoryAccountStorage {
    async fn find_identity(&self, id: Uuid) -> AuthResult<Option<Identity>> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn find_user(&self, id: Uuid) -> AuthResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn save_account(&self, identity: &Identity, user: &User) -> AuthResult<()> {
        if identity.user_id != user.id {
            return Err(crate::AuthError::account(format!(
                "Identity {} does not own user {}",
                identity.id, user.id
            )));
        }

        // Lock order: identities, then users
        let mut identities = self.identities.write().await;
        let mut users = self.users.write().await;
        identities.insert(identity.id, identity.clone());
        users.insert(user.id, user.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> (Identity, User) {
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            ..Default::default()
        };
        (Identity::new(Uuid::new_v4(), "jdoe", user.id), user)
    }

    #[tokio::test]
    async fn test_save_and_find_account() {
        let storage = InMemoryAccountStorage::new();
        let (identity, user) = account();

        storage.save_account(&identity, &user).await.unwrap();

        let (found_identity, found_user) = storage.find_account(identity.id).await.unwrap().unwrap();
        assert_eq!(found_identity, identity);
        assert_eq!(found_user, user);
    }

    #[tokio::test]
    async fn test_unknown_identity() {
        let storage = InMemoryAccountStorage::new();
        assert!(storage.find_account(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resave_replaces_without_duplicating() {
        let storage = InMemoryAccountStorage::new();
        let (mut identity, user) = account();
        storage.save_account(&identity, &user).await.unwrap();

        identity.username = "jane".into();
        storage.save_account(&identity, &user).await.unwrap();

        assert_eq!(storage.identity_count().await, 1);
        let found = storage.find_identity(identity.id).await.unwrap().unwrap();
        assert_eq!(found.username, "jane");
    }

    #[tokio::test]
    async fn test_mismatched_owner_rejected() {
        let storage = InMemoryAccountStorage::new();
        let (identity, mut user) = account();
        user.id = Uuid::new_v4();

        let err = storage.save_account(&identity, &user).await.unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Account);
    }

    #[tokio::test]
    async fn test_dangling_identity_is_account_error() {
        let storage = InMemoryAccountStorage::new();
        let (identity, _) = account();
        storage
            .identities
            .write()
            .await
            .insert(identity.id, identity.clone());

        let err = storage.find_account(identity.id).await.unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Account);
    }
}
