//! 凭据存储：注册、按邮箱查找与密码登录。

use std::sync::Arc;
use tracing::{info, warn};

use crate::password::{HashError, PasswordHasher};
use crate::store::{PersistenceError, User, UserId, UserRepository};
use crate::validation::{FieldError, normalize_identifier, validate_login, validate_registration};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid data")]
    Validation(Vec<FieldError>),
    #[error("{0} already registered")]
    DuplicateKey(&'static str),
    #[error("user not found")]
    NotFound,
    #[error("email or password is incorrect")]
    InvalidCredentials,
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Persistence(PersistenceError),
}

impl From<PersistenceError> for CredentialError {
    fn from(error: PersistenceError) -> Self {
        match error {
            PersistenceError::DuplicateKey(field) => CredentialError::DuplicateKey(field),
            other => CredentialError::Persistence(other),
        }
    }
}

pub struct CredentialStore {
    users: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
}

impl CredentialStore {
    pub fn new(users: Arc<dyn UserRepository>, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    /// 校验并创建用户；原始密码只以哈希形式落库。
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        raw_password: &str,
    ) -> Result<User, CredentialError> {
        let registration = validate_registration(username, email, raw_password)
            .map_err(CredentialError::Validation)?;
        let password_hash = self.hash_blocking(registration.password).await?;
        let user = User {
            id: UserId::new(),
            username: registration.username,
            email: registration.email,
            password_hash,
        };
        if let Err(err) = self.users.insert(&user).await {
            if let PersistenceError::DuplicateKey(field) = &err {
                warn!(field = *field, "registration rejected: duplicate key");
            }
            return Err(err.into());
        }
        info!(user_id = %user.id, username = user.username, "user registered");
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User, CredentialError> {
        self.users
            .find_by_email(&normalize_identifier(email))
            .await?
            .ok_or(CredentialError::NotFound)
    }

    /// 登录校验：未知邮箱与错误密码返回同一错误。
    pub async fn authenticate(&self, email: &str, raw_password: &str) -> Result<User, CredentialError> {
        let login = validate_login(email, raw_password).map_err(CredentialError::Validation)?;
        let user = match self.users.find_by_email(&login.email).await? {
            Some(user) => user,
            None => {
                warn!("login failed: unknown email");
                return Err(CredentialError::InvalidCredentials);
            }
        };
        if !self.verify_blocking(login.password, user.password_hash.clone()).await {
            warn!(user_id = %user.id, "login failed: password mismatch");
            return Err(CredentialError::InvalidCredentials);
        }
        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }

    async fn hash_blocking(&self, password: String) -> Result<String, HashError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| HashError::Hash(err.to_string()))?
    }

    async fn verify_blocking(&self, password: String, hash: String) -> bool {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) fn test_credentials() -> (Arc<crate::store::JsonStore>, CredentialStore) {
    let store = Arc::new(crate::store::JsonStore::in_memory());
    let credentials = CredentialStore::new(store.clone(), crate::password::test_hasher());
    (store, credentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_find_by_email() {
        let (_store, credentials) = test_credentials();
        let user = credentials
            .register("Alice123", "Alice@Example.com", "secretpw")
            .await
            .expect("register");

        let found = credentials
            .find_by_email("alice@example.com")
            .await
            .expect("find");
        assert_eq!(found, user);
        assert_eq!(found.username, "alice123");
        assert_ne!(found.password_hash, "secretpw");
        assert!(!found.password_hash.contains("secretpw"));
    }

    #[tokio::test]
    async fn same_password_hashes_differently_per_user() {
        let (_store, credentials) = test_credentials();
        let alice = credentials
            .register("alice123", "alice@example.com", "secretpw")
            .await
            .expect("register alice");
        let bob = credentials
            .register("bobby123", "bobby@example.com", "secretpw")
            .await
            .expect("register bob");

        assert_ne!(alice.password_hash, bob.password_hash);
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_rejected_case_insensitively() {
        let (store, credentials) = test_credentials();
        credentials
            .register("alice123", "alice@example.com", "secretpw")
            .await
            .expect("register");

        let same_name = credentials
            .register("ALICE123", "other@example.com", "secretpw")
            .await;
        let same_email = credentials
            .register("someone1", "ALICE@example.com", "secretpw")
            .await;

        assert!(matches!(same_name, Err(CredentialError::DuplicateKey("username"))));
        assert!(matches!(same_email, Err(CredentialError::DuplicateKey("email"))));
        assert!(store.find_by_email("other@example.com").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn invalid_registration_creates_nothing() {
        let (store, credentials) = test_credentials();
        let result = credentials
            .register("alice123", "alice@example.com", "1234567")
            .await;

        assert!(matches!(result, Err(CredentialError::Validation(_))));
        assert!(store.find_by_email("alice@example.com").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn find_by_unknown_email_is_not_found() {
        let (_store, credentials) = test_credentials();
        let result = credentials.find_by_email("nobody@example.com").await;
        assert!(matches!(result, Err(CredentialError::NotFound)));
    }

    #[tokio::test]
    async fn authenticate_checks_password() {
        let (_store, credentials) = test_credentials();
        let user = credentials
            .register("alice123", "alice@example.com", "secretpw")
            .await
            .expect("register");

        let ok = credentials
            .authenticate(" Alice@example.com ", "secretpw")
            .await
            .expect("login");
        assert_eq!(ok.id, user.id);

        let wrong = credentials.authenticate("alice@example.com", "secretpx").await;
        let unknown = credentials.authenticate("bobby@example.com", "secretpw").await;
        let invalid = credentials.authenticate("not-an-email", "secretpw").await;
        assert!(matches!(wrong, Err(CredentialError::InvalidCredentials)));
        assert!(matches!(unknown, Err(CredentialError::InvalidCredentials)));
        assert!(matches!(invalid, Err(CredentialError::Validation(_))));
    }
}
