//! Startup creation of the configured staff account.

use tracing::info;

use super::password::{HashError, PasswordError, hash_password, validate_password};
use crate::config::AdminAccount;
use crate::domain::{InvalidFields, Profile};
use crate::store::{Store, StoreError, constraint};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("invalid admin account: {0}")]
    Invalid(#[from] InvalidFields),

    #[error("invalid admin password: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "))]
    Password(Vec<PasswordError>),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Create the staff account unless its email is already registered.
///
/// Returns whether a new account was created. An existing account is left
/// untouched, password included.
pub async fn ensure_admin<S: Store + ?Sized>(
    store: &S,
    account: &AdminAccount,
) -> Result<bool, AdminError> {
    let profile = Profile::new(&account.email, "Admin", "Admin")?;
    if store.find_credentials(&profile.email).await?.is_some() {
        return Ok(false);
    }
    validate_password(&account.password).map_err(AdminError::Password)?;

    let email = profile.email.clone();
    let password_hash = hash_password(&account.password).await?;
    match store.insert_user(profile, password_hash, true).await {
        Ok(user) => {
            info!(user = %user.id, email = %email, "created admin account");
            Ok(true)
        }
        // Another instance created it first
        Err(e) if e.is_unique_violation(constraint::USER_EMAIL) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::store::MemoryStore;

    fn account(password: &str) -> AdminAccount {
        AdminAccount {
            email: "Admin@Station.com".into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn creates_staff_once() {
        let store = MemoryStore::new();
        assert!(ensure_admin(&store, &account("admin-pass")).await.unwrap());
        assert!(!ensure_admin(&store, &account("other-pass")).await.unwrap());

        let email = Profile::new("admin@station.com", "A", "A").unwrap().email;
        let creds = store.find_credentials(&email).await.unwrap().unwrap();
        assert!(creds.user.is_staff);
        assert!(verify_password("admin-pass", &creds.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_weak_password() {
        let store = MemoryStore::new();
        let err = ensure_admin(&store, &account("1234")).await.unwrap_err();
        assert!(matches!(err, AdminError::Password(ref e) if e.len() == 2), "{err:?}");
    }

    #[tokio::test]
    async fn rejects_bad_email() {
        let store = MemoryStore::new();
        let bad = AdminAccount {
            email: "admin".into(),
            password: "admin-pass".into(),
        };
        assert!(matches!(
            ensure_admin(&store, &bad).await,
            Err(AdminError::Invalid(_))
        ));
    }
}
