//! In-process credential store.
//!
//! Passwords are kept as salted SHA-256 digests; plaintext copies made while
//! hashing are zeroised.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::ports::{AccountDirectory, AccountDirectoryError};
use crate::domain::{Email, UserId};

struct Credential {
    id: UserId,
    salt: String,
    digest: String,
}

fn digest(salt: &str, password: &str) -> String {
    let mut material = Zeroizing::new(String::with_capacity(salt.len() + password.len()));
    material.push_str(salt);
    material.push_str(password);
    hex::encode(Sha256::digest(material.as_bytes()))
}

impl Credential {
    fn new(id: UserId, password: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = digest(&salt, password);
        Self { id, salt, digest }
    }

    fn matches(&self, password: &str) -> bool {
        digest(&self.salt, password) == self.digest
    }
}

/// [`AccountDirectory`] keeping credentials in memory, keyed by email.
#[derive(Default)]
pub struct InMemoryAccountDirectory {
    accounts: Mutex<HashMap<Email, Credential>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts(&self) -> MutexGuard<'_, HashMap<Email, Credential>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn create_account(&self, email: &Email, password: &str) -> Result<UserId, AccountDirectoryError> {
        let mut accounts = self.accounts();
        if accounts.contains_key(email) {
            return Err(AccountDirectoryError::duplicate_email(email.to_string()));
        }
        let id = UserId::random();
        accounts.insert(email.clone(), Credential::new(id.clone(), password));
        info!(user_id = %id, "credential registered");
        Ok(id)
    }

    async fn verify(&self, email: &Email, password: &str) -> Result<UserId, AccountDirectoryError> {
        let accounts = self.accounts();
        match accounts.get(email) {
            Some(credential) if credential.matches(password) => Ok(credential.id.clone()),
            _ => {
                debug!("credential check failed");
                Err(AccountDirectoryError::invalid_credentials())
            }
        }
    }

    async fn delete_account(&self, id: &UserId) -> Result<(), AccountDirectoryError> {
        let mut accounts = self.accounts();
        let before = accounts.len();
        accounts.retain(|_, credential| &credential.id != id);
        if accounts.len() == before {
            return Err(AccountDirectoryError::unknown_account(id.to_string()));
        }
        info!(user_id = %id, "credential removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn email(raw: &str) -> Email {
        Email::new(raw).expect("valid email")
    }

    #[rstest]
    #[tokio::test]
    async fn registered_credentials_verify() {
        let directory = InMemoryAccountDirectory::new();
        let id = directory
            .create_account(&email("ada@example.org"), "s3cret")
            .await
            .expect("created");

        let verified = directory
            .verify(&email("ADA@example.org"), "s3cret")
            .await
            .expect("verified");
        assert_eq!(verified, id);
    }

    #[rstest]
    #[case("ada@example.org", "wrong")]
    #[case("bob@example.org", "s3cret")]
    #[tokio::test]
    async fn unknown_email_or_wrong_password_is_rejected(#[case] who: &str, #[case] password: &str) {
        let directory = InMemoryAccountDirectory::new();
        directory
            .create_account(&email("ada@example.org"), "s3cret")
            .await
            .expect("created");

        let err = directory
            .verify(&email(who), password)
            .await
            .expect_err("rejected");
        assert_eq!(err, AccountDirectoryError::InvalidCredentials);
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_email_is_refused() {
        let directory = InMemoryAccountDirectory::new();
        directory
            .create_account(&email("ada@example.org"), "one")
            .await
            .expect("created");
        let err = directory
            .create_account(&email("ada@example.org"), "two")
            .await
            .expect_err("duplicate");
        assert!(matches!(err, AccountDirectoryError::DuplicateEmail { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn deleted_accounts_free_the_email() {
        let directory = InMemoryAccountDirectory::new();
        let id = directory
            .create_account(&email("ada@example.org"), "one")
            .await
            .expect("created");

        directory.delete_account(&id).await.expect("deleted");
        assert!(directory.delete_account(&id).await.is_err());
        directory
            .create_account(&email("ada@example.org"), "two")
            .await
            .expect("email reusable");
    }

    #[rstest]
    fn digests_are_salted() {
        let first = Credential::new(UserId::random(), "same");
        let second = Credential::new(UserId::random(), "same");
        assert_ne!(first.digest, second.digest);
        assert!(first.matches("same"));
    }
}
