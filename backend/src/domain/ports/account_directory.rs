//! Port for the credential store owned by the authentication collaborator.

use async_trait::async_trait;

use crate::domain::{Email, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by account directory adapters.
    pub enum AccountDirectoryError {
        /// An account already exists for the email.
        DuplicateEmail { email: String } => Conflict: "an account already exists for {email}",
        /// The email is unknown or the password is wrong.
        InvalidCredentials => Unauthorized: "Invalid email or password",
        /// The referenced account does not exist.
        UnknownAccount { id: String } => NotFound: "no account with id {id}",
        /// The directory could not be reached.
        Unavailable { message: String } => ServiceUnavailable: "account directory unavailable: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Register a credential and return the new account's id.
    async fn create_account(&self, email: &Email, password: &str) -> Result<UserId, AccountDirectoryError>;

    /// Check a credential and return the matching account id.
    async fn verify(&self, email: &Email, password: &str) -> Result<UserId, AccountDirectoryError>;

    /// Remove an account. Used to roll back a sign-up whose profile write
    /// failed.
    async fn delete_account(&self, id: &UserId) -> Result<(), AccountDirectoryError>;
}
