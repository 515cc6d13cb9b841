//! Sign-up and role-checked login.
//!
//! Credentials live in the [`AccountDirectory`]; the profile with the role
//! lives in the remote store at `users/{uid}`. A login succeeds only when the
//! stored role equals the role chosen on the form.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::issue_repository::{decode_user, user_path};
use crate::domain::ports::{AccountDirectory, RemoteStore};
use crate::domain::{
    Error, ErrorCode, LoginCredentials, Route, SignUpRequest, User, route_for,
};

/// Message returned when the stored role differs from the selected one.
pub const INCORRECT_ROLE_MESSAGE: &str = "Incorrect role selected";

/// A signed-in user and the dashboard they should land on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub user: User,
    pub route: Route,
}

impl SignedIn {
    fn new(user: User) -> Self {
        let route = route_for(user.role());
        Self { user, route }
    }
}

/// Account operations over a credential directory and the profile store.
pub struct AccountService<D: ?Sized, S: ?Sized> {
    directory: Arc<D>,
    store: Arc<S>,
}

impl<D: ?Sized, S: ?Sized> AccountService<D, S> {
    pub fn new(directory: Arc<D>, store: Arc<S>) -> Self {
        Self { directory, store }
    }
}

impl<D, S> AccountService<D, S>
where
    D: AccountDirectory + ?Sized,
    S: RemoteStore + ?Sized,
{
    /// Register a credential and write the user profile.
    ///
    /// When the profile write fails the credential is deleted again so the
    /// email can be reused.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<SignedIn, Error> {
        let id = self
            .directory
            .create_account(request.email(), request.password())
            .await?;
        let user = User::new(
            id.clone(),
            request.name().clone(),
            request.email().clone(),
            request.role(),
        );
        let record = serde_json::to_value(user.to_record())
            .map_err(|err| Error::internal(format!("could not encode user record: {err}")))?;

        let written = match user_path(&id) {
            Ok(path) => self.store.set(&path, record).await.map_err(Error::from),
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            warn!(user_id = %id, error = %err, "profile write failed; removing credential");
            if let Err(rollback) = self.directory.delete_account(&id).await {
                error!(user_id = %id, error = %rollback, "credential rollback failed");
            }
            return Err(err);
        }

        info!(user_id = %id, role = %user.role(), "account created");
        Ok(SignedIn::new(user))
    }

    /// Verify credentials, then check the stored role against the selected
    /// one.
    pub async fn log_in(&self, credentials: LoginCredentials) -> Result<SignedIn, Error> {
        let id = self
            .directory
            .verify(credentials.email(), credentials.password())
            .await?;
        let stored = self.store.read(&user_path(&id)?).await?;

        let user = match stored.map(|value| decode_user(&id, value)) {
            Some(Ok(user)) if user.role() == credentials.role() => user,
            None | Some(Ok(_)) => return Err(incorrect_role(&credentials)),
            Some(Err(err)) if err.code() == ErrorCode::Forbidden => {
                return Err(incorrect_role(&credentials));
            }
            Some(Err(err)) => return Err(err),
        };

        info!(user_id = %id, role = %user.role(), "login succeeded");
        Ok(SignedIn::new(user))
    }
}

fn incorrect_role(credentials: &LoginCredentials) -> Error {
    warn!(role = %credentials.role(), "login refused: role mismatch");
    Error::forbidden(INCORRECT_ROLE_MESSAGE)
}
