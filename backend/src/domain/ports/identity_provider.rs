//! Port for the authentication collaborator that reports the signed-in
//! identity.
//!
//! Dashboards observe identity changes through a `watch` channel: the current
//! value is available immediately on mount, and every sign-in or sign-out
//! marks the channel as changed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{Error, Identity};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity at the time of the call, if any.
    fn current_identity(&self) -> Option<Identity>;

    /// Receiver that observes the current identity and every later change.
    fn watch(&self) -> watch::Receiver<Option<Identity>>;

    /// End the signed-in session. Observers see the identity become `None`.
    async fn sign_out(&self) -> Result<(), Error>;
}

/// Server-side registry of signed-in sessions.
///
/// The session cookie only carries an opaque token; whether that token is
/// still signed in is decided here, so a sign-out from any surface ends the
/// session everywhere.
#[cfg_attr(test, mockall::automock)]
pub trait SessionDirectory: Send + Sync {
    /// Register a signed-in identity and return the token for the cookie.
    fn open(&self, identity: Identity) -> String;

    /// Identity provider for a live session, or `None` once the token has
    /// been signed out or was never issued.
    fn attach(&self, token: &str) -> Option<Arc<dyn IdentityProvider>>;

    /// End the session. Every attached provider observes `None`.
    fn close(&self, token: &str);
}

/// Identity provider backed by a `watch` channel.
///
/// Inbound adapters seed it with the identity restored from the session and
/// hand it to one dashboard; tests drive sign-in and sign-out through
/// [`WatchedIdentity::set`].
#[derive(Debug)]
pub struct WatchedIdentity {
    sender: watch::Sender<Option<Identity>>,
}

impl WatchedIdentity {
    pub fn new(initial: Option<Identity>) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Replace the identity, notifying observers even if it is unchanged.
    pub fn set(&self, identity: Option<Identity>) {
        self.sender.send_replace(identity);
    }
}

#[async_trait]
impl IdentityProvider for WatchedIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.sender.subscribe()
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.set(None);
        Ok(())
    }
}
