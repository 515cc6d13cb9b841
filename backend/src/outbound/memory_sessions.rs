//! In-process session directory.
//!
//! Each signed-in session owns one `watch` channel. Every dashboard attached
//! to the session observes the same channel, so signing out through the REST
//! endpoint or from any dashboard redirects all of them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ports::{IdentityProvider, SessionDirectory};
use crate::domain::{Error, Identity};

type Channel = Arc<watch::Sender<Option<Identity>>>;

/// Session directory held in memory. Cloning shares the registry.
// TODO: evict sessions once their cookie TTL has passed; abandoned sessions
// are only removed by an explicit sign-out today.
#[derive(Clone, Default)]
pub struct InMemorySessions {
    sessions: Arc<Mutex<HashMap<String, Channel>>>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Channel>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of sessions still signed in.
    pub fn active(&self) -> usize {
        self.lock().len()
    }
}

impl SessionDirectory for InMemorySessions {
    fn open(&self, identity: Identity) -> String {
        let token = Uuid::new_v4().simple().to_string();
        debug!(user_id = %identity.user_id(), "session opened");
        let (sender, _) = watch::channel(Some(identity));
        self.lock().insert(token.clone(), Arc::new(sender));
        token
    }

    fn attach(&self, token: &str) -> Option<Arc<dyn IdentityProvider>> {
        let channel = self.lock().get(token).cloned()?;
        Some(Arc::new(SessionIdentity {
            token: token.to_owned(),
            channel,
            directory: self.clone(),
        }))
    }

    fn close(&self, token: &str) {
        if let Some(channel) = self.lock().remove(token) {
            info!("session closed");
            channel.send_replace(None);
        }
    }
}

/// Identity provider for one session in an [`InMemorySessions`] registry.
struct SessionIdentity {
    token: String,
    channel: Channel,
    directory: InMemorySessions,
}

#[async_trait]
impl IdentityProvider for SessionIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.channel.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.channel.subscribe()
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.directory.close(&self.token);
        self.channel.send_replace(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_fixtures::{PATIENT, identity};
    use rstest::rstest;

    #[rstest]
    fn attaching_returns_the_signed_in_identity() {
        let sessions = InMemorySessions::new();
        let token = sessions.open(identity(PATIENT));

        let provider = sessions.attach(&token).expect("live session");

        assert_eq!(provider.current_identity(), Some(identity(PATIENT)));
        assert!(sessions.attach("unknown").is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn sign_out_reaches_every_attached_provider_and_sticks() {
        let sessions = InMemorySessions::new();
        let token = sessions.open(identity(PATIENT));
        let first = sessions.attach(&token).expect("live session");
        let second = sessions.attach(&token).expect("live session");
        let mut watcher = second.watch();
        watcher.borrow_and_update();

        first.sign_out().await.expect("sign out");

        watcher.changed().await.expect("channel alive");
        assert!(watcher.borrow().is_none());
        assert!(sessions.attach(&token).is_none());
        assert_eq!(sessions.active(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn closing_leaves_other_sessions_signed_in() {
        let sessions = InMemorySessions::new();
        let ended = sessions.open(identity(PATIENT));
        let kept = sessions.open(identity(PATIENT));

        sessions.close(&ended);

        assert!(sessions.attach(&ended).is_none());
        let provider = sessions.attach(&kept).expect("still signed in");
        assert_eq!(provider.current_identity(), Some(identity(PATIENT)));
    }
}
