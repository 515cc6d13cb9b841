//! Shared HTTP adapter state.
//!
//! Handlers accept this state via `actix_web::web::Data` so they only depend
//! on domain services built over ports, and remain testable without I/O.

use std::sync::Arc;

use crate::domain::ports::{AccountDirectory, RemoteStore, SessionDirectory};
use crate::domain::{AccountService, ContactService, Error, Identity};
use crate::inbound::http::session::SessionContext;

/// Account service over trait-object ports.
pub type DynAccountService = AccountService<dyn AccountDirectory, dyn RemoteStore>;
/// Contact service over a trait-object store.
pub type DynContactService = ContactService<dyn RemoteStore>;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub accounts: Arc<DynAccountService>,
    pub contact: Arc<DynContactService>,
    pub sessions: Arc<dyn SessionDirectory>,
}

impl HttpState {
    /// Build the services from the credential directory, the session
    /// directory and the remote store.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    ///
    /// use carelink::inbound::http::state::HttpState;
    /// use carelink::outbound::{InMemoryAccountDirectory, InMemorySessions, InMemoryStore};
    /// use mockable::DefaultClock;
    ///
    /// let store = Arc::new(InMemoryStore::new(Arc::new(DefaultClock)));
    /// let state = HttpState::new(
    ///     Arc::new(InMemoryAccountDirectory::new()),
    ///     Arc::new(InMemorySessions::new()),
    ///     store,
    /// );
    /// let _accounts = state.accounts.clone();
    /// ```
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        sessions: Arc<dyn SessionDirectory>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(directory, store.clone())),
            contact: Arc::new(ContactService::new(store)),
            sessions,
        }
    }

    /// Identity of the cookie's session while it is still signed in.
    pub fn signed_in(&self, session: &SessionContext) -> Result<Option<Identity>, Error> {
        Ok(session
            .session_token()?
            .and_then(|token| self.sessions.attach(&token))
            .and_then(|provider| provider.current_identity()))
    }
}
