//! Test helpers for inbound HTTP components.

use std::sync::Arc;

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::Key;
use mockable::DefaultClock;

use crate::inbound::http::state::HttpState;
use crate::outbound::{InMemoryAccountDirectory, InMemorySessions, InMemoryStore};

/// Cookie session middleware with a fresh key and the `Secure` flag off so
/// plain-HTTP test requests keep their cookie.
pub fn test_session_middleware() -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
        .cookie_name("session".to_owned())
        .cookie_secure(false)
        .build()
}

/// Handler state over fresh in-memory adapters; the store is returned so
/// tests can inspect what was written.
pub fn in_memory_state() -> (HttpState, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new(Arc::new(DefaultClock)));
    let state = HttpState::new(
        Arc::new(InMemoryAccountDirectory::new()),
        Arc::new(InMemorySessions::new()),
        store.clone(),
    );
    (state, store)
}
