//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **memory_store**: in-process realtime store (JSON tree, live queries,
//!   atomic multi-key updates).
//! - **memory_accounts**: in-process credential directory.
//! - **memory_sessions**: in-process registry of signed-in sessions.
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

mod memory_accounts;
mod memory_sessions;
mod memory_store;

pub use memory_accounts::InMemoryAccountDirectory;
pub use memory_sessions::InMemorySessions;
pub use memory_store::InMemoryStore;
