//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod account_directory;
mod identity_provider;
mod issue_repository;
mod remote_store;

#[cfg(test)]
pub use account_directory::MockAccountDirectory;
pub use account_directory::{AccountDirectory, AccountDirectoryError};
#[cfg(test)]
pub use identity_provider::{MockIdentityProvider, MockSessionDirectory};
pub use identity_provider::{IdentityProvider, SessionDirectory, WatchedIdentity};
#[cfg(test)]
pub use issue_repository::MockIssueRepository;
pub(crate) use issue_repository::decode_issue;
pub use issue_repository::{
    IssueFeedEvent, IssueRepository, IssueSubscription, SubmitResponseRequest,
};
#[cfg(test)]
pub use remote_store::MockRemoteStore;
pub use remote_store::{
    AtomicUpdate, RemoteStore, RemoteStoreError, StoreNotification, StorePath, StoreQuery,
    StoreSubscription, is_server_timestamp, server_timestamp,
};
