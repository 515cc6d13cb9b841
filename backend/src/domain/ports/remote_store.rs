//! Driven port for the remote realtime store.
//!
//! The store holds flat key-addressed JSON records and offers point reads,
//! push-based live queries, single-key writes, append-with-generated-key and
//! atomic multi-key writes. Adapters own transport, retry and reconnection;
//! the core only consumes the notifications they deliver.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::define_port_error;

define_port_error! {
    /// Errors raised by remote store adapters.
    pub enum RemoteStoreError {
        /// The store could not be reached.
        Connection { message: String } => ServiceUnavailable: "remote store connection failed: {message}",
        /// A write was refused or lost.
        Write { message: String } => ServiceUnavailable: "remote store write failed: {message}",
        /// A live query failed or was cancelled by the store.
        Subscription { message: String } => ServiceUnavailable: "remote store subscription failed: {message}",
        /// An atomic update's precondition did not hold.
        PreconditionFailed { path: String } => Conflict: "precondition failed at {path}",
        /// A key path contained an empty or forbidden segment.
        InvalidPath { path: String } => InternalError: "invalid store path '{path}'",
        /// An atomic update was empty or touched overlapping paths.
        InvalidUpdate { message: String } => InternalError: "invalid atomic update: {message}",
    }
}

/// Characters the store refuses inside a key segment.
const FORBIDDEN_SEGMENT_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// Slash-separated key path into the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath(Vec<String>);

impl StorePath {
    /// Parse a `/`-separated path such as `issues/-Nabc/status`.
    pub fn parse(raw: &str) -> Result<Self, RemoteStoreError> {
        let segments = raw
            .split('/')
            .map(|segment| validate_segment(raw, segment))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }

    /// Extend the path by one segment.
    pub fn child(&self, segment: impl AsRef<str>) -> Result<Self, RemoteStoreError> {
        let segment = segment.as_ref();
        let mut segments = self.0.clone();
        segments.push(validate_segment(segment, segment)?);
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Final segment of the path.
    pub fn key(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// Whether `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Whether writing both paths in one update would be ambiguous.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

fn validate_segment(raw: &str, segment: &str) -> Result<String, RemoteStoreError> {
    if segment.is_empty() || segment.contains(FORBIDDEN_SEGMENT_CHARS) || segment.contains('/') {
        return Err(RemoteStoreError::invalid_path(raw));
    }
    Ok(segment.to_owned())
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A live query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreQuery {
    /// Every child of the collection.
    Children { collection: StorePath },
    /// Children whose `child` field equals `value`.
    ChildEquals {
        collection: StorePath,
        child: String,
        value: Value,
    },
}

impl StoreQuery {
    pub fn collection(&self) -> &StorePath {
        match self {
            Self::Children { collection } | Self::ChildEquals { collection, .. } => collection,
        }
    }

    /// Whether a child record belongs to the query's result.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Self::Children { .. } => true,
            Self::ChildEquals { child, value, .. } => record.get(child) == Some(value),
        }
    }
}

/// A push delivered on a live query.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreNotification {
    /// The complete current result, keyed by child key. Always delivered
    /// first; may be redelivered after the store reconnects.
    Snapshot(BTreeMap<String, Value>),
    /// A child entered the result or changed.
    ChildChanged { key: String, value: Value },
    /// A child left the result.
    ChildRemoved { key: String },
    /// The query failed. Later notifications may still arrive once the store
    /// recovers.
    Error(RemoteStoreError),
}

/// Receiving end of a live query. Dropping or closing it releases the query.
#[derive(Debug)]
pub struct StoreSubscription {
    query: StoreQuery,
    notifications: mpsc::UnboundedReceiver<StoreNotification>,
}

impl StoreSubscription {
    pub fn new(query: StoreQuery, notifications: mpsc::UnboundedReceiver<StoreNotification>) -> Self {
        Self {
            query,
            notifications,
        }
    }

    pub fn query(&self) -> &StoreQuery {
        &self.query
    }

    /// Wait for the next notification. Returns `None` once the store has
    /// dropped the query or it was closed locally.
    ///
    /// Cancel-safe: no notification is lost if the future is dropped.
    pub async fn next(&mut self) -> Option<StoreNotification> {
        self.notifications.recv().await
    }

    /// Stop accepting notifications. The store observes the closed channel
    /// on its next delivery and forgets the query.
    pub fn close(&mut self) {
        self.notifications.close();
    }
}

/// Several writes applied as one indivisible unit, optionally guarded by
/// compare-and-set expectations on leaf values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicUpdate {
    writes: Vec<(StorePath, Value)>,
    expectations: Vec<(StorePath, Value)>,
}

impl AtomicUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at `path`. `Value::Null` deletes the key.
    #[must_use]
    pub fn set(mut self, path: StorePath, value: Value) -> Self {
        self.writes.push((path, value));
        self
    }

    /// Require `path` to currently hold `value` for the update to apply.
    #[must_use]
    pub fn expect(mut self, path: StorePath, value: Value) -> Self {
        self.expectations.push((path, value));
        self
    }

    pub fn writes(&self) -> &[(StorePath, Value)] {
        &self.writes
    }

    pub fn expectations(&self) -> &[(StorePath, Value)] {
        &self.expectations
    }

    /// Reject empty updates and updates whose write paths overlap.
    pub fn validate(&self) -> Result<(), RemoteStoreError> {
        if self.writes.is_empty() {
            return Err(RemoteStoreError::invalid_update("no writes"));
        }
        for (index, (path, _)) in self.writes.iter().enumerate() {
            if let Some((other, _)) = self.writes[index + 1..]
                .iter()
                .find(|(other, _)| path.overlaps(other))
            {
                return Err(RemoteStoreError::invalid_update(format!(
                    "'{path}' overlaps '{other}'"
                )));
            }
        }
        Ok(())
    }
}

/// Placeholder the store replaces with its own clock, in epoch milliseconds.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

/// Whether `value` is the [`server_timestamp`] placeholder.
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp"))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the value at `path`, or `None` when absent.
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, RemoteStoreError>;

    /// Open a live query. The first notification is always a snapshot.
    async fn subscribe(&self, query: StoreQuery) -> Result<StoreSubscription, RemoteStoreError>;

    /// Apply an atomic multi-key update.
    async fn update(&self, update: AtomicUpdate) -> Result<(), RemoteStoreError>;

    /// Overwrite the value at `path`.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), RemoteStoreError>;

    /// Append `value` under `collection` with a store-generated key.
    async fn push(&self, collection: &StorePath, value: Value) -> Result<String, RemoteStoreError>;
}
