//! In-process [`RemoteStore`] holding a JSON tree.
//!
//! Behaves like the hosted realtime store the backend was designed against:
//! writing `null` deletes, pushed keys are generated, the server timestamp
//! placeholder is resolved with the injected clock, and every live query gets
//! an initial snapshot followed by per-child change notifications.
//! Notifications are produced while the state lock is held, so each
//! subscription observes writes in commit order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mockable::Clock;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{
    AtomicUpdate, RemoteStore, RemoteStoreError, StoreNotification, StorePath, StoreQuery,
    StoreSubscription, is_server_timestamp,
};

struct Listener {
    query: StoreQuery,
    sender: mpsc::UnboundedSender<StoreNotification>,
    delivered: BTreeMap<String, Value>,
}

#[derive(Default)]
struct StoreState {
    root: Map<String, Value>,
    listeners: Vec<Listener>,
    #[cfg(feature = "test-support")]
    write_failure: Option<String>,
}

impl StoreState {
    #[cfg(feature = "test-support")]
    fn check_writable(&self) -> Result<(), RemoteStoreError> {
        match &self.write_failure {
            Some(message) => Err(RemoteStoreError::write(message.clone())),
            None => Ok(()),
        }
    }

    #[cfg(not(feature = "test-support"))]
    fn check_writable(&self) -> Result<(), RemoteStoreError> {
        Ok(())
    }

    /// Push the difference since the last delivery to every listener and
    /// drop listeners whose receiver is gone.
    fn notify(&mut self) {
        let root = &self.root;
        self.listeners.retain_mut(|listener| {
            let current = query_results(root, &listener.query);
            let delivered = changes(&listener.delivered, &current)
                .into_iter()
                .all(|notification| listener.sender.send(notification).is_ok());
            listener.delivered = current;
            if !delivered {
                debug!(collection = %listener.query.collection(), "live query released");
            }
            delivered
        });
    }
}

fn lookup<'a>(root: &'a Map<String, Value>, path: &StorePath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    rest.iter()
        .try_fold(root.get(first)?, |node, segment| node.get(segment.as_str()))
}

fn write(root: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        if value.is_null() {
            root.remove(first);
        } else {
            root.insert(first.clone(), value);
        }
        return;
    }

    let child = root
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    let emptied = match child {
        Value::Object(map) => {
            write(map, rest, value);
            map.is_empty()
        }
        _ => false,
    };
    if emptied {
        root.remove(first);
    }
}

fn resolve_server_values(value: Value, now_millis: i64) -> Value {
    if is_server_timestamp(&value) {
        return Value::from(now_millis);
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, child)| (key, resolve_server_values(child, now_millis)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| resolve_server_values(item, now_millis))
                .collect(),
        ),
        other => other,
    }
}

fn query_results(root: &Map<String, Value>, query: &StoreQuery) -> BTreeMap<String, Value> {
    let Some(Value::Object(children)) = lookup(root, query.collection()) else {
        return BTreeMap::new();
    };
    children
        .iter()
        .filter(|(_, child)| query.matches(child))
        .map(|(key, child)| (key.clone(), child.clone()))
        .collect()
}

fn changes(
    before: &BTreeMap<String, Value>,
    after: &BTreeMap<String, Value>,
) -> Vec<StoreNotification> {
    let removed = before
        .keys()
        .filter(|key| !after.contains_key(*key))
        .map(|key| StoreNotification::ChildRemoved { key: key.clone() });
    let changed = after
        .iter()
        .filter(|(key, value)| before.get(*key) != Some(*value))
        .map(|(key, value)| StoreNotification::ChildChanged {
            key: key.clone(),
            value: value.clone(),
        });
    removed.chain(changed).collect()
}

/// Local [`RemoteStore`] used by the server binary and integration tests.
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(
        &self,
        writes: impl IntoIterator<Item = (StorePath, Value)>,
        state: &mut StoreState,
    ) {
        let now = self.clock.utc().timestamp_millis();
        for (path, value) in writes {
            write(&mut state.root, path.segments(), resolve_server_values(value, now));
        }
        state.notify();
    }

    /// Number of live queries whose receiver is still open.
    pub fn live_subscriptions(&self) -> usize {
        self.lock()
            .listeners
            .iter()
            .filter(|listener| !listener.sender.is_closed())
            .count()
    }
}

#[cfg(feature = "test-support")]
impl InMemoryStore {
    /// Make every subsequent write fail with `message`.
    pub fn fail_writes(&self, message: impl Into<String>) {
        self.lock().write_failure = Some(message.into());
    }

    /// Undo [`fail_writes`](Self::fail_writes).
    pub fn restore_writes(&self) {
        self.lock().write_failure = None;
    }

    /// Deliver a subscription error to every live query, as a dropped
    /// connection would.
    pub fn interrupt_subscriptions(&self, message: &str) {
        self.lock().listeners.retain(|listener| {
            listener
                .sender
                .send(StoreNotification::Error(RemoteStoreError::subscription(message)))
                .is_ok()
        });
    }

    /// Redeliver a full snapshot to every live query, as a reconnect would.
    pub fn reconnect_subscriptions(&self) {
        let mut state = self.lock();
        let StoreState {
            root, listeners, ..
        } = &mut *state;
        listeners.retain_mut(|listener| {
            listener.delivered = query_results(root, &listener.query);
            listener
                .sender
                .send(StoreNotification::Snapshot(listener.delivered.clone()))
                .is_ok()
        });
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, RemoteStoreError> {
        Ok(lookup(&self.lock().root, path).cloned())
    }

    async fn subscribe(&self, query: StoreQuery) -> Result<StoreSubscription, RemoteStoreError> {
        let mut state = self.lock();
        let snapshot = query_results(&state.root, &query);
        let (sender, receiver) = mpsc::unbounded_channel();
        sender
            .send(StoreNotification::Snapshot(snapshot.clone()))
            .map_err(|_| RemoteStoreError::subscription("receiver dropped before snapshot"))?;
        debug!(collection = %query.collection(), children = snapshot.len(), "live query opened");
        state.listeners.push(Listener {
            query: query.clone(),
            sender,
            delivered: snapshot,
        });
        Ok(StoreSubscription::new(query, receiver))
    }

    async fn update(&self, update: AtomicUpdate) -> Result<(), RemoteStoreError> {
        update.validate()?;
        let mut state = self.lock();
        state.check_writable()?;
        for (path, expected) in update.expectations() {
            let actual = lookup(&state.root, path).unwrap_or(&Value::Null);
            if actual != expected {
                return Err(RemoteStoreError::precondition_failed(path.to_string()));
            }
        }
        self.apply(update.writes().iter().cloned(), &mut state);
        Ok(())
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), RemoteStoreError> {
        let mut state = self.lock();
        state.check_writable()?;
        self.apply([(path.clone(), value)], &mut state);
        Ok(())
    }

    async fn push(&self, collection: &StorePath, value: Value) -> Result<String, RemoteStoreError> {
        let key = Uuid::new_v4().simple().to_string();
        let path = collection.child(&key)?;
        let mut state = self.lock();
        state.check_writable()?;
        self.apply([(path, value)], &mut state);
        Ok(key)
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
