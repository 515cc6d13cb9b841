//! Typed contract the dashboards use for issue and user records.
//!
//! Implementations translate these operations into remote store calls. Every
//! failure surfaces as a domain [`Error`]; nothing here retries.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::domain::{
    Error, Issue, IssueDraft, IssueId, IssueRecord, ResponseDraft, User, UserId,
};

use super::{StoreNotification, StoreSubscription};

/// A doctor's response addressed to one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponseRequest {
    pub issue_id: IssueId,
    /// Patient the responding doctor believes owns the issue.
    pub patient_id: UserId,
    pub doctor_id: UserId,
    pub draft: ResponseDraft,
}

/// A decoded push on an issue feed.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueFeedEvent {
    /// The complete current set. Undecodable records are left out.
    Snapshot(Vec<Issue>),
    /// One issue entered the feed or changed.
    Upserted(Issue),
    /// One issue left the feed.
    Removed(IssueId),
    /// The feed failed; the store may recover and resume delivering.
    Failed(Error),
}

/// Live issue feed over a store subscription.
#[derive(Debug)]
pub struct IssueSubscription {
    inner: StoreSubscription,
}

impl IssueSubscription {
    pub fn new(inner: StoreSubscription) -> Self {
        Self { inner }
    }

    /// Wait for the next decodable event; `None` once the feed has ended.
    ///
    /// Cancel-safe. Individual records that fail to decode are logged and
    /// skipped.
    pub async fn next(&mut self) -> Option<IssueFeedEvent> {
        loop {
            let notification = self.inner.next().await?;
            if let Some(event) = decode_notification(notification) {
                return Some(event);
            }
        }
    }

    /// Release the underlying live query.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

fn decode_notification(notification: StoreNotification) -> Option<IssueFeedEvent> {
    match notification {
        StoreNotification::Snapshot(children) => Some(IssueFeedEvent::Snapshot(
            children
                .into_iter()
                .filter_map(|(key, value)| decode_issue(key, value))
                .collect(),
        )),
        StoreNotification::ChildChanged { key, value } => {
            decode_issue(key, value).map(IssueFeedEvent::Upserted)
        }
        StoreNotification::ChildRemoved { key } => match IssueId::new(key) {
            Ok(id) => Some(IssueFeedEvent::Removed(id)),
            Err(err) => {
                warn!(error = %err, "ignoring removal of undecodable issue key");
                None
            }
        },
        StoreNotification::Error(err) => Some(IssueFeedEvent::Failed(err.into())),
    }
}

/// Decode one stored issue, logging and dropping records that do not
/// satisfy the issue invariants.
pub(crate) fn decode_issue(key: String, value: Value) -> Option<Issue> {
    let id = match IssueId::new(key.clone()) {
        Ok(id) => id,
        Err(err) => {
            warn!(issue_id = %key, error = %err, "skipping issue with invalid key");
            return None;
        }
    };
    let record = match serde_json::from_value::<IssueRecord>(value) {
        Ok(record) => record,
        Err(err) => {
            warn!(issue_id = %id, error = %err, "skipping malformed issue record");
            return None;
        }
    };
    match Issue::from_record(id.clone(), record) {
        Ok(issue) => Some(issue),
        Err(err) => {
            warn!(issue_id = %id, error = %err, "skipping inconsistent issue record");
            None
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssueRepository: Send + Sync {
    /// Validate and append a new pending issue; returns the store-assigned
    /// id.
    async fn submit_issue(&self, patient_id: &UserId, draft: IssueDraft) -> Result<IssueId, Error>;

    /// Validate and atomically attach a response while marking the issue
    /// responded. Fails with `Conflict` once the issue is no longer pending.
    async fn submit_response(&self, request: SubmitResponseRequest) -> Result<(), Error>;

    /// Live feed of every issue.
    async fn subscribe_all(&self) -> Result<IssueSubscription, Error>;

    /// Live feed of one patient's issues, filtered by the store.
    async fn subscribe_by_patient(&self, patient_id: &UserId) -> Result<IssueSubscription, Error>;

    /// Read one user; `NotFound` when no record exists and `Forbidden` when
    /// the record's role is neither patient nor doctor.
    async fn get_user(&self, id: &UserId) -> Result<User, Error>;

    /// Read several users in one batch. Missing or unreadable records map to
    /// `None`.
    async fn get_users(&self, ids: &[UserId]) -> Result<HashMap<UserId, Option<User>>, Error>;
}
