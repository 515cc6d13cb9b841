//! Subscription reconciler.
//!
//! Owns the single live issue feed of one dashboard and folds every push into
//! a deterministic issue set, ordered newest first with ties broken by
//! ascending id. Feed errors keep the last good set and record a failure the
//! view can surface; the reconciler never retries or reopens on its own.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::future;

use tracing::{debug, info, warn};

use crate::domain::ports::{IssueFeedEvent, IssueRepository, IssueSubscription};
use crate::domain::{Error, Issue, IssueId, UserId};

/// Which issues a dashboard observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    /// Every issue (doctor dashboards).
    AllIssues,
    /// One patient's issues, filtered by the store.
    Patient(UserId),
}

/// Health of the live feed as last reported.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedStatus {
    /// No notification has arrived yet.
    Loading,
    /// The set reflects the latest notification.
    Live,
    /// The feed failed; the set holds the last good state.
    Failed { error: Error },
}

/// Ordering used for every reconciled set: `created_at` descending, then id
/// ascending.
pub fn newest_first(a: &Issue, b: &Issue) -> Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| a.id().cmp(b.id()))
}

/// The in-memory issue set maintained from one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledIssues {
    by_id: HashMap<IssueId, Issue>,
    ordered: Vec<IssueId>,
    status: FeedStatus,
    revision: u64,
}

impl Default for ReconciledIssues {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            ordered: Vec::new(),
            status: FeedStatus::Loading,
            revision: 0,
        }
    }
}

impl ReconciledIssues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one feed event into the set. Returns whether anything observable
    /// changed, so redundant deliveries are no-ops.
    pub fn apply(&mut self, event: IssueFeedEvent) -> bool {
        let changed = match event {
            IssueFeedEvent::Snapshot(issues) => {
                let next: HashMap<IssueId, Issue> = issues
                    .into_iter()
                    .map(|issue| (issue.id().clone(), issue))
                    .collect();
                let changed = next != self.by_id;
                self.by_id = next;
                self.mark_live() || changed
            }
            IssueFeedEvent::Upserted(issue) => {
                let changed = self.by_id.get(issue.id()) != Some(&issue);
                self.by_id.insert(issue.id().clone(), issue);
                self.mark_live() || changed
            }
            IssueFeedEvent::Removed(id) => {
                let changed = self.by_id.remove(&id).is_some();
                self.mark_live() || changed
            }
            IssueFeedEvent::Failed(error) => {
                let next = FeedStatus::Failed { error };
                let changed = self.status != next;
                self.status = next;
                changed
            }
        };

        if changed {
            self.resort();
            self.revision += 1;
        }
        changed
    }

    fn mark_live(&mut self) -> bool {
        let changed = self.status != FeedStatus::Live;
        self.status = FeedStatus::Live;
        changed
    }

    fn resort(&mut self) {
        let mut issues: Vec<&Issue> = self.by_id.values().collect();
        issues.sort_by(|a, b| newest_first(a, b));
        self.ordered = issues.into_iter().map(|issue| issue.id().clone()).collect();
    }

    /// Issues in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Issue> + '_ {
        self.ordered.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn get(&self, id: &IssueId) -> Option<&Issue> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn status(&self) -> &FeedStatus {
        &self.status
    }

    /// Incremented on every observable change.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Live subscription plus the set it feeds, for one dashboard activation.
#[derive(Debug)]
pub struct SubscriptionReconciler {
    scope: FeedScope,
    subscription: Option<IssueSubscription>,
    issues: ReconciledIssues,
}

impl SubscriptionReconciler {
    /// Open the single live subscription for `scope`.
    pub async fn open(repository: &dyn IssueRepository, scope: FeedScope) -> Result<Self, Error> {
        let subscription = match &scope {
            FeedScope::AllIssues => repository.subscribe_all().await?,
            FeedScope::Patient(patient_id) => repository.subscribe_by_patient(patient_id).await?,
        };
        Ok(Self {
            scope,
            subscription: Some(subscription),
            issues: ReconciledIssues::new(),
        })
    }

    pub fn scope(&self) -> &FeedScope {
        &self.scope
    }

    pub fn issues(&self) -> &ReconciledIssues {
        &self.issues
    }

    /// Whether the live subscription is still held.
    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// Wait for the next feed event. Pends forever once closed.
    ///
    /// Cancel-safe. If the store ends the feed, the subscription is released
    /// and a failure event is returned so the view can surface it.
    pub async fn next_event(&mut self) -> IssueFeedEvent {
        let Some(subscription) = self.subscription.as_mut() else {
            return future::pending().await;
        };
        match subscription.next().await {
            Some(event) => event,
            None => {
                warn!(scope = ?self.scope, "issue feed ended by the store");
                self.subscription = None;
                IssueFeedEvent::Failed(Error::service_unavailable("issue feed closed by the store"))
            }
        }
    }

    /// Fold an event into the reconciled set; see [`ReconciledIssues::apply`].
    pub fn apply(&mut self, event: IssueFeedEvent) -> bool {
        if let IssueFeedEvent::Failed(error) = &event {
            warn!(scope = ?self.scope, error = %error, "issue feed reported an error");
        }
        let changed = self.issues.apply(event);
        if changed {
            debug!(revision = self.issues.revision(), issues = self.issues.len(), "issues reconciled");
        }
        changed
    }

    /// Release the live subscription. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
            info!(scope = ?self.scope, "issue subscription closed");
        }
    }
}

impl Drop for SubscriptionReconciler {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
