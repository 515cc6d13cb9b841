//! Dashboard orchestration.
//!
//! A [`Dashboard`] is one mounted patient or doctor view. It owns the role
//! gate, the single live issue subscription, the patient-name cache, the
//! response workflow and every background task it starts. Nothing is shared
//! between dashboards; callers drive one with [`Dashboard::wake`] and
//! [`Dashboard::handle_wake`] (or [`Dashboard::next_event`]) and read the
//! resulting [`DashboardEvent`]s from its outbox.
//!
//! Lifecycle: the gate resolves on mount and again on every identity change.
//! Only an admitted dashboard opens a subscription. A redirect or
//! [`Dashboard::teardown`] closes the subscription and aborts in-flight name
//! lookups; response writes already sent keep running, and their results are
//! ignored once the dashboard is gone.

use std::collections::{HashMap, VecDeque};
use std::future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::domain::ports::{IdentityProvider, IssueFeedEvent, IssueRepository};
use crate::domain::{
    CommitOutcome, CommitState, DashboardKind, Error, FeedScope, FeedStatus, GateDecision,
    GateStep, Identity, Issue, IssueDraft, IssueFilter, IssueId, PatientName, PatientNames,
    ReconciledIssues, ResponseCommitWorkflow, ResponseDraft, RoleGate, Route,
    SubscriptionReconciler, User, UserId, ViewCondition, ViewProjection,
};

/// Doctor view with no issues at all.
pub const NO_PATIENT_ISSUES_MESSAGE: &str = "No patient issues available.";
/// Patient view with no issues at all.
pub const NO_REPORTED_ISSUES_MESSAGE: &str = "You have not reported any health issues yet.";
/// Banner shown while the issue feed is failing.
pub const FEED_ERROR_BANNER: &str = "Error loading patient issues. Please refresh the page.";
/// Banner shown when the viewer's role could not be looked up.
pub const ACCOUNT_ERROR_BANNER: &str = "Error loading your account. Please refresh the page.";
/// Notice after a committed response.
pub const RESPONSE_SENT_MESSAGE: &str = "Response sent successfully!";
/// Notice after a submitted issue.
pub const ISSUE_SUBMITTED_MESSAGE: &str = "Health issue submitted successfully!";

/// Empty-state text for a filtered-out view.
pub fn no_matching_message(filter: IssueFilter) -> String {
    format!("No {filter} issues available.")
}

type LookupBatch = (Vec<UserId>, Result<HashMap<UserId, Option<User>>, Error>);
type CommitResult = (IssueId, Result<(), Error>);

/// Severity of a transient notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A one-off message for the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// The open response form on a doctor dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseForm {
    pub issue: Issue,
    pub patient_name: PatientName,
    /// Resubmission is disabled while `true`.
    pub submitting: bool,
    /// Message of the last failed commit, if any.
    pub error: Option<String>,
}

/// Everything an admitted dashboard renders.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub kind: DashboardKind,
    /// Greeting label: the viewer's name, or email when no name is known.
    pub viewer: String,
    /// No feed notification has arrived yet.
    pub loading: bool,
    pub projection: ViewProjection,
    pub empty_message: Option<String>,
    pub banner: Option<String>,
    pub response_form: Option<ResponseForm>,
}

/// Output of a dashboard, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    View(DashboardView),
    Redirect(Route),
    Notice(Notice),
}

/// What woke the dashboard. Produced by [`Dashboard::wake`].
#[derive(Debug)]
pub enum Wake {
    IdentityChanged,
    IdentityClosed,
    Feed(IssueFeedEvent),
    Lookup(Result<LookupBatch, JoinError>),
    Commit(CommitResult),
}

fn feed_unavailable() -> Error {
    Error::service_unavailable("issue feed is not available")
}

async fn next_feed_event(feed: &mut Option<SubscriptionReconciler>) -> IssueFeedEvent {
    match feed {
        Some(feed) => feed.next_event().await,
        None => future::pending().await,
    }
}

pub struct Dashboard {
    kind: DashboardKind,
    repository: Arc<dyn IssueRepository>,
    identity: Arc<dyn IdentityProvider>,
    identity_rx: watch::Receiver<Option<Identity>>,
    identity_closed: bool,
    current_identity: Option<Identity>,
    gate: RoleGate,
    gate_error: Option<Error>,
    feed: Option<SubscriptionReconciler>,
    open_error: Option<Error>,
    filter: IssueFilter,
    names: PatientNames,
    lookups: JoinSet<LookupBatch>,
    workflow: ResponseCommitWorkflow,
    commit_tx: mpsc::UnboundedSender<CommitResult>,
    commit_rx: mpsc::UnboundedReceiver<CommitResult>,
    outbox: VecDeque<DashboardEvent>,
    last_view: Option<DashboardView>,
    torn_down: bool,
}

impl Dashboard {
    /// Mount a dashboard and run the role gate to completion.
    pub async fn mount(
        kind: DashboardKind,
        repository: Arc<dyn IssueRepository>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let identity_rx = identity.watch();
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        let mut dashboard = Self {
            kind,
            repository,
            identity,
            identity_rx,
            identity_closed: false,
            current_identity: None,
            gate: RoleGate::new(kind),
            gate_error: None,
            feed: None,
            open_error: None,
            filter: IssueFilter::All,
            names: PatientNames::new(),
            lookups: JoinSet::new(),
            workflow: ResponseCommitWorkflow::new(),
            commit_tx,
            commit_rx,
            outbox: VecDeque::new(),
            last_view: None,
            torn_down: false,
        };
        info!(dashboard = %kind, "dashboard mounted");
        dashboard.regate().await;
        dashboard
    }

    pub fn kind(&self) -> DashboardKind {
        self.kind
    }

    pub fn filter(&self) -> IssueFilter {
        self.filter
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Whether the live subscription is currently held.
    pub fn has_open_subscription(&self) -> bool {
        self.feed.as_ref().is_some_and(SubscriptionReconciler::is_open)
    }

    /// Number of name lookups still running.
    pub fn lookups_in_flight(&self) -> usize {
        self.lookups.len()
    }

    pub fn admitted_user(&self) -> Option<&User> {
        self.gate.admitted()
    }

    /// The reconciled issue set, once admitted.
    pub fn issues(&self) -> Option<&ReconciledIssues> {
        self.feed.as_ref().map(SubscriptionReconciler::issues)
    }

    pub fn commit_state(&self) -> &CommitState {
        self.workflow.state()
    }

    /// Take every pending output event.
    pub fn drain_events(&mut self) -> Vec<DashboardEvent> {
        self.outbox.drain(..).collect()
    }

    /// Wait until something needs handling. Pends forever once torn down.
    ///
    /// Cancel-safe: every source is a channel receive or task join, so
    /// dropping the future loses nothing. Pass the result to
    /// [`handle_wake`](Self::handle_wake).
    pub async fn wake(&mut self) -> Wake {
        if self.torn_down {
            return future::pending().await;
        }
        tokio::select! {
            changed = self.identity_rx.changed(), if !self.identity_closed => match changed {
                Ok(()) => Wake::IdentityChanged,
                Err(_) => Wake::IdentityClosed,
            },
            event = next_feed_event(&mut self.feed) => Wake::Feed(event),
            Some(joined) = self.lookups.join_next(), if !self.lookups.is_empty() => Wake::Lookup(joined),
            Some(result) = self.commit_rx.recv() => Wake::Commit(result),
        }
    }

    /// Act on a wake-up, queueing any resulting events.
    pub async fn handle_wake(&mut self, wake: Wake) {
        if self.torn_down {
            return;
        }
        match wake {
            Wake::IdentityChanged => self.regate().await,
            Wake::IdentityClosed => {
                debug!(dashboard = %self.kind, "identity provider closed");
                self.identity_closed = true;
            }
            Wake::Feed(event) => {
                let changed = self.feed.as_mut().is_some_and(|feed| feed.apply(event));
                if changed {
                    self.schedule_lookups();
                    self.emit_view();
                }
            }
            Wake::Lookup(joined) => self.finish_lookup(joined),
            Wake::Commit((issue_id, result)) => self.finish_commit(&issue_id, result),
        }
    }

    /// Handle wake-ups until an event is available. Returns `None` once the
    /// dashboard is torn down and its outbox is empty.
    pub async fn next_event(&mut self) -> Option<DashboardEvent> {
        loop {
            if let Some(event) = self.outbox.pop_front() {
                return Some(event);
            }
            if self.torn_down {
                return None;
            }
            let wake = self.wake().await;
            self.handle_wake(wake).await;
        }
    }

    /// Change the client-side filter. Never touches the subscription.
    pub fn set_filter(&mut self, filter: IssueFilter) {
        if self.filter != filter {
            debug!(dashboard = %self.kind, filter = %filter, "filter changed");
        }
        self.filter = filter;
        self.emit_view();
    }

    fn admitted_doctor(&self) -> Result<User, Error> {
        match self.gate.admitted() {
            Some(user) if self.kind == DashboardKind::Doctor => Ok(user.clone()),
            _ => Err(Error::forbidden("only doctors may respond to issues")),
        }
    }

    fn admitted_patient(&self) -> Result<User, Error> {
        match self.gate.admitted() {
            Some(user) if self.kind == DashboardKind::Patient => Ok(user.clone()),
            _ => Err(Error::forbidden("only patients may submit issues")),
        }
    }

    /// Open the response form for a pending issue.
    pub fn select_issue(&mut self, issue_id: &IssueId) -> Result<(), Error> {
        self.admitted_doctor()?;
        let feed = self.feed.as_ref().ok_or_else(feed_unavailable)?;
        self.workflow.select(feed.issues(), issue_id)?;
        self.emit_view();
        Ok(())
    }

    /// Hide and reset the response form.
    pub fn cancel_response(&mut self) -> Result<(), Error> {
        self.workflow.cancel()?;
        self.emit_view();
        Ok(())
    }

    /// Start committing a response for the selected issue. The write runs in
    /// the background; its result arrives through [`wake`](Self::wake).
    pub fn submit_response(&mut self, draft: ResponseDraft) -> Result<(), Error> {
        let doctor = self.admitted_doctor()?;
        let feed = self.feed.as_ref().ok_or_else(feed_unavailable)?;
        let pending = self.workflow.begin(&doctor, feed.issues(), draft)?;

        let issue_id = pending.issue_id().clone();
        let repository = Arc::clone(&self.repository);
        let results = self.commit_tx.clone();
        tokio::spawn(async move {
            let result = repository.submit_response(pending.into_request()).await;
            if results.send((issue_id, result)).is_err() {
                debug!("dashboard gone before response commit finished");
            }
        });
        self.emit_view();
        Ok(())
    }

    /// Submit a new issue as the admitted patient.
    pub async fn submit_issue(&mut self, draft: IssueDraft) -> Result<IssueId, Error> {
        let patient = self.admitted_patient()?;
        let id = self.repository.submit_issue(patient.id(), draft).await?;
        self.outbox
            .push_back(DashboardEvent::Notice(Notice::success(ISSUE_SUBMITTED_MESSAGE)));
        Ok(id)
    }

    /// Ask the authentication collaborator to sign out. The resulting
    /// identity change redirects to sign-in.
    pub async fn sign_out(&mut self) -> Result<(), Error> {
        self.identity.sign_out().await
    }

    /// Close the subscription and cancel name lookups. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.release_resources();
        info!(dashboard = %self.kind, "dashboard torn down");
    }

    fn release_resources(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.close();
        }
        self.lookups.abort_all();
        self.names.clear();
    }

    /// Resolve the current identity, retrying while it keeps changing
    /// underneath an outstanding lookup.
    async fn regate(&mut self) {
        self.release_resources();
        self.open_error = None;
        self.gate_error = None;
        self.workflow = ResponseCommitWorkflow::new();
        self.last_view = None;

        loop {
            let identity = self.identity_rx.borrow_and_update().clone();
            self.current_identity.clone_from(&identity);
            let ticket = match self.gate.begin(identity.as_ref()) {
                GateStep::Decided(decision) => return self.apply_decision(decision).await,
                GateStep::Lookup(ticket) => ticket,
            };

            let result = self.repository.get_user(ticket.user_id()).await;
            if self.identity_rx.has_changed().unwrap_or(false) {
                debug!(dashboard = %self.kind, "identity changed during role lookup");
                continue;
            }
            if let Some(decision) = self.gate.complete(&ticket, result) {
                return self.apply_decision(decision).await;
            }
        }
    }

    async fn apply_decision(&mut self, decision: GateDecision) {
        match decision {
            GateDecision::Admit(user) => {
                let scope = match self.kind {
                    DashboardKind::Patient => FeedScope::Patient(user.id().clone()),
                    DashboardKind::Doctor => FeedScope::AllIssues,
                };
                match SubscriptionReconciler::open(self.repository.as_ref(), scope).await {
                    Ok(feed) => self.feed = Some(feed),
                    Err(err) => {
                        warn!(dashboard = %self.kind, error = %err, "could not open issue feed");
                        self.open_error = Some(err);
                    }
                }
                self.emit_view();
            }
            GateDecision::Redirect(route) => {
                self.outbox.push_back(DashboardEvent::Redirect(route));
                self.teardown();
            }
            GateDecision::Unavailable(err) => {
                self.gate_error = Some(err);
                self.emit_view();
            }
        }
    }

    /// Start one batch lookup for every patient id not yet resolved.
    fn schedule_lookups(&mut self) {
        if self.kind != DashboardKind::Doctor {
            return;
        }
        let Some(feed) = self.feed.as_ref() else {
            return;
        };
        let ids = self.names.unresolved(feed.issues().iter());
        if ids.is_empty() {
            return;
        }
        self.names.mark_in_flight(&ids);
        debug!(patients = ids.len(), "resolving patient names");
        let repository = Arc::clone(&self.repository);
        self.lookups.spawn(async move {
            let result = repository.get_users(&ids).await;
            (ids, result)
        });
    }

    fn finish_lookup(&mut self, joined: Result<LookupBatch, JoinError>) {
        match joined {
            Ok((ids, Ok(users))) => {
                self.names.record_batch(&ids, users);
                self.emit_view();
            }
            Ok((ids, Err(err))) => {
                warn!(patients = ids.len(), error = %err, "patient name lookup failed");
                self.names.record_failure(&ids);
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => warn!(error = %err, "patient name lookup task failed"),
        }
    }

    fn finish_commit(&mut self, issue_id: &IssueId, result: Result<(), Error>) {
        match self.workflow.complete(issue_id, result) {
            CommitOutcome::Committed { .. } => {
                self.outbox
                    .push_back(DashboardEvent::Notice(Notice::success(RESPONSE_SENT_MESSAGE)));
            }
            CommitOutcome::Failed { error, .. } => {
                self.outbox.push_back(DashboardEvent::Notice(Notice::error(format!(
                    "Error sending response: {}",
                    error.message()
                ))));
            }
            CommitOutcome::Ignored => return,
        }
        self.emit_view();
    }

    fn build_view(&self) -> Option<DashboardView> {
        if self.torn_down {
            return None;
        }
        let Some(user) = self.gate.admitted() else {
            let err = self.gate_error.as_ref()?;
            debug!(error = %err, "rendering account error banner");
            let viewer = self
                .current_identity
                .as_ref()
                .map(|identity| identity.email().to_string())
                .unwrap_or_default();
            return Some(DashboardView {
                kind: self.kind,
                viewer,
                loading: false,
                projection: ViewProjection::project(&ReconciledIssues::new(), self.filter, None),
                empty_message: None,
                banner: Some(ACCOUNT_ERROR_BANNER.to_owned()),
                response_form: None,
            });
        };

        let empty = ReconciledIssues::new();
        let issues = self.issues().unwrap_or(&empty);
        let names = (self.kind == DashboardKind::Doctor).then_some(&self.names);
        let projection = ViewProjection::project(issues, self.filter, names);

        let empty_message = projection.condition.map(|condition| match condition {
            ViewCondition::NoIssues => match self.kind {
                DashboardKind::Doctor => NO_PATIENT_ISSUES_MESSAGE.to_owned(),
                DashboardKind::Patient => NO_REPORTED_ISSUES_MESSAGE.to_owned(),
            },
            ViewCondition::NoMatching(filter) => no_matching_message(filter),
        });
        let feed_failed = matches!(issues.status(), FeedStatus::Failed { .. });
        let banner = (self.open_error.is_some() || feed_failed).then(|| FEED_ERROR_BANNER.to_owned());

        let response_form = self
            .workflow
            .selection()
            .filter(|_| self.workflow.form_visible())
            .and_then(|selection| issues.get(&selection.issue_id))
            .map(|issue| ResponseForm {
                issue: issue.clone(),
                patient_name: self.names.get(issue.patient_id()),
                submitting: self.workflow.is_submitting(),
                error: match self.workflow.state() {
                    CommitState::Failed { error } => Some(error.message().to_owned()),
                    _ => None,
                },
            });

        Some(DashboardView {
            kind: self.kind,
            viewer: user.name().to_string(),
            loading: self.open_error.is_none() && issues.status() == &FeedStatus::Loading,
            projection,
            empty_message,
            banner,
            response_form,
        })
    }

    /// Queue the current view unless it equals the last one queued.
    fn emit_view(&mut self) {
        let Some(view) = self.build_view() else {
            return;
        };
        if self.last_view.as_ref() == Some(&view) {
            return;
        }
        self.last_view = Some(view.clone());
        self.outbox.push_back(DashboardEvent::View(view));
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "dashboard_tests.rs"]
mod tests;
