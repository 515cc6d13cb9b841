//! Domain primitives, services and ports.
//!
//! Purpose: model users, issues and responses, and run the issue lifecycle
//! core: the issue repository façade, the subscription reconciler, the
//! filter/view projector, the response commit workflow and the role gate,
//! composed per connection by [`Dashboard`]. Everything here is transport
//! agnostic; adapters live under `inbound` and `outbound`.
//!
//! Public surface:
//! - Error / ErrorCode — transport-agnostic failure payload.
//! - User, Identity, Role — who is looking, and which dashboard they get.
//! - Issue, Response and their drafts — validated before any write.
//! - Dashboard — one mounted patient or doctor view.

pub mod account_service;
pub mod auth;
pub mod contact;
pub mod dashboard;
pub mod error;
pub mod issue;
pub mod issue_repository;
pub mod ports;
pub mod projector;
pub mod reconciler;
pub mod response_workflow;
pub mod role_gate;
pub mod user;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use self::account_service::{AccountService, INCORRECT_ROLE_MESSAGE, SignedIn};
pub use self::auth::{
    AuthValidationError, Identity, LoginCredentials, PASSWORD_MISMATCH_MESSAGE, SignUpRequest,
};
pub use self::contact::{
    CONTACT_COLLECTION, ContactDraft, ContactField, ContactMessage, ContactService,
    ContactValidationError,
};
pub use self::dashboard::{
    ACCOUNT_ERROR_BANNER, Dashboard, DashboardEvent, DashboardView, FEED_ERROR_BANNER,
    ISSUE_SUBMITTED_MESSAGE, NO_PATIENT_ISSUES_MESSAGE, NO_REPORTED_ISSUES_MESSAGE, Notice,
    NoticeLevel, RESPONSE_SENT_MESSAGE, ResponseForm, Wake, no_matching_message,
};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::issue::{
    Issue, IssueDetails, IssueDraft, IssueField, IssueId, IssueRecord, IssueStatus,
    IssueValidationError, Response, ResponseContent, ResponseDraft, ResponseRecord,
};
pub use self::issue_repository::{
    ISSUE_NOT_PENDING_MESSAGE, ISSUES_COLLECTION, StoreIssueRepository, USERS_COLLECTION,
};
pub use self::projector::{
    IssueFilter, PatientName, PatientNames, ProjectedIssue, UNKNOWN_PATIENT, UnknownFilter,
    ViewCondition, ViewProjection, filtered,
};
pub use self::reconciler::{
    FeedScope, FeedStatus, ReconciledIssues, SubscriptionReconciler, newest_first,
};
pub use self::response_workflow::{
    CommitOutcome, CommitState, PendingCommit, ResponseCommitWorkflow, ResponseSelection,
    SUBMISSION_IN_PROGRESS_MESSAGE,
};
pub use self::role_gate::{
    DashboardKind, GateDecision, GateState, GateStep, ResolveTicket, RoleGate, Route, route_for,
};
pub use self::user::{
    DISPLAY_NAME_MAX, DisplayName, Email, Role, User, UserId, UserRecord, UserValidationError,
};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use carelink::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<()> {
///     Err(Error::forbidden("nope"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;
