//! Tests for the response commit workflow.

use super::*;
use crate::domain::ports::{IssueFeedEvent, MockIssueRepository};
use crate::domain::test_fixtures::{DOCTOR, PATIENT, issue_id, pending, responded, user_id};
use crate::domain::{DisplayName, Email, ErrorCode};
use rstest::{fixture, rstest};

fn user(raw: &str, role: Role) -> User {
    User::new(
        user_id(raw),
        DisplayName::new("Dr Who").expect("valid name"),
        Email::new("who@example.org").expect("valid email"),
        role,
    )
}

#[fixture]
fn doctor() -> User {
    user(DOCTOR, Role::Doctor)
}

#[fixture]
fn issues() -> ReconciledIssues {
    let mut set = ReconciledIssues::new();
    set.apply(IssueFeedEvent::Snapshot(vec![
        pending("open", PATIENT, 1_000),
        responded("done", PATIENT, 2_000),
    ]));
    set
}

fn draft() -> ResponseDraft {
    ResponseDraft {
        diagnosis: "Flu".to_owned(),
        prescription: "Rest+fluids".to_owned(),
        advice: None,
    }
}

#[rstest]
fn selecting_a_pending_issue_opens_the_form(issues: ReconciledIssues) {
    let mut workflow = ResponseCommitWorkflow::new();
    let selection = workflow
        .select(&issues, &issue_id("open"))
        .expect("pending issue")
        .clone();

    assert_eq!(selection.patient_id, user_id(PATIENT));
    assert!(workflow.form_visible());
    assert_eq!(workflow.state(), &CommitState::Idle);
}

#[rstest]
#[case("done")]
#[case("missing")]
fn selecting_non_pending_issue_is_a_conflict(issues: ReconciledIssues, #[case] id: &str) {
    let mut workflow = ResponseCommitWorkflow::new();
    let err = workflow
        .select(&issues, &issue_id(id))
        .expect_err("not pending");
    assert_eq!(err.code(), ErrorCode::Conflict);
    assert!(!workflow.form_visible());
}

#[rstest]
fn begin_enters_submitting_and_blocks_resubmission(doctor: User, issues: ReconciledIssues) {
    let mut workflow = ResponseCommitWorkflow::new();
    workflow.select(&issues, &issue_id("open")).expect("select");

    let pending = workflow.begin(&doctor, &issues, draft()).expect("begin");
    assert_eq!(pending.request().doctor_id, user_id(DOCTOR));
    assert!(workflow.is_submitting());

    let err = workflow.begin(&doctor, &issues, draft()).expect_err("in flight");
    assert_eq!(err.message(), SUBMISSION_IN_PROGRESS_MESSAGE);
    assert!(workflow.cancel().is_err());
}

#[rstest]
fn patients_cannot_respond(issues: ReconciledIssues) {
    let mut workflow = ResponseCommitWorkflow::new();
    workflow.select(&issues, &issue_id("open")).expect("select");

    let err = workflow
        .begin(&user(PATIENT, Role::Patient), &issues, draft())
        .expect_err("not a doctor");
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[rstest]
fn begin_requires_a_selection(doctor: User, issues: ReconciledIssues) {
    let mut workflow = ResponseCommitWorkflow::new();
    let err = workflow.begin(&doctor, &issues, draft()).expect_err("no selection");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[rstest]
fn validation_failure_leaves_state_idle(doctor: User, issues: ReconciledIssues) {
    let mut workflow = ResponseCommitWorkflow::new();
    workflow.select(&issues, &issue_id("open")).expect("select");

    let err = workflow
        .begin(&doctor, &issues, ResponseDraft::default())
        .expect_err("blank draft");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert_eq!(workflow.state(), &CommitState::Idle);
    assert!(workflow.form_visible());
}

#[rstest]
fn begin_rejects_issue_answered_since_selection(doctor: User, mut issues: ReconciledIssues) {
    let mut workflow = ResponseCommitWorkflow::new();
    workflow.select(&issues, &issue_id("open")).expect("select");
    issues.apply(IssueFeedEvent::Upserted(responded("open", PATIENT, 1_000)));

    let err = workflow.begin(&doctor, &issues, draft()).expect_err("answered");
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[rstest]
fn success_clears_and_hides_the_form(doctor: User, issues: ReconciledIssues) {
    let mut workflow = ResponseCommitWorkflow::new();
    workflow.select(&issues, &issue_id("open")).expect("select");
    let pending = workflow.begin(&doctor, &issues, draft()).expect("begin");

    let outcome = workflow.complete(pending.issue_id(), Ok(()));
    assert_eq!(
        outcome,
        CommitOutcome::Committed {
            issue_id: issue_id("open")
        }
    );
    assert_eq!(workflow.state(), &CommitState::Committed);
    assert!(workflow.selection().is_none());
    assert!(!workflow.form_visible());
    assert_eq!(
        workflow.complete(&issue_id("open"), Ok(())),
        CommitOutcome::Ignored
    );
}

#[rstest]
fn failure_reenables_the_form(doctor: User, issues: ReconciledIssues) {
    let mut workflow = ResponseCommitWorkflow::new();
    workflow.select(&issues, &issue_id("open")).expect("select");
    let pending = workflow.begin(&doctor, &issues, draft()).expect("begin");

    let error = Error::service_unavailable("offline");
    workflow.complete(pending.issue_id(), Err(error.clone()));

    assert_eq!(workflow.state(), &CommitState::Failed { error });
    assert!(workflow.form_visible());
    assert!(workflow.selection().is_some());
    workflow
        .begin(&doctor, &issues, draft())
        .expect("retry allowed after failure");
}

#[rstest]
#[tokio::test]
async fn submit_runs_the_write_once(doctor: User, issues: ReconciledIssues) {
    let mut repository = MockIssueRepository::new();
    repository
        .expect_submit_response()
        .withf(|request| request.issue_id.as_ref() == "open" && request.draft.diagnosis == "Flu")
        .times(1)
        .return_once(|_| Ok(()));

    let mut workflow = ResponseCommitWorkflow::new();
    workflow.select(&issues, &issue_id("open")).expect("select");
    let outcome = workflow
        .submit(&repository, &doctor, &issues, draft())
        .await
        .expect("preconditions hold");

    assert!(matches!(outcome, CommitOutcome::Committed { .. }));
}

#[rstest]
#[tokio::test]
async fn submit_surfaces_conflicts_as_failed_outcomes(doctor: User, issues: ReconciledIssues) {
    let mut repository = MockIssueRepository::new();
    repository
        .expect_submit_response()
        .return_once(|_| Err(Error::conflict(ISSUE_NOT_PENDING_MESSAGE)));

    let mut workflow = ResponseCommitWorkflow::new();
    workflow.select(&issues, &issue_id("open")).expect("select");
    let outcome = workflow
        .submit(&repository, &doctor, &issues, draft())
        .await
        .expect("preconditions hold");

    let CommitOutcome::Failed { error, .. } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(error.code(), ErrorCode::Conflict);
}
