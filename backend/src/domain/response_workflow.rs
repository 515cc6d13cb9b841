//! Response commit workflow.
//!
//! Tracks one doctor's response form through `Idle -> Submitting ->
//! {Committed | Failed}`. While a write is outstanding, further submissions
//! are refused. The write itself is performed by the caller with the
//! [`PendingCommit`] this workflow hands out, so the dashboard can run it in
//! the background and feed the result back through [`complete`].
//!
//! [`complete`]: ResponseCommitWorkflow::complete

use tracing::{info, warn};

use crate::domain::ports::{IssueRepository, SubmitResponseRequest};
use crate::domain::{
    Error, ISSUE_NOT_PENDING_MESSAGE, Issue, IssueId, ReconciledIssues, ResponseDraft, Role, User,
    UserId,
};

/// Message returned while a previous submission is still in flight.
pub const SUBMISSION_IN_PROGRESS_MESSAGE: &str = "a response is already being submitted";

/// Lifecycle of the response form.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CommitState {
    #[default]
    Idle,
    Submitting,
    Committed,
    Failed { error: Error },
}

/// The issue a doctor chose to respond to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSelection {
    pub issue_id: IssueId,
    pub patient_id: UserId,
}

/// An authorised, validated write waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    request: SubmitResponseRequest,
}

impl PendingCommit {
    pub fn issue_id(&self) -> &IssueId {
        &self.request.issue_id
    }

    pub fn request(&self) -> &SubmitResponseRequest {
        &self.request
    }

    pub fn into_request(self) -> SubmitResponseRequest {
        self.request
    }
}

/// Result of feeding a write result back into the workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed { issue_id: IssueId },
    Failed { issue_id: IssueId, error: Error },
    /// No submission was outstanding; the result is dropped.
    Ignored,
}

fn pending_issue<'a>(issues: &'a ReconciledIssues, issue_id: &IssueId) -> Result<&'a Issue, Error> {
    issues
        .get(issue_id)
        .filter(|issue| issue.is_pending())
        .ok_or_else(|| Error::conflict(ISSUE_NOT_PENDING_MESSAGE))
}

#[derive(Debug, Clone, Default)]
pub struct ResponseCommitWorkflow {
    state: CommitState,
    selection: Option<ResponseSelection>,
    form_visible: bool,
}

impl ResponseCommitWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CommitState {
        &self.state
    }

    pub fn selection(&self) -> Option<&ResponseSelection> {
        self.selection.as_ref()
    }

    pub fn form_visible(&self) -> bool {
        self.form_visible
    }

    pub fn is_submitting(&self) -> bool {
        self.state == CommitState::Submitting
    }

    fn ensure_not_submitting(&self) -> Result<(), Error> {
        if self.is_submitting() {
            return Err(Error::conflict(SUBMISSION_IN_PROGRESS_MESSAGE));
        }
        Ok(())
    }

    /// Open the response form for a pending issue in the reconciled set.
    pub fn select(
        &mut self,
        issues: &ReconciledIssues,
        issue_id: &IssueId,
    ) -> Result<&ResponseSelection, Error> {
        self.ensure_not_submitting()?;
        let issue = pending_issue(issues, issue_id)?;
        self.state = CommitState::Idle;
        self.form_visible = true;
        Ok(self.selection.insert(ResponseSelection {
            issue_id: issue.id().clone(),
            patient_id: issue.patient_id().clone(),
        }))
    }

    /// Hide and reset the form. Refused while a write is outstanding.
    pub fn cancel(&mut self) -> Result<(), Error> {
        self.ensure_not_submitting()?;
        self.selection = None;
        self.form_visible = false;
        self.state = CommitState::Idle;
        Ok(())
    }

    /// Check every precondition and enter `Submitting`.
    ///
    /// Validation failures leave the state untouched.
    pub fn begin(
        &mut self,
        doctor: &User,
        issues: &ReconciledIssues,
        draft: ResponseDraft,
    ) -> Result<PendingCommit, Error> {
        if doctor.role() != Role::Doctor {
            return Err(Error::forbidden("only doctors may respond to issues"));
        }
        self.ensure_not_submitting()?;
        let selection = self
            .selection
            .clone()
            .ok_or_else(|| Error::invalid_request("select an issue to respond to"))?;
        let issue = pending_issue(issues, &selection.issue_id)?;
        if issue.patient_id() != &selection.patient_id {
            return Err(Error::conflict(ISSUE_NOT_PENDING_MESSAGE));
        }
        draft.clone().validate()?;

        self.state = CommitState::Submitting;
        Ok(PendingCommit {
            request: SubmitResponseRequest {
                issue_id: selection.issue_id,
                patient_id: selection.patient_id,
                doctor_id: doctor.id().clone(),
                draft,
            },
        })
    }

    /// Apply the result of the write started by [`begin`](Self::begin).
    pub fn complete(&mut self, issue_id: &IssueId, result: Result<(), Error>) -> CommitOutcome {
        if !self.is_submitting() {
            return CommitOutcome::Ignored;
        }
        match result {
            Ok(()) => {
                info!(issue_id = %issue_id, "response form closed after commit");
                self.state = CommitState::Committed;
                self.selection = None;
                self.form_visible = false;
                CommitOutcome::Committed {
                    issue_id: issue_id.clone(),
                }
            }
            Err(error) => {
                warn!(issue_id = %issue_id, error = %error, "response commit failed");
                self.state = CommitState::Failed {
                    error: error.clone(),
                };
                CommitOutcome::Failed {
                    issue_id: issue_id.clone(),
                    error,
                }
            }
        }
    }

    /// Run a whole commit inline: [`begin`](Self::begin), write, then
    /// [`complete`](Self::complete). Precondition failures are returned as
    /// errors; write failures as [`CommitOutcome::Failed`].
    pub async fn submit(
        &mut self,
        repository: &dyn IssueRepository,
        doctor: &User,
        issues: &ReconciledIssues,
        draft: ResponseDraft,
    ) -> Result<CommitOutcome, Error> {
        let pending = self.begin(doctor, issues, draft)?;
        let issue_id = pending.issue_id().clone();
        let result = repository.submit_response(pending.into_request()).await;
        Ok(self.complete(&issue_id, result))
    }
}

#[cfg(test)]
#[path = "response_workflow_tests.rs"]
mod tests;
