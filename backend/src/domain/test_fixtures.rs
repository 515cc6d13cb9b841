//! Builders shared by domain unit tests.

use chrono::DateTime;

use crate::domain::{
    Email, Identity, Issue, IssueDraft, IssueId, Response, ResponseDraft, UserId,
};

pub const PATIENT: &str = "11111111-1111-4111-8111-111111111111";
pub const DOCTOR: &str = "22222222-2222-4222-8222-222222222222";
pub const OTHER_PATIENT: &str = "33333333-3333-4333-8333-333333333333";

pub fn user_id(raw: &str) -> UserId {
    UserId::new(raw).expect("valid user id")
}

pub fn issue_id(raw: &str) -> IssueId {
    IssueId::new(raw).expect("valid issue id")
}

pub fn identity(raw: &str) -> Identity {
    Identity::new(
        user_id(raw),
        Email::new(format!("{}@example.org", raw.split('-').next().unwrap_or(raw))).expect("valid email"),
    )
}

/// A pending issue titled after its id.
pub fn pending(id: &str, patient: &str, created_ms: i64) -> Issue {
    let details = IssueDraft {
        title: format!("Issue {id}"),
        description: "Description".to_owned(),
        symptoms: "Symptoms".to_owned(),
        duration: "2 days".to_owned(),
    }
    .validate()
    .expect("valid draft");
    Issue::new(
        issue_id(id),
        user_id(patient),
        details,
        DateTime::from_timestamp_millis(created_ms).expect("valid timestamp"),
        None,
    )
}

/// The same issue after a doctor's response.
pub fn responded(id: &str, patient: &str, created_ms: i64) -> Issue {
    let base = pending(id, patient, created_ms);
    let content = ResponseDraft {
        diagnosis: "Flu".to_owned(),
        prescription: "Rest+fluids".to_owned(),
        advice: None,
    }
    .validate()
    .expect("valid response");
    Issue::new(
        base.id().clone(),
        base.patient_id().clone(),
        base.details().clone(),
        base.created_at(),
        Some(Response::new(
            content,
            DateTime::from_timestamp_millis(created_ms + 1_000).expect("valid timestamp"),
            user_id(DOCTOR),
        )),
    )
}
