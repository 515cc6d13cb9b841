//! Optional demo accounts for local runs.

use tracing::info;

use crate::domain::ports::IssueRepository;
use crate::domain::{Error, IssueDraft, SignUpRequest};
use crate::inbound::http::state::HttpState;

/// Password shared by both demo accounts.
pub const DEMO_PASSWORD: &str = "carelink-demo";
pub const DEMO_PATIENT_EMAIL: &str = "patient@carelink.test";
pub const DEMO_DOCTOR_EMAIL: &str = "doctor@carelink.test";

/// Create one patient, one doctor and a pending issue from the patient.
///
/// # Errors
/// Propagates the first failing sign-up or submission.
pub async fn seed_demo_data(http: &HttpState, issues: &dyn IssueRepository) -> Result<(), Error> {
    let patient = http
        .accounts
        .sign_up(SignUpRequest::try_from_parts(
            "Demo Patient",
            DEMO_PATIENT_EMAIL,
            DEMO_PASSWORD,
            DEMO_PASSWORD,
            "patient",
        )?)
        .await?;
    http.accounts
        .sign_up(SignUpRequest::try_from_parts(
            "Demo Doctor",
            DEMO_DOCTOR_EMAIL,
            DEMO_PASSWORD,
            DEMO_PASSWORD,
            "doctor",
        )?)
        .await?;
    let issue_id = issues
        .submit_issue(
            patient.user.id(),
            IssueDraft {
                title: "Persistent headache".to_owned(),
                description: "Dull ache behind the eyes every afternoon".to_owned(),
                symptoms: "Headache, light sensitivity".to_owned(),
                duration: "1 week".to_owned(),
            },
        )
        .await?;
    info!(
        patient_email = DEMO_PATIENT_EMAIL,
        doctor_email = DEMO_DOCTOR_EMAIL,
        issue_id = %issue_id,
        "demo data seeded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::{LoginCredentials, Role, StoreIssueRepository};
    use crate::domain::ports::{RemoteStore, StorePath};
    use crate::outbound::{InMemoryAccountDirectory, InMemorySessions, InMemoryStore};
    use mockable::DefaultClock;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn seeds_both_roles_and_a_pending_issue() {
        let store = Arc::new(InMemoryStore::new(Arc::new(DefaultClock)));
        let http = HttpState::new(
            Arc::new(InMemoryAccountDirectory::new()),
            Arc::new(InMemorySessions::new()),
            store.clone(),
        );
        let issues = StoreIssueRepository::new(store.clone());

        seed_demo_data(&http, &issues).await.expect("seeded");

        let doctor = http
            .accounts
            .log_in(
                LoginCredentials::try_from_parts(DEMO_DOCTOR_EMAIL, DEMO_PASSWORD, "doctor")
                    .expect("credentials"),
            )
            .await
            .expect("doctor signs in");
        assert_eq!(doctor.user.role(), Role::Doctor);

        let stored = store
            .read(&StorePath::parse("issues").expect("path"))
            .await
            .expect("read")
            .expect("issues written");
        let issues = stored.as_object().expect("issue map");
        assert_eq!(issues.len(), 1);
        assert!(issues.values().all(|issue| issue["status"] == "pending"));
    }
}
