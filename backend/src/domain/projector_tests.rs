//! Tests for the filter/view projector.

use super::*;
use crate::domain::ports::IssueFeedEvent;
use crate::domain::test_fixtures::{OTHER_PATIENT, PATIENT, pending, responded, user_id};
use crate::domain::{Email, Error, Role};
use rstest::{fixture, rstest};

#[fixture]
fn reconciled() -> ReconciledIssues {
    let mut set = ReconciledIssues::new();
    set.apply(IssueFeedEvent::Snapshot(vec![
        pending("a", PATIENT, 1_000),
        responded("b", OTHER_PATIENT, 2_000),
        pending("c", OTHER_PATIENT, 3_000),
    ]));
    set
}

fn ids(projection: &ViewProjection) -> Vec<String> {
    projection
        .items
        .iter()
        .map(|item| item.issue.id().to_string())
        .collect()
}

fn patient(raw: &str, name: &str) -> User {
    User::new(
        user_id(raw),
        DisplayName::new(name).expect("valid name"),
        Email::new("p@example.org").expect("valid email"),
        Role::Patient,
    )
}

#[rstest]
#[case(IssueFilter::All, &["c", "b", "a"])]
#[case(IssueFilter::Pending, &["c", "a"])]
#[case(IssueFilter::Responded, &["b"])]
fn projects_matching_issues_in_order(
    reconciled: ReconciledIssues,
    #[case] filter: IssueFilter,
    #[case] expected: &[&str],
) {
    let projection = ViewProjection::project(&reconciled, filter, None);
    assert_eq!(ids(&projection), expected);
    assert!(projection.condition.is_none());
    assert!(projection.items.iter().all(|item| item.patient_name.is_none()));
}

#[rstest]
fn filtered_iterator_is_restartable(reconciled: ReconciledIssues) {
    let first: Vec<_> = filtered(&reconciled, IssueFilter::Pending).collect();
    let second: Vec<_> = filtered(&reconciled, IssueFilter::Pending).collect();
    assert_eq!(first, second);
}

#[rstest]
#[case(IssueFilter::All, Some(ViewCondition::NoIssues))]
#[case(IssueFilter::Pending, Some(ViewCondition::NoMatching(IssueFilter::Pending)))]
fn empty_feed_conditions_are_distinct(
    #[case] filter: IssueFilter,
    #[case] expected: Option<ViewCondition>,
) {
    let mut set = ReconciledIssues::new();
    set.apply(IssueFeedEvent::Snapshot(Vec::new()));
    assert_eq!(ViewProjection::project(&set, filter, None).condition, expected);
}

#[rstest]
fn loading_feed_has_no_condition() {
    let set = ReconciledIssues::new();
    assert_eq!(
        ViewProjection::project(&set, IssueFilter::All, None).condition,
        None
    );
}

#[rstest]
fn failed_empty_feed_still_reports_condition() {
    let mut set = ReconciledIssues::new();
    set.apply(IssueFeedEvent::Failed(Error::service_unavailable("offline")));
    assert_eq!(
        ViewProjection::project(&set, IssueFilter::All, None).condition,
        Some(ViewCondition::NoIssues)
    );
}

#[rstest]
fn filter_narrowing_to_nothing_reports_filter(mut reconciled: ReconciledIssues) {
    reconciled.apply(IssueFeedEvent::Snapshot(vec![pending("a", PATIENT, 1_000)]));
    let projection = ViewProjection::project(&reconciled, IssueFilter::Responded, None);
    assert_eq!(
        projection.condition,
        Some(ViewCondition::NoMatching(IssueFilter::Responded))
    );
}

#[rstest]
fn unresolved_ids_are_distinct_and_skip_in_flight(reconciled: ReconciledIssues) {
    let mut names = PatientNames::new();
    let batch = names.unresolved(reconciled.iter());
    assert_eq!(batch, [user_id(OTHER_PATIENT), user_id(PATIENT)]);

    names.mark_in_flight(&batch);
    assert!(names.unresolved(reconciled.iter()).is_empty());

    names.record_failure(&batch);
    assert_eq!(names.unresolved(reconciled.iter()).len(), 2);
}

#[rstest]
fn batch_results_resolve_names_by_key(reconciled: ReconciledIssues) {
    let mut names = PatientNames::new();
    let batch = names.unresolved(reconciled.iter());
    names.mark_in_flight(&batch);

    let mut users = HashMap::new();
    users.insert(user_id(PATIENT), Some(patient(PATIENT, "Pat")));
    users.insert(user_id(OTHER_PATIENT), None);
    names.record_batch(&batch, users);

    let projection = ViewProjection::project(&reconciled, IssueFilter::All, Some(&names));
    let labels: Vec<Option<&str>> = projection
        .items
        .iter()
        .map(|item| item.patient_name.as_ref().and_then(PatientName::label))
        .collect();
    assert_eq!(labels, [Some(UNKNOWN_PATIENT), Some(UNKNOWN_PATIENT), Some("Pat")]);
}

#[rstest]
fn late_names_reach_only_their_patient_on_reprojection(reconciled: ReconciledIssues) {
    let mut names = PatientNames::new();
    let batch = names.unresolved(reconciled.iter());
    names.mark_in_flight(&batch);
    let before = ViewProjection::project(&reconciled, IssueFilter::All, Some(&names));
    assert!(
        before
            .items
            .iter()
            .all(|item| item.patient_name == Some(PatientName::Resolving))
    );

    let mut users = HashMap::new();
    users.insert(user_id(PATIENT), Some(patient(PATIENT, "Pat")));
    names.record_batch(&[user_id(PATIENT)], users);
    let after = ViewProjection::project(&reconciled, IssueFilter::All, Some(&names));

    let name_of = |id: &str| {
        after
            .items
            .iter()
            .find(|item| item.issue.id().as_ref() == id)
            .and_then(|item| item.patient_name.clone())
            .expect("projected with a name")
    };
    assert_eq!(name_of("a").label(), Some("Pat"));
    assert_eq!(name_of("c"), PatientName::Resolving);
}

#[rstest]
#[case("all", IssueFilter::All)]
#[case("pending", IssueFilter::Pending)]
#[case("responded", IssueFilter::Responded)]
fn parses_filters(#[case] raw: &str, #[case] expected: IssueFilter) {
    assert_eq!(raw.parse::<IssueFilter>().expect("known filter"), expected);
    assert_eq!(expected.to_string(), raw);
}

#[rstest]
fn rejects_unknown_filters() {
    assert_eq!(
        "archived".parse::<IssueFilter>(),
        Err(UnknownFilter("archived".to_owned()))
    );
}
