//! Filter/view projector.
//!
//! Derives the displayed subset of a reconciled issue set for the active
//! filter, in reconciliation order, and joins doctor views with patient
//! names resolved in per-tick batches.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{
    DisplayName, FeedStatus, Issue, IssueStatus, ReconciledIssues, User, UserId,
};

/// Label shown when a patient's user record is missing.
pub const UNKNOWN_PATIENT: &str = "Unknown Patient";

/// Status filter applied client-side to the reconciled set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueFilter {
    #[default]
    All,
    Pending,
    Responded,
}

impl IssueFilter {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Pending => "pending",
            Self::Responded => "responded",
        }
    }

    /// `true` for every issue under `All`, otherwise on status equality.
    pub fn matches(self, issue: &Issue) -> bool {
        match self {
            Self::All => true,
            Self::Pending => issue.status() == IssueStatus::Pending,
            Self::Responded => issue.status() == IssueStatus::Responded,
        }
    }
}

impl fmt::Display for IssueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown filter value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown issue filter '{0}'")]
pub struct UnknownFilter(pub String);

impl FromStr for IssueFilter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "pending" => Ok(Self::Pending),
            "responded" => Ok(Self::Responded),
            other => Err(UnknownFilter(other.to_owned())),
        }
    }
}

/// Lazily yield the reconciled issues matching `filter`, in order.
///
/// Restartable: call again after each reconciliation tick.
pub fn filtered(
    issues: &ReconciledIssues,
    filter: IssueFilter,
) -> impl Iterator<Item = &Issue> + '_ {
    issues.iter().filter(move |issue| filter.matches(issue))
}

/// Resolution state of one patient's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientName {
    /// Lookup not yet completed.
    Resolving,
    Known(DisplayName),
    /// No user record exists for the patient.
    Unknown,
}

impl PatientName {
    /// Text shown in place of the name, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Resolving => None,
            Self::Known(name) => Some(name.as_ref()),
            Self::Unknown => Some(UNKNOWN_PATIENT),
        }
    }
}

/// Patient names keyed by patient id, filled by batch lookups.
#[derive(Debug, Clone, Default)]
pub struct PatientNames {
    resolved: HashMap<UserId, PatientName>,
    in_flight: HashSet<UserId>,
}

impl PatientNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for `patient_id`; `Resolving` until a lookup lands.
    pub fn get(&self, patient_id: &UserId) -> PatientName {
        self.resolved
            .get(patient_id)
            .cloned()
            .unwrap_or(PatientName::Resolving)
    }

    /// Distinct patient ids among `issues` that are neither resolved nor
    /// already being looked up, in first-seen order.
    pub fn unresolved<'a>(&self, issues: impl IntoIterator<Item = &'a Issue>) -> Vec<UserId> {
        let mut seen = HashSet::new();
        issues
            .into_iter()
            .map(Issue::patient_id)
            .filter(|id| !self.resolved.contains_key(*id) && !self.in_flight.contains(*id))
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }

    /// Record that a batch lookup for `ids` has started.
    pub fn mark_in_flight(&mut self, ids: &[UserId]) {
        self.in_flight.extend(ids.iter().cloned());
    }

    /// Store a completed batch. Ids absent from `users` resolve to
    /// `Unknown`, as do ids mapped to `None`.
    pub fn record_batch(&mut self, ids: &[UserId], mut users: HashMap<UserId, Option<User>>) {
        for id in ids {
            self.in_flight.remove(id);
            let name = match users.remove(id).flatten() {
                Some(user) => PatientName::Known(user.name().clone()),
                None => PatientName::Unknown,
            };
            self.resolved.insert(id.clone(), name);
        }
    }

    /// Forget a failed batch so the next tick retries it.
    pub fn record_failure(&mut self, ids: &[UserId]) {
        for id in ids {
            self.in_flight.remove(id);
        }
    }

    /// Drop every cached name and pending lookup.
    pub fn clear(&mut self) {
        self.resolved.clear();
        self.in_flight.clear();
    }
}

/// One displayed issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedIssue {
    pub issue: Issue,
    /// Present on doctor views only.
    pub patient_name: Option<PatientName>,
}

/// Why a projection has no items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCondition {
    /// Nothing to show under the `all` filter.
    NoIssues,
    /// Nothing matches a narrowing filter.
    NoMatching(IssueFilter),
}

/// The displayed subset for one filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewProjection {
    pub filter: IssueFilter,
    pub items: Vec<ProjectedIssue>,
    /// Set only when `items` is empty and the feed has delivered.
    pub condition: Option<ViewCondition>,
}

impl ViewProjection {
    /// Project `issues` under `filter`. Passing `names` joins each item with
    /// its patient's name.
    pub fn project(
        issues: &ReconciledIssues,
        filter: IssueFilter,
        names: Option<&PatientNames>,
    ) -> Self {
        let items: Vec<ProjectedIssue> = filtered(issues, filter)
            .map(|issue| ProjectedIssue {
                issue: issue.clone(),
                patient_name: names.map(|names| names.get(issue.patient_id())),
            })
            .collect();

        let delivered = !matches!(issues.status(), FeedStatus::Loading);
        let condition = (delivered && items.is_empty()).then_some(match filter {
            IssueFilter::All => ViewCondition::NoIssues,
            narrowing => ViewCondition::NoMatching(narrowing),
        });

        Self {
            filter,
            items,
            condition,
        }
    }
}

#[cfg(test)]
#[path = "projector_tests.rs"]
mod tests;
