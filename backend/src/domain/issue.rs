//! Health issues and doctor responses.
//!
//! An issue is created pending by a patient and mutated exactly once, when a
//! doctor's response is committed. The status is derived from the presence of
//! a response, so `response.is_none() <=> status == Pending` holds by
//! construction; decoding a stored record that disagrees is an error.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::{Error, UserId};

/// Characters the remote store refuses inside a key segment.
const FORBIDDEN_KEY_CHARS: [char; 6] = ['/', '.', '#', '$', '[', ']'];

/// Form fields validated before any write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueField {
    Title,
    Description,
    Symptoms,
    Duration,
    Diagnosis,
    Prescription,
}

impl IssueField {
    /// Wire name of the field, as submitted by clients.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Symptoms => "symptoms",
            Self::Duration => "duration",
            Self::Diagnosis => "diagnosis",
            Self::Prescription => "prescription",
        }
    }
}

/// Validation errors for issue input and stored issue records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueValidationError {
    /// A required form field was blank.
    EmptyField { field: IssueField },
    /// An issue key was empty or not a valid store key.
    InvalidId { id: String },
    /// A stored record referenced an invalid user id.
    InvalidUserId { id: String },
    /// A stored record carried an unrecognised status.
    UnknownStatus { status: String },
    /// A stored record's status disagrees with its response.
    InconsistentStatus { status: IssueStatus },
    /// A stored timestamp could not be represented.
    InvalidTimestamp { millis: i64 },
    /// A stored record was missing a required field.
    MissingField { field: IssueField },
}

impl fmt::Display for IssueValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyField { field } => write!(f, "{} must not be empty", field.as_str()),
            Self::InvalidId { id } => write!(f, "'{id}' is not a valid issue id"),
            Self::InvalidUserId { id } => write!(f, "'{id}' is not a valid user id"),
            Self::UnknownStatus { status } => write!(f, "unknown issue status '{status}'"),
            Self::InconsistentStatus { status } => {
                write!(f, "issue status '{status}' disagrees with its response")
            }
            Self::InvalidTimestamp { millis } => write!(f, "timestamp {millis} is out of range"),
            Self::MissingField { field } => {
                write!(f, "stored issue is missing {}", field.as_str())
            }
        }
    }
}

impl std::error::Error for IssueValidationError {}

impl From<IssueValidationError> for Error {
    fn from(value: IssueValidationError) -> Self {
        match value {
            IssueValidationError::EmptyField { field } => {
                let code = format!("empty_{}", field.as_str());
                Self::invalid_request(value.to_string())
                    .with_details(json!({ "field": field.as_str(), "code": code }))
            }
            IssueValidationError::InvalidId { .. } => Self::invalid_request(value.to_string()),
            other => Self::internal(format!("undecodable issue record: {other}")),
        }
    }
}

/// Store-assigned issue key. Assigned once at creation and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueId(String);

impl IssueId {
    /// Validate an issue key.
    pub fn new(id: impl Into<String>) -> Result<Self, IssueValidationError> {
        let id = id.into();
        if id.is_empty() || id.trim() != id || id.contains(FORBIDDEN_KEY_CHARS) {
            return Err(IssueValidationError::InvalidId { id });
        }
        Ok(Self(id))
    }
}

impl AsRef<str> for IssueId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl From<IssueId> for String {
    fn from(value: IssueId) -> Self {
        value.0
    }
}

impl TryFrom<String> for IssueId {
    type Error = IssueValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Lifecycle status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Pending,
    Responded,
}

impl IssueStatus {
    /// Wire representation stored in issue records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
        }
    }

    fn parse(raw: &str) -> Result<Self, IssueValidationError> {
        match raw {
            "pending" => Ok(Self::Pending),
            "responded" => Ok(Self::Responded),
            other => Err(IssueValidationError::UnknownStatus {
                status: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn required(value: String, field: IssueField) -> Result<String, IssueValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IssueValidationError::EmptyField { field });
    }
    Ok(trimmed.to_owned())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Raw issue form input submitted by a patient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IssueDraft {
    pub title: String,
    pub description: String,
    pub symptoms: String,
    pub duration: String,
}

impl IssueDraft {
    /// Validate every required field, reporting the first blank one in form
    /// order.
    pub fn validate(self) -> Result<IssueDetails, IssueValidationError> {
        let Self {
            title,
            description,
            symptoms,
            duration,
        } = self;
        Ok(IssueDetails {
            title: required(title, IssueField::Title)?,
            description: required(description, IssueField::Description)?,
            symptoms: required(symptoms, IssueField::Symptoms)?,
            duration: required(duration, IssueField::Duration)?,
        })
    }
}

/// Validated, immutable issue content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDetails {
    title: String,
    description: String,
    symptoms: String,
    duration: String,
}

impl IssueDetails {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn symptoms(&self) -> &str {
        &self.symptoms
    }

    pub fn duration(&self) -> &str {
        &self.duration
    }
}

/// Raw response form input submitted by a doctor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseDraft {
    pub diagnosis: String,
    pub prescription: String,
    #[serde(default)]
    pub advice: Option<String>,
}

impl ResponseDraft {
    /// Validate diagnosis and prescription; blank advice becomes `None`.
    pub fn validate(self) -> Result<ResponseContent, IssueValidationError> {
        let Self {
            diagnosis,
            prescription,
            advice,
        } = self;
        Ok(ResponseContent {
            diagnosis: required(diagnosis, IssueField::Diagnosis)?,
            prescription: required(prescription, IssueField::Prescription)?,
            advice: optional(advice),
        })
    }
}

/// Validated response content, prior to being committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseContent {
    diagnosis: String,
    prescription: String,
    advice: Option<String>,
}

impl ResponseContent {
    pub fn diagnosis(&self) -> &str {
        &self.diagnosis
    }

    pub fn prescription(&self) -> &str {
        &self.prescription
    }

    pub fn advice(&self) -> Option<&str> {
        self.advice.as_deref()
    }
}

/// A committed doctor response. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    content: ResponseContent,
    responded_at: DateTime<Utc>,
    doctor_id: UserId,
}

impl Response {
    pub fn new(content: ResponseContent, responded_at: DateTime<Utc>, doctor_id: UserId) -> Self {
        Self {
            content,
            responded_at,
            doctor_id,
        }
    }

    pub fn diagnosis(&self) -> &str {
        self.content.diagnosis()
    }

    pub fn prescription(&self) -> &str {
        self.content.prescription()
    }

    pub fn advice(&self) -> Option<&str> {
        self.content.advice()
    }

    pub fn responded_at(&self) -> DateTime<Utc> {
        self.responded_at
    }

    pub fn doctor_id(&self) -> &UserId {
        &self.doctor_id
    }
}

/// A patient's health issue.
///
/// ## Invariants
/// - `status()` is `Pending` exactly when `response()` is `None`.
/// - `patient_id`, `created_at` and `id` never change after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    id: IssueId,
    patient_id: UserId,
    details: IssueDetails,
    created_at: DateTime<Utc>,
    response: Option<Response>,
}

impl Issue {
    /// Assemble an issue from validated parts.
    pub fn new(
        id: IssueId,
        patient_id: UserId,
        details: IssueDetails,
        created_at: DateTime<Utc>,
        response: Option<Response>,
    ) -> Self {
        Self {
            id,
            patient_id,
            details,
            created_at,
            response,
        }
    }

    /// Decode a stored record keyed by `id`, enforcing the status/response
    /// invariant.
    pub fn from_record(id: IssueId, record: IssueRecord) -> Result<Self, IssueValidationError> {
        let IssueRecord {
            patient_id,
            title,
            description,
            symptoms,
            duration,
            timestamp,
            status,
            response,
        } = record;

        let status = IssueStatus::parse(&status)?;
        let response = response.map(decode_response).transpose()?;
        match (status, response.is_some()) {
            (IssueStatus::Pending, false) | (IssueStatus::Responded, true) => {}
            _ => return Err(IssueValidationError::InconsistentStatus { status }),
        }

        let details = IssueDraft {
            title,
            description,
            symptoms,
            duration,
        }
        .validate()
        .map_err(|err| match err {
            IssueValidationError::EmptyField { field } => {
                IssueValidationError::MissingField { field }
            }
            other => other,
        })?;

        Ok(Self {
            id,
            patient_id: decode_user_id(patient_id)?,
            details,
            created_at: decode_millis(timestamp)?,
            response,
        })
    }

    pub fn id(&self) -> &IssueId {
        &self.id
    }

    pub fn patient_id(&self) -> &UserId {
        &self.patient_id
    }

    pub fn details(&self) -> &IssueDetails {
        &self.details
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Derived lifecycle status.
    pub fn status(&self) -> IssueStatus {
        if self.response.is_some() {
            IssueStatus::Responded
        } else {
            IssueStatus::Pending
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == IssueStatus::Pending
    }
}

fn decode_user_id(raw: String) -> Result<UserId, IssueValidationError> {
    UserId::try_from(raw.clone()).map_err(|_| IssueValidationError::InvalidUserId { id: raw })
}

fn decode_millis(millis: i64) -> Result<DateTime<Utc>, IssueValidationError> {
    DateTime::from_timestamp_millis(millis).ok_or(IssueValidationError::InvalidTimestamp { millis })
}

fn decode_response(record: ResponseRecord) -> Result<Response, IssueValidationError> {
    let ResponseRecord {
        diagnosis,
        prescription,
        advice,
        timestamp,
        doctor_id,
    } = record;
    let content = ResponseDraft {
        diagnosis,
        prescription,
        advice,
    }
    .validate()
    .map_err(|err| match err {
        IssueValidationError::EmptyField { field } => IssueValidationError::MissingField { field },
        other => other,
    })?;
    Ok(Response::new(
        content,
        decode_millis(timestamp)?,
        decode_user_id(doctor_id)?,
    ))
}

/// Flat record stored at `issues/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    pub patient_id: String,
    pub title: String,
    pub description: String,
    pub symptoms: String,
    pub duration: String,
    /// Submission time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseRecord>,
}

/// Flat record stored at `issues/{id}/response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub diagnosis: String,
    pub prescription: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
    /// Commit time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub doctor_id: String,
}

#[cfg(test)]
#[path = "issue_tests.rs"]
mod tests;
