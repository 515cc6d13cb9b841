//! Dashboard socket payloads.
//!
//! Every frame is a JSON object tagged by `type`; field names are camelCase.
//! Client frames map onto dashboard commands, server frames onto dashboard
//! events.

use serde::{Deserialize, Serialize};

use crate::domain::{
    DashboardEvent, DashboardKind, DashboardView, Error, Issue, IssueFilter, IssueStatus, Notice,
    NoticeLevel, PatientName, ProjectedIssue, Response, ResponseForm, Route,
};

/// Commands a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    SetFilter {
        filter: IssueFilter,
    },
    SelectIssue {
        issue_id: String,
    },
    CancelResponse,
    SubmitResponse {
        diagnosis: String,
        prescription: String,
        #[serde(default)]
        advice: Option<String>,
    },
    SubmitIssue {
        title: String,
        description: String,
        symptoms: String,
        duration: String,
    },
    SignOut,
}

impl ClientFrame {
    /// Frame name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetFilter { .. } => "setFilter",
            Self::SelectIssue { .. } => "selectIssue",
            Self::CancelResponse => "cancelResponse",
            Self::SubmitResponse { .. } => "submitResponse",
            Self::SubmitIssue { .. } => "submitIssue",
            Self::SignOut => "signOut",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub diagnosis: String,
    pub prescription: String,
    /// `null` when the doctor gave no advice.
    pub advice: Option<String>,
    pub responded_at: i64,
    pub doctor_id: String,
}

impl From<&Response> for ResponsePayload {
    fn from(value: &Response) -> Self {
        Self {
            diagnosis: value.diagnosis().to_owned(),
            prescription: value.prescription().to_owned(),
            advice: value.advice().map(str::to_owned),
            responded_at: value.responded_at().timestamp_millis(),
            doctor_id: value.doctor_id().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePayload {
    pub id: String,
    pub patient_id: String,
    /// Doctor views only; `null` while the name is still resolving.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<Option<String>>,
    pub title: String,
    pub description: String,
    pub symptoms: String,
    pub duration: String,
    pub created_at: i64,
    pub status: IssueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponsePayload>,
}

fn name_label(name: &PatientName) -> Option<String> {
    name.label().map(str::to_owned)
}

impl IssuePayload {
    fn new(issue: &Issue, patient_name: Option<&PatientName>) -> Self {
        let details = issue.details();
        Self {
            id: issue.id().to_string(),
            patient_id: issue.patient_id().to_string(),
            patient_name: patient_name.map(name_label),
            title: details.title().to_owned(),
            description: details.description().to_owned(),
            symptoms: details.symptoms().to_owned(),
            duration: details.duration().to_owned(),
            created_at: issue.created_at().timestamp_millis(),
            status: issue.status(),
            response: issue.response().map(ResponsePayload::from),
        }
    }
}

impl From<&ProjectedIssue> for IssuePayload {
    fn from(value: &ProjectedIssue) -> Self {
        Self::new(&value.issue, value.patient_name.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFormPayload {
    pub issue: IssuePayload,
    pub submitting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ResponseForm> for ResponseFormPayload {
    fn from(value: &ResponseForm) -> Self {
        Self {
            issue: IssuePayload::new(&value.issue, Some(&value.patient_name)),
            submitting: value.submitting,
            error: value.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPayload {
    pub dashboard: DashboardKind,
    pub viewer: String,
    pub loading: bool,
    pub filter: IssueFilter,
    pub issues: Vec<IssuePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_form: Option<ResponseFormPayload>,
}

impl From<&DashboardView> for ViewPayload {
    fn from(value: &DashboardView) -> Self {
        Self {
            dashboard: value.kind,
            viewer: value.viewer.clone(),
            loading: value.loading,
            filter: value.projection.filter,
            issues: value.projection.items.iter().map(IssuePayload::from).collect(),
            empty_message: value.empty_message.clone(),
            banner: value.banner.clone(),
            response_form: value.response_form.as_ref().map(ResponseFormPayload::from),
        }
    }
}

/// Frames the server pushes to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    View(ViewPayload),
    Redirect { route: Route, path: &'static str },
    Notice { level: &'static str, message: String },
    Error(Error),
}

impl ServerFrame {
    pub fn redirect(route: Route) -> Self {
        Self::Redirect {
            route,
            path: route.path(),
        }
    }

    fn notice(notice: &Notice) -> Self {
        let level = match notice.level {
            NoticeLevel::Success => "success",
            NoticeLevel::Error => "error",
        };
        Self::Notice {
            level,
            message: notice.message.clone(),
        }
    }
}

impl From<&DashboardEvent> for ServerFrame {
    fn from(value: &DashboardEvent) -> Self {
        match value {
            DashboardEvent::View(view) => Self::View(ViewPayload::from(view)),
            DashboardEvent::Redirect(route) => Self::redirect(*route),
            DashboardEvent::Notice(notice) => Self::notice(notice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::{Value, json};

    #[rstest]
    #[case(json!({ "type": "setFilter", "filter": "pending" }), ClientFrame::SetFilter { filter: IssueFilter::Pending })]
    #[case(json!({ "type": "selectIssue", "issueId": "i1" }), ClientFrame::SelectIssue { issue_id: "i1".to_owned() })]
    #[case(json!({ "type": "cancelResponse" }), ClientFrame::CancelResponse)]
    #[case(json!({ "type": "signOut" }), ClientFrame::SignOut)]
    fn parses_client_frames(#[case] raw: Value, #[case] expected: ClientFrame) {
        let frame: ClientFrame = serde_json::from_value(raw).expect("frame parses");
        assert_eq!(frame, expected);
    }

    #[rstest]
    fn advice_is_optional_on_responses() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "type": "submitResponse",
            "diagnosis": "Flu",
            "prescription": "Rest",
        }))
        .expect("frame parses");
        assert_eq!(
            frame,
            ClientFrame::SubmitResponse {
                diagnosis: "Flu".to_owned(),
                prescription: "Rest".to_owned(),
                advice: None,
            }
        );
    }

    #[rstest]
    fn missing_advice_is_sent_as_null() {
        use crate::domain::test_fixtures::{PATIENT, responded};

        let issue = responded("i1", PATIENT, 1_000);
        let response = issue.response().expect("responded issue");
        let value = serde_json::to_value(ResponsePayload::from(response)).expect("serialises");

        assert_eq!(value["diagnosis"], "Flu");
        assert_eq!(value["prescription"], "Rest+fluids");
        assert_eq!(value.get("advice"), Some(&Value::Null));
    }

    #[rstest]
    #[case(json!({ "type": "deleteEverything" }))]
    #[case(json!({ "type": "setFilter", "filter": "archived" }))]
    #[case(json!({ "filter": "all" }))]
    fn rejects_unknown_frames(#[case] raw: Value) {
        assert!(serde_json::from_value::<ClientFrame>(raw).is_err());
    }

    #[rstest]
    fn redirect_frames_carry_the_path() {
        let value = serde_json::to_value(ServerFrame::redirect(Route::SignIn)).expect("serialises");
        assert_eq!(
            value,
            json!({ "type": "redirect", "route": "signIn", "path": "/login" })
        );
    }

    #[rstest]
    fn error_frames_inline_the_error() {
        let frame = ServerFrame::Error(Error::conflict("issue is no longer pending"));
        let value = serde_json::to_value(frame).expect("serialises");
        assert_eq!(
            value,
            json!({ "type": "error", "code": "conflict", "message": "issue is no longer pending" })
        );
    }

    #[rstest]
    fn notices_use_lowercase_levels() {
        let event = DashboardEvent::Notice(Notice {
            level: NoticeLevel::Success,
            message: "Response sent successfully!".to_owned(),
        });
        let value = serde_json::to_value(ServerFrame::from(&event)).expect("serialises");
        assert_eq!(value["level"], "success");
    }
}
