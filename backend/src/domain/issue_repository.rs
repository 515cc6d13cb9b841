//! Issue repository backed by the remote store.
//!
//! Records live at `issues/{id}` and `users/{uid}`. A response commit is a
//! single atomic update of `issues/{id}/response` and `issues/{id}/status`,
//! guarded by a precondition that the issue is still pending, so readers never
//! observe one half of the transition and two doctors cannot both respond.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::domain::ports::{
    AtomicUpdate, IssueRepository, IssueSubscription, RemoteStore, RemoteStoreError,
    StorePath, StoreQuery, SubmitResponseRequest, decode_issue, server_timestamp,
};
use crate::domain::{
    Error, IssueDraft, IssueId, IssueStatus, User, UserId, UserRecord, UserValidationError,
};

/// Collection holding issue records.
pub const ISSUES_COLLECTION: &str = "issues";
/// Collection holding user records.
pub const USERS_COLLECTION: &str = "users";

/// Message returned when a response targets an issue that already has one.
pub const ISSUE_NOT_PENDING_MESSAGE: &str = "issue is no longer pending";

fn store_failure(operation: &'static str, err: RemoteStoreError) -> Error {
    warn!(operation, error = %err, "remote store operation failed");
    err.into()
}

pub(crate) fn issue_path(id: &IssueId) -> Result<StorePath, Error> {
    Ok(StorePath::parse(ISSUES_COLLECTION)?.child(id)?)
}

pub(crate) fn user_path(id: &UserId) -> Result<StorePath, Error> {
    Ok(StorePath::parse(USERS_COLLECTION)?.child(id)?)
}

/// Decode a stored user record, distinguishing unsupported roles.
pub(crate) fn decode_user(id: &UserId, value: Value) -> Result<User, Error> {
    let record = serde_json::from_value::<UserRecord>(value)
        .map_err(|err| Error::internal(format!("malformed user record {id}: {err}")))?;
    User::from_record(id.clone(), record).map_err(|err| match err {
        UserValidationError::UnknownRole { role } => {
            Error::forbidden(format!("role '{role}' has no dashboard"))
                .with_details(json!({ "code": "unknown_role", "role": role }))
        }
        other => Error::internal(format!("invalid user record {id}: {other}")),
    })
}

/// [`IssueRepository`] implementation over any [`RemoteStore`].
#[derive(Clone)]
pub struct StoreIssueRepository<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> StoreIssueRepository<S> {
    /// Create a repository over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S> StoreIssueRepository<S>
where
    S: RemoteStore + ?Sized,
{
    async fn subscribe(&self, query: StoreQuery) -> Result<IssueSubscription, Error> {
        let subscription = self
            .store
            .subscribe(query)
            .await
            .map_err(|err| store_failure("subscribe", err))?;
        Ok(IssueSubscription::new(subscription))
    }
}

#[async_trait]
impl<S> IssueRepository for StoreIssueRepository<S>
where
    S: RemoteStore + ?Sized,
{
    async fn submit_issue(&self, patient_id: &UserId, draft: IssueDraft) -> Result<IssueId, Error> {
        let details = draft.validate()?;
        let record = json!({
            "patientId": patient_id.as_ref(),
            "title": details.title(),
            "description": details.description(),
            "symptoms": details.symptoms(),
            "duration": details.duration(),
            "timestamp": server_timestamp(),
            "status": IssueStatus::Pending.as_str(),
        });

        let key = self
            .store
            .push(&StorePath::parse(ISSUES_COLLECTION)?, record)
            .await
            .map_err(|err| store_failure("submit_issue", err))?;
        let id = IssueId::new(key)
            .map_err(|err| Error::internal(format!("store generated an invalid key: {err}")))?;

        info!(issue_id = %id, patient_id = %patient_id, "issue submitted");
        Ok(id)
    }

    async fn submit_response(&self, request: SubmitResponseRequest) -> Result<(), Error> {
        let SubmitResponseRequest {
            issue_id,
            patient_id,
            doctor_id,
            draft,
        } = request;
        let content = draft.validate()?;
        let path = issue_path(&issue_id)?;

        let stored = self
            .store
            .read(&path)
            .await
            .map_err(|err| store_failure("submit_response", err))?
            .ok_or_else(|| Error::not_found(format!("issue {issue_id} not found")))?;
        let issue = decode_issue(issue_id.to_string(), stored)
            .ok_or_else(|| Error::internal(format!("issue {issue_id} is undecodable")))?;
        if issue.patient_id() != &patient_id {
            return Err(Error::invalid_request(format!(
                "issue {issue_id} does not belong to patient {patient_id}"
            )));
        }
        if !issue.is_pending() {
            return Err(Error::conflict(ISSUE_NOT_PENDING_MESSAGE));
        }

        let mut response = Map::new();
        response.insert("diagnosis".to_owned(), json!(content.diagnosis()));
        response.insert("prescription".to_owned(), json!(content.prescription()));
        if let Some(advice) = content.advice() {
            response.insert("advice".to_owned(), json!(advice));
        }
        response.insert("timestamp".to_owned(), server_timestamp());
        response.insert("doctorId".to_owned(), json!(doctor_id.as_ref()));

        let update = AtomicUpdate::new()
            .set(path.child("response")?, Value::Object(response))
            .set(path.child("status")?, json!(IssueStatus::Responded.as_str()))
            .expect(path.child("status")?, json!(IssueStatus::Pending.as_str()))
            .expect(path.child("patientId")?, json!(patient_id.as_ref()));

        match self.store.update(update).await {
            Ok(()) => {
                info!(issue_id = %issue_id, patient_id = %patient_id, doctor_id = %doctor_id, "response committed");
                Ok(())
            }
            Err(RemoteStoreError::PreconditionFailed { path }) => {
                info!(issue_id = %issue_id, %path, "response rejected, issue already answered");
                Err(Error::conflict(ISSUE_NOT_PENDING_MESSAGE))
            }
            Err(err) => Err(store_failure("submit_response", err)),
        }
    }

    async fn subscribe_all(&self) -> Result<IssueSubscription, Error> {
        let subscription = self
            .subscribe(StoreQuery::Children {
                collection: StorePath::parse(ISSUES_COLLECTION)?,
            })
            .await?;
        info!(scope = "all", "issue subscription opened");
        Ok(subscription)
    }

    async fn subscribe_by_patient(&self, patient_id: &UserId) -> Result<IssueSubscription, Error> {
        let subscription = self
            .subscribe(StoreQuery::ChildEquals {
                collection: StorePath::parse(ISSUES_COLLECTION)?,
                child: "patientId".to_owned(),
                value: json!(patient_id.as_ref()),
            })
            .await?;
        info!(scope = "patient", patient_id = %patient_id, "issue subscription opened");
        Ok(subscription)
    }

    async fn get_user(&self, id: &UserId) -> Result<User, Error> {
        let value = self
            .store
            .read(&user_path(id)?)
            .await
            .map_err(|err| store_failure("get_user", err))?
            .ok_or_else(|| Error::not_found(format!("user {id} not found")))?;
        decode_user(id, value)
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<HashMap<UserId, Option<User>>, Error> {
        let unique: BTreeSet<&UserId> = ids.iter().collect();
        let reads = unique.into_iter().map(|id| async move {
            let value = self.store.read(&user_path(id)?).await?;
            Ok::<_, Error>((id.clone(), value))
        });

        let mut users = HashMap::new();
        for result in join_all(reads).await {
            let (id, value) = result.inspect_err(|err| {
                warn!(error = %err, "batch user lookup failed");
            })?;
            let user = value.and_then(|value| match decode_user(&id, value) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!(user_id = %id, error = %err, "treating unreadable user as unknown");
                    None
                }
            });
            users.insert(id, user);
        }
        Ok(users)
    }
}

#[cfg(test)]
#[path = "issue_repository_tests.rs"]
mod tests;
