//! Contact messages sent from the public contact form.
//!
//! Messages are appended under `contactMessages` with a server timestamp and,
//! when the sender is signed in, their user id.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::domain::ports::{RemoteStore, StorePath, server_timestamp};
use crate::domain::{Email, Error, UserId};

/// Collection holding contact messages.
pub const CONTACT_COLLECTION: &str = "contactMessages";

/// Fields of the contact form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    Name,
    Email,
    Subject,
    Message,
}

impl ContactField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Subject => "subject",
            Self::Message => "message",
        }
    }
}

/// Validation errors for the contact form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    EmptyField { field: ContactField },
    InvalidEmail,
}

impl fmt::Display for ContactValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyField { field } => write!(f, "{} must not be empty", field.as_str()),
            Self::InvalidEmail => write!(f, "email must look like name@domain"),
        }
    }
}

impl std::error::Error for ContactValidationError {}

impl From<ContactValidationError> for Error {
    fn from(value: ContactValidationError) -> Self {
        let (field, code) = match &value {
            ContactValidationError::EmptyField { field } => {
                (field.as_str(), format!("empty_{}", field.as_str()))
            }
            ContactValidationError::InvalidEmail => ("email", "invalid_email".to_owned()),
        };
        Self::invalid_request(value.to_string())
            .with_details(json!({ "field": field, "code": code }))
    }
}

/// Raw contact form input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDraft {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

/// A validated contact message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    name: String,
    email: Email,
    subject: String,
    message: String,
}

fn required(field: ContactField, raw: &str) -> Result<String, ContactValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ContactValidationError::EmptyField { field });
    }
    Ok(trimmed.to_owned())
}

impl ContactDraft {
    /// Check every field is present and the email is well formed.
    pub fn validate(self) -> Result<ContactMessage, ContactValidationError> {
        let name = required(ContactField::Name, &self.name)?;
        let email = required(ContactField::Email, &self.email)?;
        let subject = required(ContactField::Subject, &self.subject)?;
        let message = required(ContactField::Message, &self.message)?;
        let email = Email::new(email).map_err(|_| ContactValidationError::InvalidEmail)?;
        Ok(ContactMessage {
            name,
            email,
            subject,
            message,
        })
    }
}

impl ContactMessage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Appends contact messages to the remote store.
pub struct ContactService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> ContactService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S> ContactService<S>
where
    S: RemoteStore + ?Sized,
{
    /// Validate and store a message; returns the generated key.
    pub async fn submit(&self, draft: ContactDraft, sender: Option<&UserId>) -> Result<String, Error> {
        let message = draft.validate()?;
        let record = json!({
            "name": message.name(),
            "email": message.email().as_ref(),
            "subject": message.subject(),
            "message": message.message(),
            "userId": sender.map(UserId::as_ref),
            "timestamp": server_timestamp(),
        });
        let key = self
            .store
            .push(&StorePath::parse(CONTACT_COLLECTION)?, record)
            .await
            .map_err(|err| {
                warn!(error = %err, "contact message write failed");
                Error::from(err)
            })?;
        info!(message_id = %key, signed_in = sender.is_some(), "contact message stored");
        Ok(key)
    }
}
