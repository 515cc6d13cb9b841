//! Authentication primitives: identities, login credentials and sign-up
//! requests.
//!
//! Inbound payload parsing stays outside the domain; these constructors
//! validate raw strings before a handler talks to a port or service.

use std::fmt;

use serde_json::json;
use zeroize::Zeroizing;

use crate::domain::{DisplayName, Email, Error, Role, UserId, UserValidationError};

/// Message shown when sign-up passwords differ.
pub const PASSWORD_MISMATCH_MESSAGE: &str = "Passwords do not match";

/// Domain error returned when authentication payload values are invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthValidationError {
    /// Password was blank.
    EmptyPassword,
    /// Sign-up password and confirmation differ.
    PasswordMismatch,
    /// Name, email or role failed user validation.
    User(UserValidationError),
}

impl fmt::Display for AuthValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPassword => write!(f, "password must not be empty"),
            Self::PasswordMismatch => f.write_str(PASSWORD_MISMATCH_MESSAGE),
            Self::User(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for AuthValidationError {}

impl From<UserValidationError> for AuthValidationError {
    fn from(value: UserValidationError) -> Self {
        Self::User(value)
    }
}

impl From<AuthValidationError> for Error {
    fn from(value: AuthValidationError) -> Self {
        let (field, code) = match &value {
            AuthValidationError::EmptyPassword => ("password", "empty_password"),
            AuthValidationError::PasswordMismatch => ("confirmPassword", "password_mismatch"),
            AuthValidationError::User(
                UserValidationError::EmptyDisplayName | UserValidationError::DisplayNameTooLong { .. },
            ) => ("name", "invalid_name"),
            AuthValidationError::User(
                UserValidationError::EmptyEmail | UserValidationError::InvalidEmail,
            ) => ("email", "invalid_email"),
            AuthValidationError::User(UserValidationError::UnknownRole { .. }) => {
                ("role", "invalid_role")
            }
            AuthValidationError::User(
                UserValidationError::EmptyId | UserValidationError::InvalidId,
            ) => ("id", "invalid_id"),
        };
        Self::invalid_request(value.to_string())
            .with_details(json!({ "field": field, "code": code }))
    }
}

/// An authenticated identity as reported by the authentication
/// collaborator. Carries no role; the role gate resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: UserId,
    email: Email,
}

impl Identity {
    pub fn new(user_id: UserId, email: Email) -> Self {
        Self { user_id, email }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn email(&self) -> &Email {
        &self.email
    }
}

fn password(raw: &str) -> Result<Zeroizing<String>, AuthValidationError> {
    if raw.is_empty() {
        return Err(AuthValidationError::EmptyPassword);
    }
    Ok(Zeroizing::new(raw.to_owned()))
}

/// Validated login credentials plus the role selected on the form.
///
/// ## Invariants
/// - `email` is normalised by [`Email`].
/// - `password` is non-empty and keeps caller-provided whitespace.
///
/// # Examples
/// ```
/// use carelink::domain::{LoginCredentials, Role};
///
/// let creds = LoginCredentials::try_from_parts("ada@example.org", "pw", "doctor").unwrap();
/// assert_eq!(creds.role(), Role::Doctor);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    email: Email,
    password: Zeroizing<String>,
    role: Role,
}

impl LoginCredentials {
    /// Construct credentials from raw form inputs.
    pub fn try_from_parts(email: &str, password: &str, role: &str) -> Result<Self, AuthValidationError> {
        Ok(Self {
            email: Email::new(email)?,
            password: self::password(password)?,
            role: role.parse()?,
        })
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }

    /// Role the user claims on the login form.
    pub fn role(&self) -> Role {
        self.role
    }
}

/// Validated sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpRequest {
    name: DisplayName,
    email: Email,
    password: Zeroizing<String>,
    role: Role,
}

impl SignUpRequest {
    /// Validate the raw sign-up form. The confirmation must equal the
    /// password exactly.
    pub fn try_from_parts(
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
        role: &str,
    ) -> Result<Self, AuthValidationError> {
        let name = DisplayName::new(name)?;
        let email = Email::new(email)?;
        let password = self::password(password)?;
        if password.as_str() != confirm_password {
            return Err(AuthValidationError::PasswordMismatch);
        }
        Ok(Self {
            name,
            email,
            password,
            role: role.parse()?,
        })
    }

    pub fn name(&self) -> &DisplayName {
        &self.name
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }

    pub fn role(&self) -> Role {
        self.role
    }
}
