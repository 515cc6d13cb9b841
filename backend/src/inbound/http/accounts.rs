//! Account API handlers.
//!
//! ```text
//! POST /api/v1/signup {"name":"Ada","email":"ada@example.org","password":"pw","confirmPassword":"pw","role":"patient"}
//! POST /api/v1/login {"email":"ada@example.org","password":"pw","role":"patient"}
//! POST /api/v1/logout
//! ```

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Identity, LoginCredentials, Role, SignUpRequest, SignedIn};
use crate::inbound::http::ApiResult;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

/// Sign-up request body for `POST /api/v1/signup`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpBody {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub role: String,
}

/// Login request body for `POST /api/v1/login`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    pub role: String,
}

/// Returned after sign-up and login: who signed in and where to go next.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedInResponse {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub redirect: String,
}

impl From<&SignedIn> for SignedInResponse {
    fn from(value: &SignedIn) -> Self {
        Self {
            user_id: value.user.id().to_string(),
            name: value.user.name().to_string(),
            email: value.user.email().to_string(),
            role: value.user.role(),
            redirect: value.route.path().to_owned(),
        }
    }
}

fn establish(
    state: &HttpState,
    session: &SessionContext,
    signed_in: &SignedIn,
) -> ApiResult<SignedInResponse> {
    let user = &signed_in.user;
    let identity = Identity::new(user.id().clone(), user.email().clone());
    if let Some(previous) = session.session_token()? {
        state.sessions.close(&previous);
    }
    let token = state.sessions.open(identity.clone());
    session.persist_identity(&identity, &token)?;
    Ok(SignedInResponse::from(signed_in))
}

/// Create an account, sign it in and point at the role's dashboard.
#[post("/signup")]
pub async fn signup(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<SignUpBody>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    let request = SignUpRequest::try_from_parts(
        &body.name,
        &body.email,
        &body.password,
        &body.confirm_password,
        &body.role,
    )?;
    let signed_in = state.accounts.sign_up(request).await?;
    let response = establish(&state, &session, &signed_in)?;
    Ok(HttpResponse::Created().json(response))
}

/// Authenticate and check the selected role against the stored one.
///
/// No session is established when the role does not match.
#[post("/login")]
pub async fn login(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<LoginBody>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    let credentials = LoginCredentials::try_from_parts(&body.email, &body.password, &body.role)?;
    let signed_in = state.accounts.log_in(credentials).await?;
    let response = establish(&state, &session, &signed_in)?;
    Ok(HttpResponse::Ok().json(response))
}

/// End the session everywhere: open dashboards redirect to sign-in and the
/// cookie stops being accepted.
#[post("/logout")]
pub async fn logout(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<HttpResponse> {
    if let Some(token) = session.session_token()? {
        state.sessions.close(&token);
    }
    if let Ok(Some(user_id)) = session.user_id() {
        info!(user_id = %user_id, "signed out");
    }
    session.purge();
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
#[path = "accounts_tests.rs"]
mod tests;
