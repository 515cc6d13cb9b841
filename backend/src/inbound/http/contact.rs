//! Contact form handler.
//!
//! ```text
//! POST /api/v1/contact {"name":"Ada","email":"ada@example.org","subject":"Hi","message":"..."}
//! ```

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::ContactDraft;
use crate::inbound::http::ApiResult;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactBody {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl From<ContactBody> for ContactDraft {
    fn from(value: ContactBody) -> Self {
        Self {
            name: value.name,
            email: value.email,
            subject: value.subject,
            message: value.message,
        }
    }
}

/// Store a contact message, tagged with the sender when signed in.
#[post("/contact")]
pub async fn submit_contact(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<ContactBody>,
) -> ApiResult<HttpResponse> {
    let sender = state.signed_in(&session)?;
    let id = state
        .contact
        .submit(
            payload.into_inner().into(),
            sender.as_ref().map(|identity| identity.user_id()),
        )
        .await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test as actix_test};
    use rstest::rstest;
    use serde_json::Value;

    use crate::domain::ports::{RemoteStore, StorePath};
    use crate::inbound::http::accounts::signup;
    use crate::inbound::http::test_utils::{in_memory_state, test_session_middleware};

    fn contact_body() -> Value {
        json!({
            "name": "Ada",
            "email": "ada@example.org",
            "subject": "Opening hours",
            "message": "When is the clinic open?",
        })
    }

    #[rstest]
    #[actix_web::test]
    async fn anonymous_message_is_stored_without_user() {
        let (state, store) = in_memory_state();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(test_session_middleware())
                .service(submit_contact),
        )
        .await;

        let request = actix_test::TestRequest::post()
            .uri("/contact")
            .set_json(contact_body())
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = actix_test::read_body_json(response).await;
        let id = body["id"].as_str().expect("generated id");
        let path = StorePath::parse(&format!("contactMessages/{id}")).expect("path");
        let stored = store.read(&path).await.expect("read").expect("stored");
        assert_eq!(stored["subject"], "Opening hours");
        assert!(stored.get("userId").is_none_or(Value::is_null));
        assert!(stored["timestamp"].is_i64());
    }

    #[rstest]
    #[actix_web::test]
    async fn signed_in_sender_is_recorded() {
        let (state, store) = in_memory_state();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(test_session_middleware())
                .service(signup)
                .service(submit_contact),
        )
        .await;

        let signup_request = actix_test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({
                "name": "Ada",
                "email": "ada@example.org",
                "password": "pw",
                "confirmPassword": "pw",
                "role": "patient",
            }))
            .to_request();
        let signed_up = actix_test::call_service(&app, signup_request).await;
        let cookie = signed_up
            .response()
            .cookies()
            .find(|cookie| cookie.name() == "session")
            .map(|cookie| cookie.into_owned())
            .expect("session cookie");
        let account: Value = actix_test::read_body_json(signed_up).await;

        let request = actix_test::TestRequest::post()
            .uri("/contact")
            .cookie(cookie)
            .set_json(contact_body())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, request).await;

        let path = StorePath::parse(&format!("contactMessages/{}", body["id"].as_str().expect("id")))
            .expect("path");
        let stored = store.read(&path).await.expect("read").expect("stored");
        assert_eq!(stored["userId"], account["userId"]);
    }

    #[rstest]
    #[actix_web::test]
    async fn blank_fields_are_rejected() {
        let (state, _store) = in_memory_state();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(test_session_middleware())
                .service(submit_contact),
        )
        .await;

        let mut body = contact_body();
        body["subject"] = json!("   ");
        let request = actix_test::TestRequest::post()
            .uri("/contact")
            .set_json(body)
            .to_request();
        let response = actix_test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value: Value = actix_test::read_body_json(response).await;
        assert_eq!(value["details"]["field"], "subject");
    }
}
