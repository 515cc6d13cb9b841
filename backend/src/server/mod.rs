//! Server construction and middleware wiring.

mod config;
mod seed;
mod session_key;

pub use config::{ConfigError, OriginList, ServerConfig, ServerSettings};
pub use seed::{DEMO_DOCTOR_EMAIL, DEMO_PASSWORD, DEMO_PATIENT_EMAIL, seed_demo_data};
pub use session_key::{BuildMode, SESSION_KEY_MIN_LEN, SessionKeyError, load_session_key};

use std::sync::Arc;

use actix_session::{
    SessionMiddleware,
    config::{CookieContentSecurity, PersistentSession},
    storage::CookieSessionStore,
};
use actix_web::cookie::{Key, SameSite};
use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use mockable::DefaultClock;
use tracing::info;

use crate::domain::StoreIssueRepository;
use crate::domain::ports::{IssueRepository, RemoteStore, SessionDirectory};
use crate::inbound::http::accounts::{login, logout, signup};
use crate::inbound::http::contact::submit_contact;
use crate::inbound::http::error::json_error_handler;
use crate::inbound::http::health::{HealthState, live, ready};
use crate::inbound::http::request_log::RequestLog;
use crate::inbound::http::state::HttpState;
use crate::inbound::ws;
use crate::inbound::ws::state::{AllowedOrigins, WsState};
use crate::outbound::{InMemoryAccountDirectory, InMemorySessions, InMemoryStore};

/// Adapter state shared by every worker.
#[derive(Clone)]
pub struct AppDependencies {
    pub health_state: web::Data<HealthState>,
    pub http_state: web::Data<HttpState>,
    pub ws_state: web::Data<WsState>,
    pub key: Key,
    pub cookie_secure: bool,
    pub same_site: SameSite,
}

impl AppDependencies {
    /// Wire the in-memory adapters behind the HTTP and socket state.
    pub fn in_memory(
        health_state: web::Data<HealthState>,
        key: Key,
        origins: AllowedOrigins,
    ) -> (Self, Arc<dyn IssueRepository>) {
        let store: Arc<dyn RemoteStore> = Arc::new(InMemoryStore::new(Arc::new(DefaultClock)));
        let issues: Arc<dyn IssueRepository> = Arc::new(StoreIssueRepository::new(store.clone()));
        let sessions: Arc<dyn SessionDirectory> = Arc::new(InMemorySessions::new());
        let http_state =
            HttpState::new(Arc::new(InMemoryAccountDirectory::new()), sessions.clone(), store);
        let deps = Self {
            health_state,
            http_state: web::Data::new(http_state),
            ws_state: web::Data::new(WsState::new(issues.clone(), sessions, origins)),
            key,
            cookie_secure: true,
            same_site: SameSite::Lax,
        };
        (deps, issues)
    }
}

fn session_middleware(
    key: Key,
    cookie_secure: bool,
    same_site: SameSite,
) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("session".into())
        .cookie_path("/".into())
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .cookie_content_security(CookieContentSecurity::Private)
        .cookie_same_site(same_site)
        .session_lifecycle(
            PersistentSession::default().session_ttl(actix_web::cookie::time::Duration::hours(2)),
        )
        .build()
}

/// Assemble the application: REST under `/api/v1`, the dashboard socket and
/// the probes. The session middleware wraps everything so socket upgrades can
/// read the signed-in identity.
pub fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        ws_state,
        key,
        cookie_secure,
        same_site,
    } = deps;

    let api = web::scope("/api/v1")
        .service(signup)
        .service(login)
        .service(logout)
        .service(submit_contact);

    App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(ws_state)
        .app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .wrap(session_middleware(key, cookie_secure, same_site))
        .wrap(RequestLog)
        .service(api)
        .service(ws::dashboard_entry)
        .service(ready)
        .service(live)
}

/// Construct an Actix HTTP server using the provided health state and
/// configuration, seeding demo data first when asked.
///
/// # Errors
/// Propagates [`std::io::Error`] when seeding or binding the socket fails.
pub async fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let ServerConfig {
        key,
        cookie_secure,
        same_site,
        bind_addr,
        origins,
        seed_demo,
    } = config;
    let (mut deps, issues) = AppDependencies::in_memory(health_state.clone(), key, origins);
    deps.cookie_secure = cookie_secure;
    deps.same_site = same_site;

    if seed_demo {
        seed_demo_data(&deps.http_state, issues.as_ref())
            .await
            .map_err(|error| std::io::Error::other(format!("demo seeding failed: {error}")))?;
    }

    let server = HttpServer::new(move || build_app(deps.clone()))
        .bind(bind_addr)?
        .run();

    info!(addr = %bind_addr, "listening");
    health_state.mark_ready();
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::{StatusCode, header};
    use actix_web::test;
    use serde_json::{Value, json};

    fn app_deps() -> AppDependencies {
        let origins = AllowedOrigins::parse(["http://localhost:3000"]).expect("origins");
        let (mut deps, _) =
            AppDependencies::in_memory(web::Data::new(HealthState::new()), Key::generate(), origins);
        deps.cookie_secure = false;
        deps
    }

    #[actix_web::test]
    async fn api_routes_are_mounted_under_v1() {
        let app = test::init_service(build_app(app_deps())).await;
        let request = test::TestRequest::post()
            .uri("/api/v1/contact")
            .set_json(json!({
                "name": "Ada",
                "email": "ada@example.org",
                "subject": "Hours",
                "message": "When are you open?",
            }))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key("request-id"));
    }

    #[actix_web::test]
    async fn malformed_bodies_use_the_error_schema() {
        let app = test::init_service(build_app(app_deps())).await;
        let request = test::TestRequest::post()
            .uri("/api/v1/signup")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("[")
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["code"], "invalid_request");
    }

    #[actix_web::test]
    async fn readiness_follows_health_state() {
        let deps = app_deps();
        let health = deps.health_state.clone();
        let app = test::init_service(build_app(deps)).await;

        let before =
            test::call_service(&app, test::TestRequest::get().uri("/health/ready").to_request())
                .await;
        assert_eq!(before.status(), StatusCode::SERVICE_UNAVAILABLE);

        health.mark_ready();
        let after =
            test::call_service(&app, test::TestRequest::get().uri("/health/ready").to_request())
                .await;
        assert_eq!(after.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn socket_upgrades_from_unknown_origins_are_refused() {
        let app = test::init_service(build_app(app_deps())).await;
        let request = test::TestRequest::get()
            .uri("/ws/dashboard/patient")
            .insert_header((header::ORIGIN, "https://evil.example"))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
