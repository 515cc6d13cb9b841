//! WebSocket inbound adapter hosting one live dashboard per connection.
//!
//! Responsibilities:
//! - validate upgrade requests (origin allow-list, dashboard name)
//! - attach to the cookie's server-side session, treating a signed-out token
//!   as no identity
//! - hand the socket to the per-connection dashboard loop

use std::sync::Arc;

use actix_web::web::{self, Payload};
use actix_web::{
    HttpRequest, HttpResponse, get,
    http::header::{HeaderValue, ORIGIN},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::DashboardKind;
use crate::domain::ports::{IdentityProvider, WatchedIdentity};
use crate::inbound::http::session::SessionContext;

mod session;

pub mod messages;
pub mod state;

use state::{AllowedOrigins, WsState};

/// Upgrade `GET /ws/dashboard/{patient|doctor}` to a dashboard socket.
#[get("/ws/dashboard/{kind}")]
pub async fn dashboard_entry(
    state: web::Data<WsState>,
    session: SessionContext,
    kind: web::Path<String>,
    req: HttpRequest,
    stream: Payload,
) -> actix_web::Result<HttpResponse> {
    let mut origin_iter = req.headers().get_all(ORIGIN);
    let origin_header = origin_iter.next().ok_or_else(|| {
        error!("Missing Origin header on WebSocket upgrade");
        actix_web::error::ErrorForbidden("Origin not allowed")
    })?;
    if origin_iter.next().is_some() {
        error!("Multiple Origin headers on WebSocket upgrade");
        return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
    }
    validate_origin(&state.origins, origin_header)?;

    let kind: DashboardKind = kind.parse()?;
    let identity: Arc<dyn IdentityProvider> = match session.session_token()? {
        Some(token) => match state.sessions.attach(&token) {
            Some(provider) => provider,
            None => {
                debug!("session token no longer signed in");
                Arc::new(WatchedIdentity::new(None))
            }
        },
        None => Arc::new(WatchedIdentity::new(None)),
    };
    let signed_in = identity.current_identity().is_some();

    let (response, ws_session, messages) = actix_ws::handle(&req, stream).map_err(|error| {
        error!(error = %error, "WebSocket upgrade failed");
        actix_web::error::ErrorInternalServerError("WebSocket upgrade failed")
    })?;
    info!(dashboard = %kind, signed_in, "dashboard socket opened");
    actix_web::rt::spawn(session::handle_dashboard_session(
        kind,
        state.issues.clone(),
        identity,
        ws_session,
        messages,
    ));
    Ok(response)
}

fn validate_origin(origins: &AllowedOrigins, origin_header: &HeaderValue) -> actix_web::Result<()> {
    let origin_value = match origin_header.to_str() {
        Ok(value) => value,
        Err(error) => {
            error!(error = %error, "Failed to parse Origin header as string");
            return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
        }
    };

    let origin = Url::parse(origin_value).map_err(|error| {
        error!(error = %error, "Failed to parse Origin header as URL");
        actix_web::error::ErrorBadRequest("Invalid Origin header")
    })?;

    if origins.permits(&origin) {
        Ok(())
    } else {
        warn!(
            origin = origin_value,
            "Rejected WS upgrade due to disallowed Origin"
        );
        Err(actix_web::error::ErrorForbidden("Origin not allowed"))
    }
}
