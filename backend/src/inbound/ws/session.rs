//! Per-connection dashboard loop.
//!
//! Multiplexes three sources: the heartbeat timer, client frames, and the
//! dashboard's own wake-ups (identity changes, feed notifications, name
//! lookups, commit results). The public contract pings every 5s and
//! considers a connection idle after 10s without client traffic; tests
//! shorten both. Whatever ends the loop, the dashboard is torn down before
//! the socket closes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_ws::{CloseCode, CloseReason, Closed, Message, MessageStream, ProtocolError, Session};
use tokio::time;
use tracing::{debug, warn};

use crate::domain::ports::{IdentityProvider, IssueRepository};
use crate::domain::{
    Dashboard, DashboardKind, Error, ErrorCode, IssueDraft, IssueId, ResponseDraft,
    Route, Wake,
};
use crate::inbound::ws::messages::{ClientFrame, ServerFrame};

/// Time between heartbeats to the client (5s in production, shorter in tests).
#[cfg(not(test))]
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
#[cfg(test)]
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

/// Max idle time before disconnecting the client (10s in production, shorter in tests).
#[cfg(not(test))]
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
#[cfg(test)]
const CLIENT_TIMEOUT: Duration = Duration::from_millis(100);

pub(super) async fn handle_dashboard_session(
    kind: DashboardKind,
    issues: Arc<dyn IssueRepository>,
    identity: Arc<dyn IdentityProvider>,
    session: Session,
    stream: MessageStream,
) {
    let dashboard = Dashboard::mount(kind, issues, identity).await;
    DashboardSession { dashboard }.run(session, stream).await;
}

enum SessionError {
    ClientClosed(Option<CloseReason>),
    StreamClosed,
    HeartbeatTimeout,
    Protocol(ProtocolError),
    InvalidPayload,
    Network(Closed),
    Redirected,
}

enum CloseAction {
    None,
    Close(Option<CloseReason>),
}

enum Step {
    Heartbeat,
    Client(Option<Result<Message, ProtocolError>>),
    Wake(Wake),
}

/// Where an authorization failure sends the client.
fn redirect_for(error: &Error) -> Route {
    match error.code() {
        ErrorCode::Unauthorized => Route::SignIn,
        _ => Route::Home,
    }
}

struct DashboardSession {
    dashboard: Dashboard,
}

impl DashboardSession {
    async fn run(mut self, mut session: Session, mut stream: MessageStream) {
        let mut last_heartbeat = Instant::now();
        let mut heartbeat = time::interval(HEARTBEAT_INTERVAL);

        let error = loop {
            if let Err(error) = self.flush(&mut session).await {
                break error;
            }
            if self.dashboard.is_torn_down() {
                break SessionError::Redirected;
            }

            let step = tokio::select! {
                _ = heartbeat.tick() => Step::Heartbeat,
                message = stream.recv() => Step::Client(message),
                wake = self.dashboard.wake() => Step::Wake(wake),
            };
            let result = match step {
                Step::Heartbeat => self.handle_heartbeat_tick(&mut session, &last_heartbeat).await,
                Step::Client(message) => {
                    self.handle_stream_message(&mut session, &mut last_heartbeat, message)
                        .await
                }
                Step::Wake(wake) => {
                    self.dashboard.handle_wake(wake).await;
                    Ok(())
                }
            };
            if let Err(error) = result {
                break error;
            }
        };

        self.dashboard.teardown();
        self.log_shutdown_reason(&error);
        let close_action = self.close_action_for(&error);
        self.close_session_if_needed(session, close_action).await;
    }

    /// Send every queued dashboard event, in order.
    async fn flush(&mut self, session: &mut Session) -> Result<(), SessionError> {
        for event in self.dashboard.drain_events() {
            self.send_json(session, &ServerFrame::from(&event))
                .await
                .map_err(SessionError::Network)?;
        }
        Ok(())
    }

    async fn handle_heartbeat_tick(
        &self,
        session: &mut Session,
        last_heartbeat: &Instant,
    ) -> Result<(), SessionError> {
        if Instant::now().duration_since(*last_heartbeat) > CLIENT_TIMEOUT {
            return Err(SessionError::HeartbeatTimeout);
        }

        session.ping(b"").await.map_err(SessionError::Network)
    }

    async fn handle_stream_message(
        &mut self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Option<Result<Message, ProtocolError>>,
    ) -> Result<(), SessionError> {
        let Some(message) = message else {
            return Err(SessionError::StreamClosed);
        };

        match message {
            Ok(message) => self.handle_message(session, last_heartbeat, message).await,
            Err(error) => Err(SessionError::Protocol(error)),
        }
    }

    async fn handle_message(
        &mut self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Message,
    ) -> Result<(), SessionError> {
        match message {
            Message::Ping(payload) => {
                *last_heartbeat = Instant::now();
                session
                    .pong(&payload)
                    .await
                    .map_err(SessionError::Network)?;
                Ok(())
            }
            Message::Text(text) => {
                *last_heartbeat = Instant::now();
                self.handle_text_message(session, text.as_ref()).await
            }
            Message::Pong(_) | Message::Binary(_) | Message::Continuation(_) | Message::Nop => {
                *last_heartbeat = Instant::now();
                Ok(())
            }
            Message::Close(reason) => Err(SessionError::ClientClosed(reason)),
        }
    }

    async fn handle_text_message(
        &mut self,
        session: &mut Session,
        text: &str,
    ) -> Result<(), SessionError> {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(error = %error, "Rejected malformed WebSocket payload");
                return Err(SessionError::InvalidPayload);
            }
        };

        let name = frame.name();
        debug!(dashboard = %self.dashboard.kind(), frame = name, "client command");
        let Err(error) = self.apply(frame).await else {
            return Ok(());
        };
        if error.code().is_authorization() {
            warn!(dashboard = %self.dashboard.kind(), frame = name, error = %error, "command refused; redirecting");
            self.flush(session).await?;
            self.send_json(session, &ServerFrame::redirect(redirect_for(&error)))
                .await
                .map_err(SessionError::Network)?;
            return Err(SessionError::Redirected);
        }
        debug!(frame = name, error = %error, "command failed");
        self.send_json(session, &ServerFrame::Error(error))
            .await
            .map_err(SessionError::Network)
    }

    async fn apply(&mut self, frame: ClientFrame) -> Result<(), Error> {
        match frame {
            ClientFrame::SetFilter { filter } => self.dashboard.set_filter(filter),
            ClientFrame::SelectIssue { issue_id } => {
                self.dashboard.select_issue(&IssueId::new(issue_id)?)?;
            }
            ClientFrame::CancelResponse => self.dashboard.cancel_response()?,
            ClientFrame::SubmitResponse {
                diagnosis,
                prescription,
                advice,
            } => self.dashboard.submit_response(ResponseDraft {
                diagnosis,
                prescription,
                advice,
            })?,
            ClientFrame::SubmitIssue {
                title,
                description,
                symptoms,
                duration,
            } => {
                self.dashboard
                    .submit_issue(IssueDraft {
                        title,
                        description,
                        symptoms,
                        duration,
                    })
                    .await?;
            }
            ClientFrame::SignOut => self.dashboard.sign_out().await?,
        }
        Ok(())
    }

    async fn send_json<T: serde::Serialize>(
        &self,
        session: &mut Session,
        payload: &T,
    ) -> Result<(), Closed> {
        match serde_json::to_string(payload) {
            Ok(body) => session.text(body).await,
            Err(error) => {
                warn!(error = %error, "Failed to serialize WebSocket payload");
                Ok(())
            }
        }
    }

    fn log_shutdown_reason(&self, error: &SessionError) {
        let dashboard = self.dashboard.kind();
        match error {
            SessionError::HeartbeatTimeout => {
                warn!(dashboard = %dashboard, "WebSocket heartbeat timeout; closing connection");
            }
            SessionError::Protocol(error) => {
                warn!(dashboard = %dashboard, error = %error, "WebSocket protocol error");
            }
            SessionError::Network(error) => {
                warn!(dashboard = %dashboard, error = %error, "WebSocket send failed; closing connection");
            }
            SessionError::InvalidPayload
            | SessionError::ClientClosed(_)
            | SessionError::StreamClosed
            | SessionError::Redirected => {
                debug!(dashboard = %dashboard, "dashboard socket closed");
            }
        }
    }

    fn close_action_for(&self, error: &SessionError) -> CloseAction {
        match error {
            SessionError::HeartbeatTimeout => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Normal,
                description: Some("heartbeat timeout".to_owned()),
            })),
            SessionError::Redirected => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Normal,
                description: Some("redirect".to_owned()),
            })),
            SessionError::Protocol(_) => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Protocol,
                description: Some("protocol error".to_owned()),
            })),
            SessionError::InvalidPayload => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Policy,
                description: Some("invalid payload".to_owned()),
            })),
            SessionError::ClientClosed(reason) => CloseAction::Close(reason.clone()),
            SessionError::StreamClosed | SessionError::Network(_) => CloseAction::None,
        }
    }

    async fn close_session_if_needed(&self, session: Session, close_action: CloseAction) {
        if let CloseAction::Close(reason) = close_action {
            if let Err(error) = session.close(reason).await {
                warn!(error = %error, "Failed to close WebSocket session");
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
