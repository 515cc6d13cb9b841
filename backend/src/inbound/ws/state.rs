//! Shared WebSocket adapter state.

use std::sync::Arc;

use url::{Origin, Url};

use crate::domain::ports::{IssueRepository, SessionDirectory};

/// An allow-list entry that is not an absolute URL.
#[derive(Debug, thiserror::Error)]
#[error("invalid origin '{value}': {source}")]
pub struct InvalidOrigin {
    pub value: String,
    #[source]
    pub source: url::ParseError,
}

/// Origins permitted to open dashboard sockets, compared by scheme, host and
/// port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedOrigins(Vec<Origin>);

impl AllowedOrigins {
    /// Parse a list of origin URLs such as `https://clinic.example`.
    ///
    /// # Examples
    /// ```
    /// use carelink::inbound::ws::state::AllowedOrigins;
    /// use url::Url;
    ///
    /// let origins = AllowedOrigins::parse(["http://localhost:3000"]).expect("valid origins");
    /// assert!(origins.permits(&Url::parse("http://localhost:3000").expect("url")));
    /// assert!(!origins.permits(&Url::parse("http://localhost:4000").expect("url")));
    /// ```
    pub fn parse<'a>(raw: impl IntoIterator<Item = &'a str>) -> Result<Self, InvalidOrigin> {
        raw.into_iter()
            .map(|origin| {
                Url::parse(origin.trim())
                    .map(|url| url.origin())
                    .map_err(|source| InvalidOrigin {
                        value: origin.trim().to_owned(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn permits(&self, origin: &Url) -> bool {
        let origin = origin.origin();
        origin.is_tuple() && self.0.contains(&origin)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Dependency bundle for dashboard sockets.
#[derive(Clone)]
pub struct WsState {
    pub issues: Arc<dyn IssueRepository>,
    /// Shared with the HTTP adapter so sign-outs reach open dashboards.
    pub sessions: Arc<dyn SessionDirectory>,
    pub origins: AllowedOrigins,
}

impl WsState {
    pub fn new(
        issues: Arc<dyn IssueRepository>,
        sessions: Arc<dyn SessionDirectory>,
        origins: AllowedOrigins,
    ) -> Self {
        Self {
            issues,
            sessions,
            origins,
        }
    }
}
