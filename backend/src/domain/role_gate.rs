//! Role gate.
//!
//! Resolves the signed-in identity to a user record and decides whether the
//! mounted dashboard may render. Every resolution carries a generation
//! ticket; a lookup that completes after the identity changed again is
//! discarded, so a stale role can never admit a dashboard.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::ports::IssueRepository;
use crate::domain::{Error, ErrorCode, Identity, Role, User, UserId};

/// The two dashboard variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardKind {
    Patient,
    Doctor,
}

impl DashboardKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
        }
    }

    /// Role required to render this dashboard.
    #[must_use]
    pub const fn role(self) -> Role {
        match self {
            Self::Patient => Role::Patient,
            Self::Doctor => Role::Doctor,
        }
    }
}

impl fmt::Display for DashboardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DashboardKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "doctor" => Ok(Self::Doctor),
            other => Err(Error::not_found(format!("no dashboard named '{other}'"))),
        }
    }
}

/// Navigation targets the gate can redirect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Route {
    Home,
    SignIn,
    PatientDashboard,
    DoctorDashboard,
}

impl Route {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::SignIn => "/login",
            Self::PatientDashboard => "/patient-dashboard",
            Self::DoctorDashboard => "/doctor-dashboard",
        }
    }
}

/// Dashboard route for a role.
#[must_use]
pub const fn route_for(role: Role) -> Route {
    match role {
        Role::Patient => Route::PatientDashboard,
        Role::Doctor => Route::DoctorDashboard,
    }
}

/// Where the gate stands for the current identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Unknown,
    Resolving,
    Patient(User),
    Doctor(User),
    Unauthorized,
    SignedOut,
}

/// What the mounted dashboard must do.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Render for this user.
    Admit(User),
    /// Leave the dashboard without rendering issue content.
    Redirect(Route),
    /// The role lookup failed; show a banner and render nothing.
    Unavailable(Error),
}

/// Proof that a lookup belongs to the resolution that started it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveTicket {
    generation: u64,
    user_id: UserId,
}

impl ResolveTicket {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

/// Result of [`RoleGate::begin`].
#[derive(Debug, Clone, PartialEq)]
pub enum GateStep {
    /// Fetch this user and call [`RoleGate::complete`].
    Lookup(ResolveTicket),
    Decided(GateDecision),
}

#[derive(Debug, Clone)]
pub struct RoleGate {
    mounted: DashboardKind,
    state: GateState,
    generation: u64,
}

impl RoleGate {
    pub fn new(mounted: DashboardKind) -> Self {
        Self {
            mounted,
            state: GateState::Unknown,
            generation: 0,
        }
    }

    pub fn mounted(&self) -> DashboardKind {
        self.mounted
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// The admitted user, if the gate resolved to the mounted role.
    pub fn admitted(&self) -> Option<&User> {
        match (&self.state, self.mounted) {
            (GateState::Patient(user), DashboardKind::Patient)
            | (GateState::Doctor(user), DashboardKind::Doctor) => Some(user),
            _ => None,
        }
    }

    /// Start resolving `identity`. Invalidates any lookup still in flight.
    pub fn begin(&mut self, identity: Option<&Identity>) -> GateStep {
        self.generation += 1;
        match identity {
            None => {
                self.state = GateState::SignedOut;
                info!(dashboard = %self.mounted, "no identity, redirecting to sign-in");
                GateStep::Decided(GateDecision::Redirect(Route::SignIn))
            }
            Some(identity) => {
                self.state = GateState::Resolving;
                GateStep::Lookup(ResolveTicket {
                    generation: self.generation,
                    user_id: identity.user_id().clone(),
                })
            }
        }
    }

    /// Finish a lookup. Returns `None` when the ticket is stale.
    pub fn complete(
        &mut self,
        ticket: &ResolveTicket,
        result: Result<User, Error>,
    ) -> Option<GateDecision> {
        if ticket.generation != self.generation || self.state != GateState::Resolving {
            return None;
        }

        let decision = match result {
            Ok(user) => {
                let role = user.role();
                self.state = match role {
                    Role::Patient => GateState::Patient(user.clone()),
                    Role::Doctor => GateState::Doctor(user.clone()),
                };
                if role == self.mounted.role() {
                    GateDecision::Admit(user)
                } else {
                    GateDecision::Redirect(route_for(role))
                }
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                self.state = GateState::Unauthorized;
                GateDecision::Redirect(Route::SignIn)
            }
            Err(err) if err.code() == ErrorCode::Forbidden => {
                self.state = GateState::Unauthorized;
                GateDecision::Redirect(Route::Home)
            }
            Err(err) => {
                warn!(dashboard = %self.mounted, user_id = %ticket.user_id, error = %err, "role lookup failed");
                self.state = GateState::Unknown;
                GateDecision::Unavailable(err)
            }
        };

        match &decision {
            GateDecision::Admit(user) => {
                info!(dashboard = %self.mounted, user_id = %user.id(), "dashboard admitted");
            }
            GateDecision::Redirect(route) => {
                info!(dashboard = %self.mounted, user_id = %ticket.user_id, route = route.path(), "dashboard redirected");
            }
            GateDecision::Unavailable(_) => {}
        }
        Some(decision)
    }

    /// Resolve `identity` inline.
    pub async fn resolve(
        &mut self,
        repository: &dyn IssueRepository,
        identity: Option<&Identity>,
    ) -> GateDecision {
        match self.begin(identity) {
            GateStep::Decided(decision) => decision,
            GateStep::Lookup(ticket) => {
                let result = repository.get_user(ticket.user_id()).await;
                self.complete(&ticket, result).unwrap_or_else(|| {
                    GateDecision::Unavailable(Error::internal("role resolution was superseded"))
                })
            }
        }
    }
}
