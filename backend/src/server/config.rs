//! Server settings loaded via OrthoConfig and the runtime configuration
//! derived from them.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use actix_web::cookie::{Key, SameSite};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::session_key::{BuildMode, SessionKeyError, load_session_key};
use crate::inbound::ws::state::{AllowedOrigins, InvalidOrigin};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_KEY_PATH: &str = "/var/run/secrets/session_key";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

/// Origin allow-list as written in configuration. A comma-separated
/// environment value arrives as a list; a single origin as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OriginList {
    Many(Vec<String>),
    One(String),
}

impl OriginList {
    fn entries(&self) -> impl Iterator<Item = &str> {
        let entries: Vec<&str> = match self {
            Self::Many(values) => values.iter().map(String::as_str).collect(),
            Self::One(value) => value.split(',').collect(),
        };
        entries.into_iter().filter(|entry| !entry.trim().is_empty())
    }
}

/// Process settings, read from CLI flags, `CARELINK_*` environment variables
/// and configuration files.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "CARELINK")]
pub struct ServerSettings {
    /// Address to bind; defaults to all interfaces.
    pub host: Option<IpAddr>,
    /// Port to bind; defaults to 8080.
    pub port: Option<u16>,
    /// File holding the cookie signing key material.
    pub session_key_file: Option<PathBuf>,
    /// Mark session cookies `Secure`; on unless set to `false`.
    pub cookie_secure: Option<bool>,
    /// Fall back to a generated session key when the key file is unreadable.
    #[ortho_config(default = false)]
    pub allow_ephemeral_session_key: bool,
    /// Origins allowed to open dashboard sockets, comma-separated in the
    /// environment.
    #[ortho_config(skip_cli)]
    pub allowed_origins: Option<OriginList>,
    /// Create a demo patient, doctor and issue at startup.
    #[ortho_config(default = false)]
    pub seed_demo: bool,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.host.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            self.port.unwrap_or(DEFAULT_PORT),
        )
    }

    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure.unwrap_or(true)
    }

    pub fn session_key_path(&self) -> PathBuf {
        self.session_key_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_KEY_PATH))
    }

    /// Parse the socket origin allow-list.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidOrigin`] naming the first entry that is
    /// not an absolute URL.
    pub fn allowed_origins(&self) -> Result<AllowedOrigins, ConfigError> {
        let origins = match &self.allowed_origins {
            Some(list) => AllowedOrigins::parse(list.entries())?,
            None => AllowedOrigins::parse([DEFAULT_ALLOWED_ORIGINS])?,
        };
        Ok(origins)
    }
}

/// Errors raised while turning settings into a runnable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    SessionKey(#[from] SessionKeyError),
    #[error(transparent)]
    InvalidOrigin(#[from] InvalidOrigin),
}

/// Everything `create_server` needs, resolved and validated.
pub struct ServerConfig {
    pub(crate) key: Key,
    pub(crate) cookie_secure: bool,
    pub(crate) same_site: SameSite,
    pub(crate) bind_addr: SocketAddr,
    pub(crate) origins: AllowedOrigins,
    pub(crate) seed_demo: bool,
}

impl ServerConfig {
    /// Resolve the session key and origin list from `settings`.
    ///
    /// # Errors
    /// Fails when the session key cannot be loaded under `mode` or an origin
    /// does not parse.
    pub fn from_settings(settings: &ServerSettings, mode: BuildMode) -> Result<Self, ConfigError> {
        let key = load_session_key(
            &settings.session_key_path(),
            mode,
            settings.allow_ephemeral_session_key,
        )?;
        Ok(Self {
            key,
            cookie_secure: settings.cookie_secure(),
            same_site: SameSite::Lax,
            bind_addr: settings.bind_addr(),
            origins: settings.allowed_origins()?,
            seed_demo: settings.seed_demo,
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

#[cfg(test)]
mod tests {
    //! Settings parsing and resolution.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;
    use url::Url;

    const VARS: [&str; 7] = [
        "CARELINK_HOST",
        "CARELINK_PORT",
        "CARELINK_SESSION_KEY_FILE",
        "CARELINK_COOKIE_SECURE",
        "CARELINK_ALLOW_EPHEMERAL_SESSION_KEY",
        "CARELINK_ALLOWED_ORIGINS",
        "CARELINK_SEED_DEMO",
    ];

    fn load_from_empty_args() -> ServerSettings {
        ServerSettings::load_from_iter([OsString::from("carelink")]).expect("config should load")
    }

    fn cleared_with(overrides: &[(&'static str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    #[rstest]
    fn defaults_apply_when_nothing_is_set() {
        let _guard = lock_env(cleared_with(&[]));

        let settings = load_from_empty_args();
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080".parse().expect("addr"));
        assert_eq!(
            settings.session_key_path(),
            PathBuf::from(DEFAULT_SESSION_KEY_PATH)
        );
        assert!(settings.cookie_secure());
        assert!(!settings.allow_ephemeral_session_key);
        assert!(!settings.seed_demo);
        let origins = settings.allowed_origins().expect("default origins");
        assert!(origins.permits(&Url::parse("http://localhost:3000").expect("url")));
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(cleared_with(&[
            ("CARELINK_HOST", "127.0.0.1"),
            ("CARELINK_PORT", "9090"),
            ("CARELINK_SESSION_KEY_FILE", "/tmp/carelink_key"),
            ("CARELINK_COOKIE_SECURE", "false"),
            ("CARELINK_SEED_DEMO", "true"),
            (
                "CARELINK_ALLOWED_ORIGINS",
                "https://clinic.example, https://staff.clinic.example",
            ),
        ]));

        let settings = load_from_empty_args();
        assert_eq!(settings.bind_addr(), "127.0.0.1:9090".parse().expect("addr"));
        assert_eq!(settings.session_key_path(), PathBuf::from("/tmp/carelink_key"));
        assert!(!settings.cookie_secure());
        assert!(settings.seed_demo);
        let origins = settings.allowed_origins().expect("origins");
        assert!(origins.permits(&Url::parse("https://clinic.example").expect("url")));
        assert!(origins.permits(&Url::parse("https://staff.clinic.example").expect("url")));
        assert!(!origins.permits(&Url::parse("http://localhost:3000").expect("url")));
    }

    #[rstest]
    fn a_single_origin_is_accepted() {
        let _guard = lock_env(cleared_with(&[(
            "CARELINK_ALLOWED_ORIGINS",
            "https://clinic.example",
        )]));

        let settings = load_from_empty_args();
        let origins = settings.allowed_origins().expect("origins");
        assert!(origins.permits(&Url::parse("https://clinic.example").expect("url")));
        assert!(!origins.permits(&Url::parse("http://localhost:3000").expect("url")));
    }

    #[rstest]
    fn cookies_stay_secure_when_only_other_settings_change() {
        let _guard = lock_env(cleared_with(&[("CARELINK_SEED_DEMO", "true")]));

        let settings = load_from_empty_args();
        assert_eq!(settings.cookie_secure, None);
        assert!(settings.cookie_secure());
    }

    #[rstest]
    fn malformed_origins_are_reported() {
        let _guard = lock_env(cleared_with(&[(
            "CARELINK_ALLOWED_ORIGINS",
            "https://clinic.example,not an origin",
        )]));

        let settings = load_from_empty_args();
        let error = settings.allowed_origins().expect_err("origin rejected");
        assert!(matches!(
            error,
            ConfigError::InvalidOrigin(InvalidOrigin { ref value, .. }) if value == "not an origin"
        ));
    }

    #[rstest]
    fn release_builds_refuse_a_missing_key() {
        let _guard = lock_env(cleared_with(&[(
            "CARELINK_SESSION_KEY_FILE",
            "/nonexistent/carelink_key",
        )]));

        let settings = load_from_empty_args();
        let result = ServerConfig::from_settings(&settings, BuildMode::Release);
        assert!(matches!(
            result,
            Err(ConfigError::SessionKey(SessionKeyError::KeyRead { .. }))
        ));
    }

    #[rstest]
    fn debug_builds_fall_back_to_an_ephemeral_key() {
        let _guard = lock_env(cleared_with(&[
            ("CARELINK_SESSION_KEY_FILE", "/nonexistent/carelink_key"),
            ("CARELINK_PORT", "3001"),
        ]));

        let settings = load_from_empty_args();
        let config = ServerConfig::from_settings(&settings, BuildMode::Debug).expect("config");
        assert_eq!(config.bind_addr().port(), 3001);
        assert!(config.cookie_secure);
    }
}
