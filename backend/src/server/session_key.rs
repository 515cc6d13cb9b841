//! Cookie signing key loading.

use std::path::{Path, PathBuf};

use actix_web::cookie::Key;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroize;

/// Release builds reject key files shorter than this.
pub const SESSION_KEY_MIN_LEN: usize = 64;
/// `Key::derive_from` needs at least this much material.
const DERIVE_MIN_LEN: usize = 32;

/// Build mode deciding how strict key loading is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildMode {
    /// Debug builds tolerate missing or short keys.
    Debug,
    /// Release builds require a readable key of adequate length.
    Release,
}

impl BuildMode {
    /// Determine the build mode from `cfg!(debug_assertions)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use carelink::server::BuildMode;
    ///
    /// let mode = BuildMode::from_debug_assertions();
    /// if cfg!(debug_assertions) {
    ///     assert_eq!(mode, BuildMode::Debug);
    /// } else {
    ///     assert_eq!(mode, BuildMode::Release);
    /// }
    /// ```
    #[must_use]
    pub fn from_debug_assertions() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Release
        }
    }

    fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }
}

/// Errors raised while loading the session key.
#[derive(Debug, Error)]
pub enum SessionKeyError {
    #[error("failed to read session key at {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session key at {path} too short: need >= {min_len} bytes, got {length}")]
    KeyTooShort {
        path: PathBuf,
        length: usize,
        min_len: usize,
    },
}

/// Read the signing key from `path`, wiping the raw bytes afterwards.
///
/// An unreadable file yields a generated key in debug builds or when
/// `allow_ephemeral` is set; sessions then do not survive a restart.
///
/// # Errors
/// [`SessionKeyError::KeyRead`] when the file is unreadable and no fallback
/// applies; [`SessionKeyError::KeyTooShort`] for a short key in release
/// builds.
pub fn load_session_key(
    path: &Path,
    mode: BuildMode,
    allow_ephemeral: bool,
) -> Result<Key, SessionKeyError> {
    match std::fs::read(path) {
        Ok(mut bytes) => {
            let length = bytes.len();
            if mode == BuildMode::Release && length < SESSION_KEY_MIN_LEN {
                bytes.zeroize();
                return Err(SessionKeyError::KeyTooShort {
                    path: path.to_path_buf(),
                    length,
                    min_len: SESSION_KEY_MIN_LEN,
                });
            }
            if length < DERIVE_MIN_LEN {
                bytes.zeroize();
                warn!(
                    path = %path.display(),
                    length,
                    "session key too short to derive from; using temporary key (dev only)"
                );
                return Ok(Key::generate());
            }
            let key = Key::derive_from(&bytes);
            bytes.zeroize();
            Ok(key)
        }
        Err(error) if mode.is_debug() || allow_ephemeral => {
            warn!(
                path = %path.display(),
                error = %error,
                "using temporary session key (dev only)"
            );
            Ok(Key::generate())
        }
        Err(source) => Err(SessionKeyError::KeyRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::NamedTempFile;

    fn key_file(len: usize) -> NamedTempFile {
        let file = NamedTempFile::new().expect("temp file");
        std::fs::write(file.path(), vec![b'k'; len]).expect("write key");
        file
    }

    #[rstest]
    #[case(BuildMode::Debug)]
    #[case(BuildMode::Release)]
    fn derives_the_same_key_from_the_same_file(#[case] mode: BuildMode) {
        let file = key_file(SESSION_KEY_MIN_LEN);
        let first = load_session_key(file.path(), mode, false).expect("key");
        let second = load_session_key(file.path(), mode, false).expect("key");
        assert_eq!(first.master(), second.master());
    }

    #[rstest]
    fn short_keys_are_refused_in_release() {
        let file = key_file(16);
        let error = load_session_key(file.path(), BuildMode::Release, false)
            .err()
            .expect("short key rejected");
        assert!(matches!(
            error,
            SessionKeyError::KeyTooShort {
                length: 16,
                min_len: SESSION_KEY_MIN_LEN,
                ..
            }
        ));
    }

    #[rstest]
    fn short_keys_are_tolerated_in_debug() {
        let file = key_file(16);
        assert!(load_session_key(file.path(), BuildMode::Debug, false).is_ok());
    }

    #[rstest]
    #[case(BuildMode::Debug, false, true)]
    #[case(BuildMode::Release, true, true)]
    #[case(BuildMode::Release, false, false)]
    fn missing_key_fallback(
        #[case] mode: BuildMode,
        #[case] allow_ephemeral: bool,
        #[case] succeeds: bool,
    ) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent");
        let result = load_session_key(&path, mode, allow_ephemeral);
        assert_eq!(result.is_ok(), succeeds);
        if !succeeds {
            assert!(matches!(result, Err(SessionKeyError::KeyRead { .. })));
        }
    }
}
