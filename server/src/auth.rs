//! Admission credentials
//!
//! The relay consults an [`AuthProvider`] exactly once per connection, while
//! the WebSocket handshake is still in progress. Token issuance, user
//! storage and password handling live outside this crate; [`SessionTable`]
//! is the in-memory store a host process can fill, and [`AnonymousAuth`]
//! admits any caller without a display name.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::debug;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Identity of an admitted caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub display_name: Option<String>,
}

impl Principal {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no token provided")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
}

pub trait AuthProvider: Send + Sync {
    fn validate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Checks a possibly absent token. Absent and empty tokens never reach
/// the provider.
pub fn authorize(provider: &dyn AuthProvider, token: Option<&str>) -> Result<Principal, AuthError> {
    match token {
        Some(token) if !token.is_empty() => provider.validate(token),
        _ => Err(AuthError::MissingToken),
    }
}

/// Extracts the `token` parameter from a request query string.
pub fn token_from_query(query: Option<&str>) -> Option<&str> {
    query?.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some("token"), value) => Some(value.unwrap_or("")),
            _ => None,
        }
    })
}

#[derive(Debug, Clone)]
struct Session {
    username: String,
    expires_at: Option<Instant>,
}

/// Bearer tokens mapped to usernames, each with an optional expiry.
#[derive(Debug)]
pub struct SessionTable {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl SessionTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Creates a fresh random token for `username` that expires after the
    /// table's TTL.
    pub fn issue(&self, username: &str) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        self.insert(&token, username, Some(self.ttl));
        token
    }

    /// Registers a known token. `None` means it never expires.
    pub fn insert(&self, token: &str, username: &str, ttl: Option<Duration>) {
        let session = Session {
            username: username.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.to_string(), session);
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuthProvider for SessionTable {
    fn validate(&self, token: &str) -> Result<Principal, AuthError> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get(token).ok_or(AuthError::InvalidToken)?;

        if session.expires_at.is_some_and(|at| Instant::now() >= at) {
            debug!("Rejected expired session for {}", session.username);
            return Err(AuthError::InvalidToken);
        }

        Ok(Principal::named(session.username.clone()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousAuth;

impl AuthProvider for AnonymousAuth {
    fn validate(&self, _token: &str) -> Result<Principal, AuthError> {
        Ok(Principal::anonymous())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_token_from_query() {
        assert_eq!(token_from_query(Some("token=abc")), Some("abc"));
        assert_eq!(token_from_query(Some("room=1&token=x-y_z")), Some("x-y_z"));
        assert_eq!(token_from_query(Some("token")), Some(""));
        assert_eq!(token_from_query(Some("tokens=abc")), None);
        assert_eq!(token_from_query(None), None);
    }

    #[test]
    fn test_missing_token_never_reaches_provider() {
        let table = SessionTable::default();
        assert_eq!(authorize(&table, None), Err(AuthError::MissingToken));
        assert_eq!(authorize(&table, Some("")), Err(AuthError::MissingToken));
        assert_eq!(authorize(&AnonymousAuth, None), Err(AuthError::MissingToken));
    }

    #[test]
    fn test_issued_token_validates() {
        let table = SessionTable::default();
        let token = table.issue("alice");

        assert_eq!(token.len(), 43);
        assert_eq!(
            authorize(&table, Some(token.as_str())),
            Ok(Principal::named("alice"))
        );
        assert_eq!(
            authorize(&table, Some("unknown")),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_issued_tokens_are_unique() {
        let table = SessionTable::default();
        let first = table.issue("alice");
        let second = table.issue("alice");
        assert_ne!(first, second);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let table = SessionTable::default();
        table.insert("stale", "bob", Some(Duration::ZERO));
        table.insert("forever", "carol", None);

        assert_err!(table.validate("stale"));
        assert_ok!(table.validate("forever"));
    }

    #[test]
    fn test_revoke() {
        let table = SessionTable::default();
        table.insert("t", "dave", None);

        assert!(table.revoke("t"));
        assert!(!table.revoke("t"));
        assert!(table.is_empty());
        assert_err!(table.validate("t"));
    }

    #[test]
    fn test_anonymous_has_no_display_name() {
        let principal = assert_ok!(authorize(&AnonymousAuth, Some("whatever")));
        assert_eq!(principal.display_name, None);
    }
}
