use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::error::{AuthError, AuthResult};
use super::principal::Identity;
use super::session::{Session, TokenRegistry};

/// A username/password pair as presented by a caller. Never stored.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Secret held by a credential store for one account.
#[derive(Clone)]
pub struct StoredSecret(String);

impl StoredSecret {
    pub fn new<S: Into<String>>(secret: S) -> Self { Self(secret.into()) }

    /// Stand-in compared against when the username is unknown. Sized to the
    /// candidate so the comparison costs what a real same-length one would.
    pub(crate) fn decoy(len: usize) -> Self { Self("\0".repeat(len)) }

    /// Constant-time equality. Only the candidate's own length affects timing:
    /// a length mismatch still runs a full comparison over the candidate.
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let provided = candidate.as_bytes();
        if expected.len() != provided.len() {
            let _ = provided.ct_eq(provided);
            return false;
        }
        provided.ct_eq(expected).into()
    }
}

fn names_match(stored: &str, presented: &str) -> bool {
    stored.len() == presented.len() && bool::from(stored.as_bytes().ct_eq(presented.as_bytes()))
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("StoredSecret([REDACTED])") }
}

/// Where account secrets come from. A backing store that does I/O must do it
/// without touching the token registry.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, username: &str) -> Option<StoredSecret>;
}

/// Single configured account.
#[derive(Debug, Clone)]
pub struct StaticAccount {
    username: String,
    secret: StoredSecret,
}

impl StaticAccount {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self { username: username.into(), secret: StoredSecret::new(password) }
    }
}

impl CredentialStore for StaticAccount {
    fn lookup(&self, username: &str) -> Option<StoredSecret> {
        names_match(&self.username, username).then(|| self.secret.clone())
    }
}

pub trait AuthProvider: Send + Sync {
    /// Validate `creds` and, on success, register and return a new session.
    fn authenticate(&self, creds: &Credentials) -> AuthResult<Session>;
}

/// Checks credentials against a [`CredentialStore`] and issues sessions into
/// the shared [`TokenRegistry`].
pub struct CredentialValidator<S: CredentialStore> {
    store: S,
    registry: Arc<TokenRegistry>,
}

impl<S: CredentialStore> CredentialValidator<S> {
    pub fn new(store: S, registry: Arc<TokenRegistry>) -> Self { Self { store, registry } }

    pub fn registry(&self) -> &Arc<TokenRegistry> { &self.registry }
}

impl<S: CredentialStore> AuthProvider for CredentialValidator<S> {
    fn authenticate(&self, creds: &Credentials) -> AuthResult<Session> {
        if creds.username.is_empty() || creds.password.is_empty() {
            warn!(reason = "empty_field", "auth.login rejected");
            return Err(AuthError::InvalidCredentials);
        }
        let accepted = match self.store.lookup(&creds.username) {
            Some(secret) => secret.matches(&creds.password),
            None => {
                let _ = StoredSecret::decoy(creds.password.len()).matches(&creds.password);
                false
            }
        };
        if !accepted {
            warn!(user = %creds.username, reason = "mismatch", "auth.login rejected");
            return Err(AuthError::InvalidCredentials);
        }
        let session = self.registry.issue(Identity::new(creds.username.as_str()))?;
        info!(user = %creds.username, sid = %session.session_id, "auth.login");
        Ok(session)
    }
}
