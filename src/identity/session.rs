use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::tprintln;

use super::error::{AuthError, AuthResult};
use super::principal::Identity;

pub type SessionToken = String;

/// Minimum token entropy accepted by the registry (128 bits).
pub const MIN_TOKEN_BYTES: usize = 16;
const SESSION_ID_BYTES: usize = 12;

/// Source of "now" for issuance and expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// Clock that only moves when told to. Used to exercise expiry without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self { Self { now: Mutex::new(start) } }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.checked_add_signed(to_delta(by)).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Default for ManualClock {
    fn default() -> Self { Self::new(Utc::now()) }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> { *self.now.lock() }
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

#[derive(Clone)]
pub struct Session {
    /// Log-safe handle for this session; never usable as a credential.
    pub session_id: String,
    pub token: SessionToken,
    pub identity: Identity,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("token", &"[REDACTED]")
            .field("identity", &self.identity)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn gen_id(len: usize) -> AuthResult<String> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf)
        .map_err(|e| AuthError::Internal(format!("secure random source unavailable: {e}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionToken, Session>,
    by_user: HashMap<String, HashSet<SessionToken>>,
}

impl RegistryState {
    fn insert(&mut self, session: Session) {
        self.by_user
            .entry(session.identity.username.clone())
            .or_default()
            .insert(session.token.clone());
        self.sessions.insert(session.token.clone(), session);
    }

    fn remove(&mut self, token: &str) -> Option<Session> {
        let session = self.sessions.remove(token)?;
        let user = &session.identity.username;
        if let Some(set) = self.by_user.get_mut(user) {
            set.remove(token);
            if set.is_empty() { self.by_user.remove(user); }
        }
        Some(session)
    }
}

/// In-memory, process-scoped mapping from bearer token to session.
///
/// One registry is shared (behind an `Arc`) by the credential validator, which
/// inserts, and the authorization gate, which looks up and revokes. All access
/// goes through a single `RwLock`: lookups share the read side, every mutation
/// (issue, revoke, expiry purge, sweep) takes the write side. Nothing blocking
/// runs while the lock is held.
pub struct TokenRegistry {
    ttl: TimeDelta,
    token_bytes: usize,
    clock: Arc<dyn Clock>,
    state: RwLock<RegistryState>,
}

impl TokenRegistry {
    pub fn new(ttl: Duration, token_bytes: usize) -> Self {
        Self::with_clock(ttl, token_bytes, Arc::new(SystemClock))
    }

    /// `token_bytes` below [`MIN_TOKEN_BYTES`] is raised to the minimum.
    pub fn with_clock(ttl: Duration, token_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: to_delta(ttl),
            token_bytes: token_bytes.max(MIN_TOKEN_BYTES),
            clock,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn ttl(&self) -> TimeDelta { self.ttl }

    pub fn len(&self) -> usize { self.state.read().sessions.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Mint a fresh token for `identity` and register it.
    pub fn issue(&self, identity: Identity) -> AuthResult<Session> {
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let session_id = gen_id(SESSION_ID_BYTES)?;
        // Randomness is drawn outside the lock; a collision with a live token just retries.
        loop {
            let token = gen_id(self.token_bytes)?;
            let mut state = self.state.write();
            if state.sessions.contains_key(&token) {
                debug!(sid = %session_id, "token collision, regenerating");
                continue;
            }
            let session = Session {
                session_id: session_id.clone(),
                token,
                identity: identity.clone(),
                issued_at: now,
                expires_at,
            };
            state.insert(session.clone());
            drop(state);
            info!(user = %identity.username, sid = %session_id, ttl_secs = self.ttl.num_seconds(), "session.issue");
            tprintln!("session.issue user={} sid={} ttl_secs={}", identity.username, session_id, self.ttl.num_seconds());
            return Ok(session);
        }
    }

    /// Resolve a token to its identity, purging it if its lifetime has elapsed.
    pub fn authorize(&self, token: &str) -> AuthResult<Identity> {
        let now = self.clock.now();
        {
            let state = self.state.read();
            match state.sessions.get(token) {
                None => return Err(AuthError::Unauthenticated),
                Some(s) if !s.is_expired_at(now) => return Ok(s.identity.clone()),
                Some(_) => {}
            }
        }
        // Expired: re-check under the write lock since another caller may have purged it.
        let mut state = self.state.write();
        match state.sessions.get(token) {
            None => return Err(AuthError::Unauthenticated),
            Some(s) if !s.is_expired_at(now) => return Ok(s.identity.clone()),
            Some(_) => {}
        }
        if let Some(s) = state.remove(token) {
            info!(user = %s.identity.username, sid = %s.session_id, reason = "expired", "session.purge");
        }
        Err(AuthError::TokenExpired)
    }

    /// Remove a token. Returns whether it was present; absent tokens are a no-op.
    pub fn revoke(&self, token: &str) -> bool {
        let removed = self.state.write().remove(token);
        match removed {
            Some(s) => {
                info!(user = %s.identity.username, sid = %s.session_id, reason = "revoked", "session.purge");
                true
            }
            None => false,
        }
    }

    /// Revoke every live session of `username`.
    pub fn revoke_user(&self, username: &str) -> usize {
        let mut state = self.state.write();
        let tokens: Vec<SessionToken> = state
            .by_user
            .get(username)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        let count = tokens.iter().filter(|t| state.remove(t.as_str()).is_some()).count();
        drop(state);
        info!(user = %username, count, "session.revoke_user");
        tprintln!("session.revoke user={} count={}", username, count);
        count
    }

    /// Drop all sessions whose lifetime has elapsed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.write();
        let expired: Vec<SessionToken> = state
            .sessions
            .values()
            .filter(|s| s.is_expired_at(now))
            .map(|s| s.token.clone())
            .collect();
        for t in &expired {
            state.remove(t);
        }
        expired.len()
    }
}

impl fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("ttl_secs", &self.ttl.num_seconds())
            .field("token_bytes", &self.token_bytes)
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(ttl_secs: u64) -> (TokenRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let reg = TokenRegistry::with_clock(Duration::from_secs(ttl_secs), 16, clock.clone());
        (reg, clock)
    }

    #[test]
    fn issue_then_authorize_returns_identity() {
        let (reg, _clock) = registry(60);
        let s = reg.issue(Identity::new("bob")).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.authorize(&s.token).unwrap(), Identity::new("bob"));
        assert_eq!(s.expires_at - s.issued_at, TimeDelta::seconds(60));
    }

    #[test]
    fn token_carries_requested_entropy() {
        let (reg, _clock) = registry(60);
        let s = reg.issue(Identity::new("bob")).unwrap();
        // 16 bytes -> 22 chars of unpadded base64url
        assert_eq!(s.token.len(), 22);
        assert_ne!(s.token, s.session_id);
    }

    #[test]
    fn short_token_length_is_raised_to_minimum() {
        let reg = TokenRegistry::new(Duration::from_secs(60), 4);
        let s = reg.issue(Identity::new("bob")).unwrap();
        assert_eq!(s.token.len(), 22);
    }

    #[test]
    fn expired_token_reports_expired_once_then_unknown() {
        let (reg, clock) = registry(60);
        let s = reg.issue(Identity::new("bob")).unwrap();
        clock.advance(Duration::from_secs(59));
        assert!(reg.authorize(&s.token).is_ok());
        clock.advance(Duration::from_secs(1));
        assert_eq!(reg.authorize(&s.token), Err(AuthError::TokenExpired));
        assert_eq!(reg.len(), 0);
        assert_eq!(reg.authorize(&s.token), Err(AuthError::Unauthenticated));
    }

    #[test]
    fn revoke_is_idempotent() {
        let (reg, _clock) = registry(60);
        let s = reg.issue(Identity::new("bob")).unwrap();
        assert!(reg.revoke(&s.token));
        assert!(!reg.revoke(&s.token));
        assert_eq!(reg.authorize(&s.token), Err(AuthError::Unauthenticated));
    }

    #[test]
    fn revoke_user_only_touches_that_user() {
        let (reg, _clock) = registry(60);
        let a1 = reg.issue(Identity::new("alice")).unwrap();
        let a2 = reg.issue(Identity::new("alice")).unwrap();
        let b = reg.issue(Identity::new("bob")).unwrap();
        assert_eq!(reg.revoke_user("alice"), 2);
        assert_eq!(reg.authorize(&a1.token), Err(AuthError::Unauthenticated));
        assert_eq!(reg.authorize(&a2.token), Err(AuthError::Unauthenticated));
        assert!(reg.authorize(&b.token).is_ok());
        assert_eq!(reg.revoke_user("alice"), 0);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let (reg, clock) = registry(60);
        let old = reg.issue(Identity::new("bob")).unwrap();
        clock.advance(Duration::from_secs(30));
        let fresh = reg.issue(Identity::new("bob")).unwrap();
        clock.advance(Duration::from_secs(30));
        assert_eq!(reg.sweep_expired(), 1);
        assert_eq!(reg.authorize(&old.token), Err(AuthError::Unauthenticated));
        assert!(reg.authorize(&fresh.token).is_ok());
    }

    #[test]
    fn debug_output_hides_token() {
        let (reg, _clock) = registry(60);
        let s = reg.issue(Identity::new("bob")).unwrap();
        let rendered = format!("{s:?}");
        assert!(!rendered.contains(&s.token));
        assert!(rendered.contains("REDACTED"));
    }
}
