//! End-to-end properties of the validator + gate pair over a shared registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use authgate::identity::{
    AuthError, AuthProvider, AuthorizationGate, CredentialValidator, Credentials, Identity, ManualClock,
    OperationCatalog, RequestContext, StaticAccount, TokenRegistry,
};
use authgate::secret::SecretSource;

struct Fixture {
    validator: CredentialValidator<StaticAccount>,
    gate: AuthorizationGate,
    clock: Arc<ManualClock>,
}

fn fixture(ttl: Duration) -> Fixture {
    let clock = Arc::new(ManualClock::default());
    let registry = Arc::new(TokenRegistry::with_clock(ttl, 16, clock.clone()));
    let validator = CredentialValidator::new(StaticAccount::new("bob", "password"), registry.clone());
    let gate = AuthorizationGate::new(registry, OperationCatalog::new().protected("fetch"));
    Fixture { validator, gate, clock }
}

#[test]
fn bob_scenario() {
    let f = fixture(Duration::from_secs(3600));
    let fetch_value = SecretSource::seeded(-20, 55, 1).unwrap();

    let t = f.validator.authenticate(&Credentials::new("bob", "password")).unwrap().token;
    let v = f.gate.guard(&t, |_| fetch_value.fetch()).unwrap();
    assert!((-20..=55).contains(&v));

    assert_eq!(
        f.validator.authenticate(&Credentials::new("bob", "wrong")).unwrap_err(),
        AuthError::InvalidCredentials
    );
    assert_eq!(f.gate.guard("garbage-token", |_| fetch_value.fetch()), Err(AuthError::Unauthenticated));
}

#[test]
fn failed_logins_leave_registry_untouched() {
    let f = fixture(Duration::from_secs(3600));
    let registry = f.gate.registry().clone();
    f.validator.authenticate(&Credentials::new("bob", "password")).unwrap();
    let before = registry.len();
    for (u, p) in [("bob", "pass"), ("bobby", "password"), ("BOB", "PASSWORD"), ("", "")] {
        assert!(f.validator.authenticate(&Credentials::new(u, p)).is_err());
        assert_eq!(registry.len(), before);
    }
}

#[test]
fn successful_login_adds_exactly_one_new_token() {
    let f = fixture(Duration::from_secs(3600));
    let registry = f.gate.registry().clone();
    let first = f.validator.authenticate(&Credentials::new("bob", "password")).unwrap();
    let before = registry.len();
    let second = f.validator.authenticate(&Credentials::new("bob", "password")).unwrap();
    assert_eq!(registry.len(), before + 1);
    assert_ne!(first.token, second.token);
    assert_eq!(f.gate.authorize(&second.token).unwrap(), Identity::new("bob"));
}

#[test]
fn guard_invokes_operation_exactly_once() {
    let f = fixture(Duration::from_secs(3600));
    let t = f.validator.authenticate(&Credentials::new("bob", "password")).unwrap().token;
    let calls = AtomicUsize::new(0);
    f.gate
        .guard(&t, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn expiry_then_purge() {
    let ttl = Duration::from_secs(120);
    let f = fixture(ttl);
    let t = f.validator.authenticate(&Credentials::new("bob", "password")).unwrap().token;
    f.clock.advance(ttl);
    let calls = AtomicUsize::new(0);
    let res = f.gate.guard(&t, |_| calls.fetch_add(1, Ordering::SeqCst));
    assert_eq!(res, Err(AuthError::TokenExpired));
    assert_eq!(f.gate.authorize(&t), Err(AuthError::Unauthenticated));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn racing_presenters_of_an_expired_token_see_exactly_one_expiry() {
    const THREADS: usize = 8;
    for _ in 0..50 {
        let ttl = Duration::from_secs(60);
        let f = Arc::new(fixture(ttl));
        let t = f.validator.authenticate(&Credentials::new("bob", "password")).unwrap().token;
        f.clock.advance(ttl + Duration::from_secs(1));

        let barrier = Arc::new(std::sync::Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let (f, t, barrier) = (f.clone(), t.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    f.gate.authorize(&t)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let expired = results.iter().filter(|r| **r == Err(AuthError::TokenExpired)).count();
        let unknown = results.iter().filter(|r| **r == Err(AuthError::Unauthenticated)).count();
        assert_eq!(expired, 1, "{results:?}");
        assert_eq!(unknown, THREADS - 1, "{results:?}");
        assert!(f.gate.registry().is_empty());
    }
}

#[test]
fn revoke_then_authorize() {
    let f = fixture(Duration::from_secs(3600));
    let t = f.validator.authenticate(&Credentials::new("bob", "password")).unwrap().token;
    f.gate.revoke(&t);
    assert_eq!(f.gate.authorize(&t), Err(AuthError::Unauthenticated));
}

#[test]
fn ten_thousand_tokens_are_distinct() {
    let f = fixture(Duration::from_secs(3600));
    let creds = Credentials::new("bob", "password");
    let mut seen = HashSet::with_capacity(10_000);
    for _ in 0..10_000 {
        let token = f.validator.authenticate(&creds).unwrap().token;
        assert!(seen.insert(token), "duplicate token issued");
    }
    assert_eq!(f.gate.registry().len(), 10_000);
}

#[test]
fn concurrent_issue_and_authorize() {
    let f = Arc::new(fixture(Duration::from_secs(3600)));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let f = f.clone();
            std::thread::spawn(move || {
                let creds = Credentials::new("bob", "password");
                let mut tokens = Vec::new();
                for _ in 0..200 {
                    let t = f.validator.authenticate(&creds).unwrap().token;
                    assert!(f.gate.authorize(&t).is_ok());
                    tokens.push(t);
                }
                for t in tokens.iter().step_by(2) {
                    assert!(f.gate.revoke(t));
                }
                tokens.len() / 2
            })
        })
        .collect();
    let kept: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(f.gate.registry().len(), kept);
}

#[test]
fn dispatch_uses_context_token() {
    let f = fixture(Duration::from_secs(3600));
    let t = f.validator.authenticate(&Credentials::new("bob", "password")).unwrap().token;
    let who = f
        .gate
        .dispatch("fetch", &RequestContext::with_token(t), |id| id.map(|i| i.username.clone()))
        .unwrap();
    assert_eq!(who.as_deref(), Some("bob"));
    assert_eq!(
        f.gate.dispatch("fetch", &RequestContext::anonymous(), |_| ()),
        Err(AuthError::Unauthenticated)
    );
}
