//!
//! authgate HTTP server
//! --------------------
//! Thin axum front end over the `identity` core. It only extracts credentials
//! and tokens from requests and maps gate outcomes to responses; every route
//! goes through `AuthorizationGate::dispatch` under its catalog name.
//!
//! Responsibilities:
//! - POST /authenticate: JSON credentials in, bearer token (and session cookie) out.
//! - GET /secret: the example protected resource.
//! - POST /logout: revokes the presented token.
//! - Periodic sweep of expired sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::{get, post}, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::GateConfig;
use crate::error::AppError;
use crate::identity::{
    AuthProvider, AuthorizationGate, CredentialValidator, Credentials, OperationCatalog, RequestContext,
    StaticAccount, TokenRegistry,
};
use crate::secret::SecretSource;

const SESSION_COOKIE: &str = "authgate_session";
const CLEARED_SESSION_COOKIE: &str =
    "authgate_session=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/";

pub const OP_HEALTH: &str = "health";
pub const OP_AUTHENTICATE: &str = "authenticate";
pub const OP_SECRET: &str = "secret";
pub const OP_LOGOUT: &str = "logout";

/// Access declarations for every route this server exposes.
pub fn operation_catalog() -> OperationCatalog {
    OperationCatalog::new()
        .public(OP_HEALTH)
        .public(OP_AUTHENTICATE)
        .protected(OP_SECRET)
        .protected(OP_LOGOUT)
}

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn AuthProvider>,
    pub gate: Arc<AuthorizationGate>,
    pub secret: Arc<SecretSource>,
}

impl AppState {
    /// Wire validator and gate around one shared registry.
    pub fn from_config(cfg: &GateConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        let registry = Arc::new(TokenRegistry::new(cfg.token_ttl(), cfg.token_byte_length));
        let secret = SecretSource::new(cfg.secret_min, cfg.secret_max)
            .context("secret range is empty")?;
        Ok(Self::with_registry(cfg, registry, secret))
    }

    pub fn with_registry(cfg: &GateConfig, registry: Arc<TokenRegistry>, secret: SecretSource) -> Self {
        let account = StaticAccount::new(cfg.username.as_str(), cfg.password.as_str());
        let provider = CredentialValidator::new(account, registry.clone());
        Self {
            provider: Arc::new(provider),
            gate: Arc::new(AuthorizationGate::new(registry, operation_catalog())),
            secret: Arc::new(secret),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal { .. } = &self {
            error!("request failed: {self}");
        }
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body())).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/authenticate", post(authenticate))
        .route("/secret", get(secret))
        .route("/logout", post(logout))
        .with_state(state)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name && !v.is_empty() { return Some(v.to_string()); }
            }
        }
    }
    None
}

/// `Authorization: Bearer <token>`, falling back to the session cookie.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .map(str::to_string);
    bearer.or_else(|| parse_cookie(headers, SESSION_COOKIE))
}

pub fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext {
        token: bearer_token(headers),
        request_id: headers.get("x-request-id").and_then(|v| v.to_str().ok()).map(str::to_string),
    }
}

fn set_session_cookie(token: &str, max_age_secs: i64) -> Result<HeaderValue, AppError> {
    // HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; Max-Age={max_age_secs}; HttpOnly; Secure; SameSite=Strict; Path=/"
    ))
    .map_err(|e| AppError::internal("Internal".to_string(), e.to_string()))
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SecretResponse {
    value: i64,
}

async fn health(State(state): State<AppState>, headers: HeaderMap) -> Result<&'static str, AppError> {
    let ctx = request_context(&headers);
    Ok(state.gate.dispatch(OP_HEALTH, &ctx, |_| "authgate ok")?)
}

async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(creds) = payload.map_err(|e| AppError::user("BadRequest".to_string(), e.body_text()))?;
    let ctx = request_context(&headers);
    let session = state.gate.dispatch(OP_AUTHENTICATE, &ctx, |_| state.provider.authenticate(&creds))??;

    let max_age = state.gate.registry().ttl().num_seconds();
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, set_session_cookie(&session.token, max_age)?);
    let body = TokenResponse { token: session.token, expires_at: session.expires_at };
    Ok((StatusCode::OK, h, Json(body)))
}

async fn secret(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<SecretResponse>, AppError> {
    let ctx = request_context(&headers);
    let value = state.gate.dispatch(OP_SECRET, &ctx, |_| state.secret.fetch())?;
    Ok(Json(SecretResponse { value }))
}

/// The session cookie is cleared on every outcome, so a client holding an
/// expired or revoked cookie still gets rid of it.
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = request_context(&headers);
    let mut resp = match state.gate.dispatch(OP_LOGOUT, &ctx, |id| id.map(|i| i.username.clone())) {
        Ok(user) => {
            if let Some(token) = ctx.token.as_deref() {
                state.gate.revoke(token);
            }
            info!(user = ?user, "auth.logout");
            (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    };
    resp.headers_mut().insert(header::SET_COOKIE, HeaderValue::from_static(CLEARED_SESSION_COOKIE));
    resp
}

/// Background task that drops expired sessions every `every`.
pub fn spawn_sweeper(registry: Arc<TokenRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let removed = registry.sweep_expired();
            if removed > 0 { debug!(removed = removed, "session_sweep"); }
        }
    })
}

pub async fn run(cfg: GateConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&cfg)?;

    match cfg.sweep_interval() {
        Some(every) => { spawn_sweeper(state.gate.registry().clone(), every); }
        None => info!("session_sweep" = false, "background session sweep disabled"),
    }
    info!(public = ?state.gate.catalog().public_operations(), "operations exempt from authorization");
    info!(
        ttl_secs = state.gate.registry().ttl().num_seconds(),
        secret_range = ?state.secret.range(),
        "gate configured"
    );

    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
