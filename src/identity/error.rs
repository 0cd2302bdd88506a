use thiserror::Error;

/// Outcome of a rejected authentication or authorization attempt.
///
/// The first three kinds are caller-facing denials. `Internal` is a fault in
/// the gate itself and must never be reported to callers as a denial.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Username or password did not match. Deliberately says nothing about which.
    #[error("username or password is incorrect")]
    InvalidCredentials,
    /// No token presented, or the token was never issued (or already revoked).
    #[error("no valid session")]
    Unauthenticated,
    /// The token was known but its lifetime has elapsed. The entry is purged on detection.
    #[error("session expired")]
    TokenExpired,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable wire code used by the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "InvalidCredentials",
            AuthError::Unauthenticated => "Unauthenticated",
            AuthError::TokenExpired => "TokenExpired",
            AuthError::Internal(_) => "Internal",
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
