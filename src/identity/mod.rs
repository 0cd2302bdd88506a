//! Credential validation, session tokens and the authorization gate.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod request_context;
mod authorizer;
mod error;

pub use principal::Identity;
pub use session::{Clock, ManualClock, Session, SessionToken, SystemClock, TokenRegistry, MIN_TOKEN_BYTES};
pub use provider::{AuthProvider, CredentialStore, CredentialValidator, Credentials, StaticAccount, StoredSecret};
pub use request_context::RequestContext;
pub use authorizer::{Access, AuthorizationGate, OperationCatalog};
pub use error::{AuthError, AuthResult};
