use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::{AuthError, AuthResult};
use super::principal::Identity;
use super::request_context::RequestContext;
use super::session::TokenRegistry;

/// Whether an operation needs an authorized caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Public,
    Protected,
}

/// Explicit per-operation access declarations.
///
/// Anything not registered is `Protected`; the only way to make an operation
/// public is to list it here, so [`OperationCatalog::public_operations`] is the
/// complete exemption list.
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    ops: BTreeMap<String, Access>,
}

impl OperationCatalog {
    pub fn new() -> Self { Self::default() }

    pub fn register<S: Into<String>>(&mut self, name: S, access: Access) -> &mut Self {
        self.ops.insert(name.into(), access);
        self
    }

    pub fn public<S: Into<String>>(mut self, name: S) -> Self {
        self.register(name, Access::Public);
        self
    }

    pub fn protected<S: Into<String>>(mut self, name: S) -> Self {
        self.register(name, Access::Protected);
        self
    }

    pub fn access_for(&self, name: &str) -> Access {
        self.ops.get(name).copied().unwrap_or(Access::Protected)
    }

    pub fn public_operations(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter(|(_, a)| **a == Access::Public)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// Enforces session tokens in front of protected operations.
pub struct AuthorizationGate {
    registry: Arc<TokenRegistry>,
    catalog: OperationCatalog,
}

impl AuthorizationGate {
    pub fn new(registry: Arc<TokenRegistry>, catalog: OperationCatalog) -> Self {
        Self { registry, catalog }
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> { &self.registry }

    pub fn catalog(&self) -> &OperationCatalog { &self.catalog }

    pub fn authorize(&self, token: &str) -> AuthResult<Identity> {
        let res = self.registry.authorize(token);
        match &res {
            Err(AuthError::TokenExpired) => warn!(reason = "token_expired", "gate.deny"),
            Err(e) => debug!(reason = e.code(), "gate.deny"),
            Ok(_) => {}
        }
        res
    }

    /// Run `operation` only if `token` authorizes. The operation is never
    /// invoked on a failed check.
    pub fn guard<R, F>(&self, token: &str, operation: F) -> AuthResult<R>
    where
        F: FnOnce(&Identity) -> R,
    {
        let identity = self.authorize(token)?;
        Ok(operation(&identity))
    }

    pub fn revoke(&self, token: &str) -> bool { self.registry.revoke(token) }

    /// Single entry point for named operations: consults the catalog, skips
    /// authorization for `Public` entries and guards everything else. The
    /// operation receives the caller's identity when one was established.
    pub fn dispatch<R, F>(&self, name: &str, ctx: &RequestContext, operation: F) -> AuthResult<R>
    where
        F: FnOnce(Option<&Identity>) -> R,
    {
        match self.catalog.access_for(name) {
            Access::Public => Ok(operation(None)),
            Access::Protected => {
                let Some(token) = ctx.token.as_deref() else {
                    debug!(op = name, request_id = ?ctx.request_id, reason = "no_token", "gate.deny");
                    return Err(AuthError::Unauthenticated);
                };
                self.guard(token, |id| operation(Some(id)))
            }
        }
    }
}
