/// What the transport layer hands to the gate for one inbound call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Bearer token presented by the caller, if any.
    pub token: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self { Self::default() }

    pub fn with_token<S: Into<String>>(token: S) -> Self {
        Self { token: Some(token.into()), request_id: None }
    }

    pub fn request_id<S: Into<String>>(mut self, id: S) -> Self {
        self.request_id = Some(id.into());
        self
    }
}
