use serde::{Deserialize, Serialize};

/// The authenticated principal bound to a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub username: String,
}

impl Identity {
    pub fn new<S: Into<String>>(username: S) -> Self { Self { username: username.into() } }
}
