//! Authentication state shared by every request of one client.

use crate::options::SecretString;

/// Holds the current authentication token.
///
/// An unset token is a valid state meaning "unauthenticated". The token is
/// written by [`Client::authenticate`](crate::Client::authenticate) and read
/// by every request that requires authentication.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<SecretString>,
    user_name: Option<String>,
}

impl Session {
    /// Create an unauthenticated session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session from a token obtained elsewhere.
    pub fn with_token(token: impl Into<SecretString>) -> Self {
        Self {
            token: Some(token.into()),
            user_name: None,
        }
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    pub fn set_token(&mut self, token: impl Into<SecretString>) {
        self.token = Some(token.into());
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Display name of the authenticated user, once known.
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn set_user_name(&mut self, name: String) {
        self.user_name = Some(name);
    }

    /// Forget the token and the user name.
    pub fn clear(&mut self) {
        self.token = None;
        self.user_name = None;
    }
}
