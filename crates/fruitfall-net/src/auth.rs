//! Connection-time credential verification.
//!
//! A connection's first frame must be [`ClientMessage::Hello`] carrying a
//! bearer token. The server hands the token to a [`CredentialVerifier`] and
//! refuses the connection on failure, before any other frame is processed.
//!
//! [`ClientMessage::Hello`]: crate::messages::ClientMessage::Hello

use std::collections::HashMap;

use crate::messages::PlayerId;

/// A verified identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: PlayerId,
    pub display_name: String,
}

/// Errors that refuse a connection during the handshake.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token is unknown, expired, or revoked.
    #[error("credential rejected")]
    Rejected,
    /// The first frame was not a `hello`.
    #[error("expected hello, got {0}")]
    UnexpectedMessage(&'static str),
    /// No `hello` arrived within the handshake timeout.
    #[error("handshake timed out")]
    Timeout,
    #[error("handshake failed: {0}")]
    Frame(#[from] crate::framing::FrameError),
}

/// Resolves bearer tokens to identities.
pub trait CredentialVerifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> Result<Credentials, AuthError>;
}

/// Blanket implementation for closures.
impl<F> CredentialVerifier for F
where
    F: Fn(&str) -> Result<Credentials, AuthError> + Send + Sync + 'static,
{
    fn verify(&self, token: &str) -> Result<Credentials, AuthError> {
        self(token)
    }
}

/// Fixed token table, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Credentials>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` for `identity`, replacing any previous entry.
    pub fn insert(
        &mut self,
        token: impl Into<String>,
        identity: impl Into<String>,
        display_name: impl Into<String>,
    ) {
        self.tokens.insert(
            token.into(),
            Credentials {
                identity: PlayerId(identity.into()),
                display_name: display_name.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl CredentialVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<Credentials, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::Rejected)
    }
}
