use thiserror::Error;

/// Errors the caller must see.
///
/// Only malformed input is reported this way. Signer, instance and storage
/// failures degrade to `None` (no authorization available) or to a cache miss.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("FHE instance error: {0}")]
    Instance(#[source] anyhow::Error),
    #[error("corrupt authorization: {0}")]
    CorruptAuthorization(String),
}

impl AuthError {
    /// Whether the error stems from caller input rather than from a collaborator.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidAddress(_) | AuthError::InvalidPublicKey(_)
        )
    }
}
