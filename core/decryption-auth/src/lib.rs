//! Decryption authorizations for FHE user decryption.
//!
//! A [DecryptionAuthorization](authorization::DecryptionAuthorization) binds an
//! ephemeral key pair and a wallet address to a set of contracts for a bounded
//! time window. It is minted by asking a [DecryptionSigner](signer::DecryptionSigner)
//! to sign an EIP-712 payload built by an [FhevmInstance](instance::FhevmInstance),
//! cached in a [GenericStringStorage](storage::GenericStringStorage) and reused
//! until it expires, see [load_or_sign](decryptor::load_or_sign).

pub mod authorization;
pub mod challenge;
pub mod consts;
pub mod decryptor;
pub mod eip712;
pub mod error;
pub mod instance;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod public_key_storage;
pub mod signer;
pub mod solidity_types;
pub mod storage;
pub mod storage_key;
pub mod validation;

pub use authorization::DecryptionAuthorization;
pub use decryptor::{decrypt_handles, load_or_sign};
pub use error::AuthError;
pub use storage_key::StorageKey;

/// Seconds since the unix epoch.
pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn count_request(operation: &'static str) {
    if let Err(e) = observability::metrics::METRICS.increment_request_counter(operation) {
        tracing::warn!("Failed to increment request counter for {operation}: {e}");
    }
}

pub(crate) fn count_error(operation: &'static str, error: &'static str) {
    if let Err(e) = observability::metrics::METRICS.increment_error_counter(operation, error) {
        tracing::warn!("Failed to increment error counter for {operation}: {e}");
    }
}
