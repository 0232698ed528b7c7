//! Wallet capability used to sign authorization payloads.

use crate::eip712::UserDecryptEip712;
use alloy_primitives::{Address, Signature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use error_utils::anyhow_error_and_warn_log;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Signer error: {0}")]
    SignerError(#[from] alloy_signer::Error),
    #[error("Local signer error: {0}")]
    LocalSignerError(#[from] alloy_signer_local::LocalSignerError),
    #[error("Failed to load wallet: {0}")]
    LoadError(String),
}

/// A wallet able to sign EIP-712 payloads.
///
/// Signing may wait on a user for an unbounded time and may be refused.
/// A refusal is reported as an error, timeouts are the implementation's business.
#[trait_variant::make(Send)]
pub trait DecryptionSigner {
    async fn get_address(&self) -> anyhow::Result<Address>;

    async fn sign_typed_data(&self, payload: &UserDecryptEip712) -> anyhow::Result<Signature>;
}

/// Signer backed by a private key held in memory.
#[derive(Clone)]
pub struct LocalWalletSigner {
    signer: PrivateKeySigner,
}

impl LocalWalletSigner {
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// Load from a hex encoded secp256k1 private key, `0x` prefix optional.
    pub fn from_private_key(hex_key: &str) -> Result<Self, WalletError> {
        let signer = hex_key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| WalletError::LoadError(format!("invalid private key: {e}")))?;
        Ok(Self { signer })
    }

    /// Derive the first account of a BIP-39 mnemonic.
    pub fn from_mnemonic(phrase: &str) -> Result<Self, WalletError> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase.trim())
            .build()?;
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

impl std::fmt::Debug for LocalWalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWalletSigner")
            .field("address", &self.signer.address())
            .finish()
    }
}

impl DecryptionSigner for LocalWalletSigner {
    async fn get_address(&self) -> anyhow::Result<Address> {
        Ok(self.signer.address())
    }

    async fn sign_typed_data(&self, payload: &UserDecryptEip712) -> anyhow::Result<Signature> {
        let hash = payload.signing_hash();
        Ok(self.signer.sign_hash_sync(&hash)?)
    }
}

/// Hex form of a signature, `0x` followed by r, s and v.
pub fn signature_to_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.as_bytes()))
}

/// Parse the 65 byte `r ‖ s ‖ v` form produced by [signature_to_hex].
pub fn signature_from_hex(input: &str) -> anyhow::Result<Signature> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    let raw = hex::decode(digits)?;
    if raw.len() != 65 {
        return Err(anyhow_error_and_warn_log(format!(
            "expected a 65 byte signature, got {} bytes",
            raw.len()
        )));
    }
    // v may be 27/28 as written by `as_bytes()` or 0/1 as some wallets emit it
    Ok(Signature::try_from(raw.as_slice())?)
}

/// Address that produced `signature` over `hash`.
pub fn recover_signer(hash: &B256, signature: &Signature) -> anyhow::Result<Address> {
    Ok(signature.recover_address_from_prehash(hash)?)
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Signers for exercising the signing paths.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Wraps a local wallet and counts signing requests.
    #[derive(Debug, Clone)]
    pub struct CountingSigner {
        inner: LocalWalletSigner,
        sign_requests: Arc<AtomicUsize>,
    }

    impl CountingSigner {
        pub fn new(inner: LocalWalletSigner) -> Self {
            Self {
                inner,
                sign_requests: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn sign_requests(&self) -> usize {
            self.sign_requests.load(Ordering::SeqCst)
        }
    }

    impl DecryptionSigner for CountingSigner {
        async fn get_address(&self) -> anyhow::Result<Address> {
            self.inner.get_address().await
        }

        async fn sign_typed_data(
            &self,
            payload: &UserDecryptEip712,
        ) -> anyhow::Result<Signature> {
            self.sign_requests.fetch_add(1, Ordering::SeqCst);
            self.inner.sign_typed_data(payload).await
        }
    }

    /// A wallet whose user dismisses every signing prompt.
    #[derive(Debug, Clone)]
    pub struct RejectingSigner {
        address: Address,
        sign_requests: Arc<AtomicUsize>,
    }

    impl RejectingSigner {
        pub fn new(address: Address) -> Self {
            Self {
                address,
                sign_requests: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn sign_requests(&self) -> usize {
            self.sign_requests.load(Ordering::SeqCst)
        }
    }

    impl DecryptionSigner for RejectingSigner {
        async fn get_address(&self) -> anyhow::Result<Address> {
            Ok(self.address)
        }

        async fn sign_typed_data(
            &self,
            _payload: &UserDecryptEip712,
        ) -> anyhow::Result<Signature> {
            self.sign_requests.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("user rejected the signing request")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{FhevmInstance, LocalFhevmInstance};

    // first account of the well known hardhat test mnemonic
    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
    const TEST_MNEMONIC_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn wallet_loading() {
        let from_mnemonic = LocalWalletSigner::from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(
            from_mnemonic.address().to_checksum(None),
            TEST_MNEMONIC_ADDRESS
        );
        let from_key = LocalWalletSigner::from_private_key(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        assert_eq!(from_key.address(), from_mnemonic.address());

        assert!(LocalWalletSigner::from_private_key("0x1234").is_err());
        assert!(LocalWalletSigner::from_mnemonic("not a mnemonic").is_err());
    }

    #[tokio::test]
    async fn signature_recovers_to_wallet() {
        let signer = LocalWalletSigner::random();
        let instance = LocalFhevmInstance::default();
        let keypair = instance.generate_keypair().unwrap();
        let payload = instance
            .create_eip712(&keypair.public_key, &[Address::repeat_byte(3)], 100, 1)
            .unwrap();

        let signature = signer.sign_typed_data(&payload).await.unwrap();
        let encoded = signature_to_hex(&signature);
        assert_eq!(encoded.len(), 2 + 130);

        let decoded = signature_from_hex(&encoded).unwrap();
        assert_eq!(decoded, signature);
        assert_eq!(
            recover_signer(&payload.signing_hash(), &decoded).unwrap(),
            signer.get_address().await.unwrap()
        );
    }

    #[tokio::test]
    async fn zero_based_recovery_id_is_accepted() {
        let signer = LocalWalletSigner::random();
        let payload = LocalFhevmInstance::default()
            .create_eip712("0x01", &[Address::repeat_byte(3)], 100, 1)
            .unwrap();
        let signature = signer.sign_typed_data(&payload).await.unwrap();

        let mut raw = signature.as_bytes();
        assert!(raw[64] == 27 || raw[64] == 28);
        raw[64] -= 27;
        let decoded = signature_from_hex(&format!("0x{}", hex::encode(raw))).unwrap();
        assert_eq!(decoded, signature);
        assert_eq!(
            recover_signer(&payload.signing_hash(), &decoded).unwrap(),
            signer.address()
        );
    }

    #[test]
    fn short_signatures_are_rejected() {
        assert!(signature_from_hex("0x0102").is_err());
        assert!(signature_from_hex("0xnothex").is_err());
    }

    #[tokio::test]
    async fn test_signers() {
        let counting = testing::CountingSigner::new(LocalWalletSigner::random());
        let payload = LocalFhevmInstance::default()
            .create_eip712("0x01", &[], 0, 0)
            .unwrap();
        counting.sign_typed_data(&payload).await.unwrap();
        assert_eq!(counting.sign_requests(), 1);

        let rejecting = testing::RejectingSigner::new(Address::repeat_byte(9));
        assert!(rejecting.sign_typed_data(&payload).await.is_err());
        assert_eq!(rejecting.sign_requests(), 1);
        assert_eq!(
            rejecting.get_address().await.unwrap(),
            Address::repeat_byte(9)
        );
    }
}
