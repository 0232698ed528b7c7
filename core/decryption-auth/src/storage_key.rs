use crate::consts::ZERO_ADDRESS_SENTINEL;
use crate::error::AuthError;
use crate::instance::FhevmInstance;
use crate::validation::{parse_public_key, parse_user_address, sort_contract_addresses};
use alloy_primitives::{Address, B256};
use std::fmt;

/// Cache slot of an authorization, rendered as `{userAddress}:0x{digest}`.
///
/// The digest is the EIP-712 signing hash of a payload with a zero start
/// timestamp and a zero duration, so the slot of a (user, contracts, public key)
/// triple does not depend on the validity window of what is stored in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageKey {
    user_address: Address,
    digest: B256,
}

impl StorageKey {
    /// Derive the key from a textual user address.
    ///
    /// Fails with [AuthError::InvalidAddress] on a malformed address and with
    /// [AuthError::InvalidPublicKey] on a public key hint that is not hex.
    pub fn derive<I: FhevmInstance + ?Sized>(
        instance: &I,
        contract_addresses: &[Address],
        user_address: &str,
        public_key: Option<&str>,
    ) -> Result<Self, AuthError> {
        let user_address = parse_user_address(user_address)?;
        Self::for_address(instance, contract_addresses, user_address, public_key)
    }

    pub fn for_address<I: FhevmInstance + ?Sized>(
        instance: &I,
        contract_addresses: &[Address],
        user_address: Address,
        public_key: Option<&str>,
    ) -> Result<Self, AuthError> {
        let public_key = match public_key {
            Some(pk) => {
                parse_public_key(pk)?;
                pk
            }
            None => ZERO_ADDRESS_SENTINEL,
        };
        let sorted = sort_contract_addresses(contract_addresses.to_vec());
        let payload = instance
            .create_eip712(public_key, &sorted, 0, 0)
            .map_err(AuthError::Instance)?;
        Ok(Self {
            user_address,
            digest: payload.signing_hash(),
        })
    }

    pub fn user_address(&self) -> Address {
        self.user_address
    }

    pub fn digest(&self) -> B256 {
        self.digest
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:0x{}",
            self.user_address.to_checksum(None),
            hex::encode(self.digest)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::LocalFhevmInstance;

    const USER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn contracts() -> (Address, Address) {
        (Address::repeat_byte(0x01), Address::repeat_byte(0x02))
    }

    #[test]
    fn permutations_share_a_key() {
        let instance = LocalFhevmInstance::default();
        let (a, b) = contracts();
        let forward = StorageKey::derive(&instance, &[a, b], USER, Some("0xabcd")).unwrap();
        let backward = StorageKey::derive(&instance, &[b, a], USER, Some("0xabcd")).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.to_string(), backward.to_string());
    }

    #[test]
    fn key_shape() {
        let instance = LocalFhevmInstance::default();
        let (a, _) = contracts();
        let key = StorageKey::derive(&instance, &[a], &USER.to_lowercase(), None).unwrap();
        let rendered = key.to_string();
        let (user, digest) = rendered.split_once(':').unwrap();
        // always the checksummed form, whatever the input case
        assert_eq!(user, USER);
        assert!(digest.starts_with("0x"));
        assert_eq!(digest.len(), 2 + 64);
    }

    #[test]
    fn inputs_that_change_the_key() {
        let instance = LocalFhevmInstance::default();
        let (a, b) = contracts();
        let base = StorageKey::derive(&instance, &[a, b], USER, None).unwrap();

        let with_key = StorageKey::derive(&instance, &[a, b], USER, Some("0xabcd")).unwrap();
        assert_ne!(base, with_key);

        let fewer = StorageKey::derive(&instance, &[a], USER, None).unwrap();
        assert_ne!(base.digest(), fewer.digest());

        let other_user = StorageKey::derive(
            &instance,
            &[a, b],
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
            None,
        )
        .unwrap();
        // the digest does not cover the user, only the prefix differs
        assert_eq!(base.digest(), other_user.digest());
        assert_ne!(base.to_string(), other_user.to_string());
    }

    #[test]
    fn malformed_input_is_an_error() {
        let instance = LocalFhevmInstance::default();
        let (a, _) = contracts();
        assert!(matches!(
            StorageKey::derive(&instance, &[a], "0xABCD", None),
            Err(AuthError::InvalidAddress(_))
        ));
        assert!(matches!(
            StorageKey::derive(&instance, &[a], USER, Some("pkHintX")),
            Err(AuthError::InvalidPublicKey(_))
        ));
    }
}
