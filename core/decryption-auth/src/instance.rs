//! Capabilities of the FHE instance the authorizations are built for.

use crate::consts::{
    DEFAULT_EXTRA_DATA, DEFAULT_GATEWAY_CHAIN_ID, DEFAULT_VERIFYING_CONTRACT_DECRYPTION,
    EIP712_DOMAIN_NAME, EIP712_DOMAIN_VERSION, LOCAL_CHAIN_ID,
};
use crate::eip712::{UserDecryptEip712, UserDecryptMessage};
use crate::validation::parse_public_key;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::Eip712Domain;
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

/// Ephemeral key pair results are re-encrypted under, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhevmKeypair {
    pub public_key: String,
    pub private_key: String,
}

/// A ciphertext handle together with the contract that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleContractPair {
    pub handle: B256,
    pub contract_address: Address,
}

/// Everything a user decryption needs, usually taken from an authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDecryptRequest {
    pub handles: Vec<HandleContractPair>,
    pub private_key: String,
    pub public_key: String,
    pub signature: String,
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

/// Result of encrypting inputs for a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedInput {
    pub handles: Vec<B256>,
    pub input_proof: Bytes,
}

/// Typed-data construction and key generation.
pub trait FhevmInstance {
    /// Build the user decryption payload for the given key and contract set.
    ///
    /// Contracts are taken in the given order, callers sort them beforehand.
    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> anyhow::Result<UserDecryptEip712>;

    fn generate_keypair(&self) -> anyhow::Result<FhevmKeypair>;
}

#[trait_variant::make(Send)]
pub trait FhevmDecryptor {
    /// Decrypt the handles, returning one cleartext per handle.
    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> anyhow::Result<HashMap<B256, U256>>;
}

#[trait_variant::make(Send)]
pub trait EncryptedInputBuilder {
    fn add_bool(&mut self, value: bool) -> &mut Self;
    fn add32(&mut self, value: u32) -> &mut Self;
    fn add64(&mut self, value: u64) -> &mut Self;
    async fn encrypt(self) -> anyhow::Result<EncryptedInput>;
}

pub trait FhevmEncryptor {
    type Builder: EncryptedInputBuilder;

    fn create_encrypted_input(&self, contract_address: Address, user_address: Address)
        -> Self::Builder;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FhevmInstanceConfig {
    /// Chain of the contracts holding the ciphertexts.
    pub chain_id: u64,
    /// Chain of the decryption verifier, used as the EIP-712 domain chain id.
    pub gateway_chain_id: u64,
    pub verifying_contract_address_decryption: Address,
}

impl Default for FhevmInstanceConfig {
    fn default() -> Self {
        Self {
            chain_id: LOCAL_CHAIN_ID,
            gateway_chain_id: DEFAULT_GATEWAY_CHAIN_ID,
            verifying_contract_address_decryption: DEFAULT_VERIFYING_CONTRACT_DECRYPTION,
        }
    }
}

/// Instance capabilities that need no network access.
#[derive(Debug, Clone, Default)]
pub struct LocalFhevmInstance {
    config: FhevmInstanceConfig,
}

impl LocalFhevmInstance {
    pub fn new(config: FhevmInstanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FhevmInstanceConfig {
        &self.config
    }

    pub fn domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(Cow::Borrowed(EIP712_DOMAIN_NAME)),
            Some(Cow::Borrowed(EIP712_DOMAIN_VERSION)),
            Some(U256::from(self.config.gateway_chain_id)),
            Some(self.config.verifying_contract_address_decryption),
            None,
        )
    }

    /// Whether `private_key` is the secret half of `public_key`.
    pub fn keypair_matches(public_key: &str, private_key: &str) -> bool {
        let (Ok(pk), Ok(sk)) = (parse_public_key(public_key), parse_public_key(private_key))
        else {
            return false;
        };
        match SigningKey::from_slice(&sk) {
            Ok(signing_key) => {
                signing_key
                    .verifying_key()
                    .to_encoded_point(true)
                    .as_bytes()
                    == pk.as_slice()
            }
            Err(_) => false,
        }
    }
}

impl FhevmInstance for LocalFhevmInstance {
    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> anyhow::Result<UserDecryptEip712> {
        let public_key = parse_public_key(public_key)?;
        let message = UserDecryptMessage {
            public_key: public_key.into(),
            contract_addresses: contract_addresses.to_vec(),
            contracts_chain_id: self.config.chain_id,
            start_timestamp,
            duration_days,
            extra_data: Bytes::copy_from_slice(&DEFAULT_EXTRA_DATA),
        };
        Ok(UserDecryptEip712::new(self.domain(), message))
    }

    fn generate_keypair(&self) -> anyhow::Result<FhevmKeypair> {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let public_key = signing_key.verifying_key().to_encoded_point(true);
        Ok(FhevmKeypair {
            public_key: format!("0x{}", hex::encode(public_key.as_bytes())),
            private_key: format!("0x{}", hex::encode(signing_key.to_bytes())),
        })
    }
}
