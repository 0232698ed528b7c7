//! In-process stand-in for an FHE instance and its decryption network.
//!
//! Ciphertexts are kept in clear in a table shared by every clone of the
//! instance. Access is granted per (user, contract) pair, like the on-chain ACL.

use crate::consts::SECONDS_PER_DAY;
use crate::eip712::UserDecryptEip712;
use crate::instance::{
    EncryptedInput, EncryptedInputBuilder, FhevmDecryptor, FhevmEncryptor, FhevmInstance,
    FhevmInstanceConfig, FhevmKeypair, LocalFhevmInstance, UserDecryptRequest,
};
use crate::now_secs;
use crate::signer::{recover_signer, signature_from_hex};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StoredCiphertext {
    value: U256,
    acl: HashSet<(Address, Address)>,
}

#[derive(Debug, Default)]
struct MockState {
    ciphertexts: HashMap<B256, StoredCiphertext>,
    nonce: u64,
}

impl MockState {
    fn new_handle(&mut self, contract: Address, user: Address, value: U256) -> B256 {
        self.nonce += 1;
        let mut preimage = Vec::with_capacity(8 + 20 + 20 + 32);
        preimage.extend_from_slice(&self.nonce.to_be_bytes());
        preimage.extend_from_slice(contract.as_slice());
        preimage.extend_from_slice(user.as_slice());
        preimage.extend_from_slice(&value.to_be_bytes::<32>());
        keccak256(preimage)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockFhevmInstance {
    local: LocalFhevmInstance,
    state: Arc<RwLock<MockState>>,
    decrypt_calls: Arc<std::sync::atomic::AtomicUsize>,
}

impl MockFhevmInstance {
    pub fn new(config: FhevmInstanceConfig) -> Self {
        Self {
            local: LocalFhevmInstance::new(config),
            ..Default::default()
        }
    }

    /// Store `value` as if `contract` had computed it, readable by `users`.
    pub async fn insert_ciphertext(
        &self,
        contract: Address,
        users: &[Address],
        value: U256,
    ) -> B256 {
        let mut state = self.state.write().await;
        let handle = state.new_handle(contract, Address::ZERO, value);
        let acl = users.iter().map(|user| (*user, contract)).collect();
        state
            .ciphertexts
            .insert(handle, StoredCiphertext { value, acl });
        handle
    }

    /// Grant `user` access to `handle` through `contract`.
    pub async fn allow(
        &self,
        handle: B256,
        user: Address,
        contract: Address,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let ct = state
            .ciphertexts
            .get_mut(&handle)
            .ok_or_else(|| anyhow::anyhow!("unknown handle {handle}"))?;
        ct.acl.insert((user, contract));
        Ok(())
    }

    /// Homomorphic addition, the result is readable by whoever could read `lhs`.
    pub async fn add(&self, lhs: B256, rhs: B256) -> anyhow::Result<B256> {
        let mut state = self.state.write().await;
        let (value, acl) = {
            let a = state
                .ciphertexts
                .get(&lhs)
                .ok_or_else(|| anyhow::anyhow!("unknown handle {lhs}"))?;
            let b = state
                .ciphertexts
                .get(&rhs)
                .ok_or_else(|| anyhow::anyhow!("unknown handle {rhs}"))?;
            (a.value.wrapping_add(b.value), a.acl.clone())
        };
        let handle = state.new_handle(Address::ZERO, Address::ZERO, value);
        state
            .ciphertexts
            .insert(handle, StoredCiphertext { value, acl });
        Ok(handle)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    fn check_authorization(&self, request: &UserDecryptRequest, now: u64) -> anyhow::Result<()> {
        if !LocalFhevmInstance::keypair_matches(&request.public_key, &request.private_key) {
            anyhow::bail!("private key does not match the public key");
        }
        let payload: UserDecryptEip712 = self.local.create_eip712(
            &request.public_key,
            &request.contract_addresses,
            request.start_timestamp,
            request.duration_days,
        )?;
        let signature = signature_from_hex(&request.signature)?;
        let signer = recover_signer(&payload.signing_hash(), &signature)?;
        if signer != request.user_address {
            anyhow::bail!("signature does not belong to {}", request.user_address);
        }
        let expires_at = request
            .start_timestamp
            .saturating_add(request.duration_days.saturating_mul(SECONDS_PER_DAY));
        if now < request.start_timestamp || now >= expires_at {
            anyhow::bail!("authorization is outside its validity window");
        }
        Ok(())
    }
}

impl FhevmInstance for MockFhevmInstance {
    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> anyhow::Result<UserDecryptEip712> {
        self.local
            .create_eip712(public_key, contract_addresses, start_timestamp, duration_days)
    }

    fn generate_keypair(&self) -> anyhow::Result<FhevmKeypair> {
        self.local.generate_keypair()
    }
}

impl FhevmDecryptor for MockFhevmInstance {
    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> anyhow::Result<HashMap<B256, U256>> {
        self.decrypt_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.check_authorization(&request, now_secs())?;
        let state = self.state.read().await;
        let mut res = HashMap::with_capacity(request.handles.len());
        for pair in &request.handles {
            if !request.contract_addresses.contains(&pair.contract_address) {
                anyhow::bail!(
                    "contract {} is not covered by the authorization",
                    pair.contract_address
                );
            }
            let ct = state
                .ciphertexts
                .get(&pair.handle)
                .ok_or_else(|| anyhow::anyhow!("unknown handle {}", pair.handle))?;
            if !ct.acl.contains(&(request.user_address, pair.contract_address)) {
                anyhow::bail!(
                    "{} may not decrypt {} through {}",
                    request.user_address,
                    pair.handle,
                    pair.contract_address
                );
            }
            res.insert(pair.handle, ct.value);
        }
        Ok(res)
    }
}

/// Collects clear values and registers them as ciphertexts on [Self::encrypt].
#[derive(Debug)]
pub struct MockInputBuilder {
    state: Arc<RwLock<MockState>>,
    contract: Address,
    user: Address,
    values: Vec<U256>,
}

impl EncryptedInputBuilder for MockInputBuilder {
    fn add_bool(&mut self, value: bool) -> &mut Self {
        self.values.push(U256::from(value as u8));
        self
    }

    fn add32(&mut self, value: u32) -> &mut Self {
        self.values.push(U256::from(value));
        self
    }

    fn add64(&mut self, value: u64) -> &mut Self {
        self.values.push(U256::from(value));
        self
    }

    async fn encrypt(self) -> anyhow::Result<EncryptedInput> {
        if self.values.is_empty() {
            anyhow::bail!("nothing to encrypt");
        }
        let mut state = self.state.write().await;
        let mut handles = Vec::with_capacity(self.values.len());
        for value in self.values {
            let handle = state.new_handle(self.contract, self.user, value);
            // the sender may read back what it encrypted, through the target contract
            let acl = HashSet::from([(self.user, self.contract)]);
            state
                .ciphertexts
                .insert(handle, StoredCiphertext { value, acl });
            handles.push(handle);
        }
        let mut proof = Vec::with_capacity(1 + 32 * handles.len());
        proof.push(handles.len() as u8);
        for handle in &handles {
            proof.extend_from_slice(handle.as_slice());
        }
        Ok(EncryptedInput {
            handles,
            input_proof: Bytes::from(proof),
        })
    }
}

impl FhevmEncryptor for MockFhevmInstance {
    type Builder = MockInputBuilder;

    fn create_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> Self::Builder {
        MockInputBuilder {
            state: Arc::clone(&self.state),
            contract: contract_address,
            user: user_address,
            values: Vec::new(),
        }
    }
}
