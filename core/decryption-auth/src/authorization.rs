use crate::consts::{DEFAULT_DURATION_DAYS, SECONDS_PER_DAY};
use crate::eip712::UserDecryptEip712;
use crate::error::AuthError;
use crate::instance::{FhevmInstance, HandleContractPair, UserDecryptRequest};
use crate::signer::{recover_signer, signature_from_hex, signature_to_hex, DecryptionSigner};
use crate::storage::GenericStringStorage;
use crate::storage_key::StorageKey;
use crate::validation::{parse_public_key, sort_contract_addresses};
use crate::{count_error, count_request, now_secs};
use alloy_primitives::Address;
use error_utils::log_and_discard;
use observability::metrics::{CacheOutcome, METRICS};
use observability::metrics_names::{
    ERR_INSTANCE, ERR_INVALID_INPUT, ERR_SIGNER_REJECTED, ERR_STORAGE, OP_LOAD_AUTHORIZATION,
    OP_MINT_AUTHORIZATION, OP_PERSIST_AUTHORIZATION,
};
use serde::{Deserialize, Serialize};

/// A signed, time-boxed permission to decrypt ciphertexts of a set of contracts.
///
/// Immutable once built. The EIP-712 payload that was signed is kept alongside
/// the signature so the authorization can be checked again with [Self::verify].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionAuthorization {
    public_key: String,
    private_key: String,
    signature: String,
    start_timestamp: u64,
    duration_days: u64,
    user_address: Address,
    contract_addresses: Vec<Address>,
    eip712: UserDecryptEip712,
}

/// Result of looking an authorization up in a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(Box<DecryptionAuthorization>),
    Miss,
    Stale,
    Corrupt,
}

impl CacheLookup {
    pub fn into_option(self) -> Option<DecryptionAuthorization> {
        match self {
            CacheLookup::Hit(auth) => Some(*auth),
            _ => None,
        }
    }

    fn outcome(&self) -> CacheOutcome {
        match self {
            CacheLookup::Hit(_) => CacheOutcome::Hit,
            CacheLookup::Miss => CacheOutcome::Miss,
            CacheLookup::Stale | CacheLookup::Corrupt => CacheOutcome::StaleOrCorrupt,
        }
    }
}

impl DecryptionAuthorization {
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    pub fn duration_days(&self) -> u64 {
        self.duration_days
    }

    pub fn user_address(&self) -> Address {
        self.user_address
    }

    pub fn contract_addresses(&self) -> &[Address] {
        &self.contract_addresses
    }

    pub fn eip712(&self) -> &UserDecryptEip712 {
        &self.eip712
    }

    /// First second at which the authorization is no longer valid.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at()
    }

    /// Whether the validity window still covers the current time.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_secs())
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self, AuthError> {
        let auth: Self = serde_json::from_str(input)
            .map_err(|e| AuthError::CorruptAuthorization(e.to_string()))?;
        auth.check_shape()
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, AuthError> {
        let auth: Self = serde_json::from_value(value)
            .map_err(|e| AuthError::CorruptAuthorization(e.to_string()))?;
        auth.check_shape()
    }

    fn check_shape(self) -> Result<Self, AuthError> {
        if !self.contract_addresses.windows(2).all(|w| w[0] <= w[1]) {
            return Err(AuthError::CorruptAuthorization(
                "contract addresses are not sorted".to_string(),
            ));
        }
        Ok(self)
    }

    /// The request handed to the instance to decrypt `handles` with this authorization.
    pub fn user_decrypt_request(&self, handles: Vec<HandleContractPair>) -> UserDecryptRequest {
        UserDecryptRequest {
            handles,
            private_key: self.private_key.clone(),
            public_key: self.public_key.clone(),
            signature: self.signature.clone(),
            contract_addresses: self.contract_addresses.clone(),
            user_address: self.user_address,
            start_timestamp: self.start_timestamp,
            duration_days: self.duration_days,
        }
    }

    /// Check that the signature was produced by [Self::user_address] over the
    /// embedded payload, and that the payload describes this authorization.
    pub fn verify(&self) -> anyhow::Result<()> {
        if !self.eip712.is_canonical() {
            anyhow::bail!("payload is not a user decryption request");
        }
        let message = &self.eip712.message;
        if message.public_key.as_ref() != parse_public_key(&self.public_key)?.as_slice() {
            anyhow::bail!("payload public key differs from the authorization public key");
        }
        if message.contract_addresses != self.contract_addresses {
            anyhow::bail!("payload contracts differ from the authorization contracts");
        }
        if message.start_timestamp != self.start_timestamp
            || message.duration_days != self.duration_days
        {
            anyhow::bail!("payload validity window differs from the authorization window");
        }
        let signature = signature_from_hex(&self.signature)?;
        let recovered = recover_signer(&self.eip712.signing_hash(), &signature)?;
        if recovered != self.user_address {
            anyhow::bail!(
                "signature was produced by {recovered}, expected {}",
                self.user_address
            );
        }
        Ok(())
    }

    /// Write the authorization to `store`, best-effort.
    ///
    /// The key covers the own public key only when `include_public_key` is set.
    /// Failures are logged and reported as `false`, never as an error: the
    /// caller already holds a usable authorization.
    pub async fn persist<S, I>(&self, store: &mut S, instance: &I, include_public_key: bool) -> bool
    where
        S: GenericStringStorage,
        I: FhevmInstance + ?Sized,
    {
        count_request(OP_PERSIST_AUTHORIZATION);
        let public_key = include_public_key.then_some(self.public_key.as_str());
        let Some(key) = log_and_discard(
            StorageKey::for_address(
                instance,
                &self.contract_addresses,
                self.user_address,
                public_key,
            ),
            "Could not derive the storage key of an authorization",
        ) else {
            count_error(OP_PERSIST_AUTHORIZATION, ERR_STORAGE);
            return false;
        };
        let Some(json) = log_and_discard(self.to_json(), "Could not serialize an authorization")
        else {
            count_error(OP_PERSIST_AUTHORIZATION, ERR_STORAGE);
            return false;
        };
        match store.set_item(&key.to_string(), &json).await {
            Ok(()) => {
                tracing::info!(
                    "Persisted authorization of {} under {key} in {}",
                    self.user_address,
                    store.info()
                );
                true
            }
            Err(e) => {
                tracing::warn!("Could not persist authorization under {key}: {e}");
                count_error(OP_PERSIST_AUTHORIZATION, ERR_STORAGE);
                false
            }
        }
    }

    /// Look up a still valid authorization.
    ///
    /// A malformed user address is an error. Everything else that goes wrong
    /// during the lookup is a miss, including a public key hint that is not
    /// hex, an unreadable store or an entry that does not parse.
    pub async fn load<S, I>(
        store: &S,
        instance: &I,
        contract_addresses: &[Address],
        user_address: &str,
        public_key: Option<&str>,
    ) -> Result<Option<Self>, AuthError>
    where
        S: GenericStringStorage,
        I: FhevmInstance + ?Sized,
    {
        let key = match StorageKey::derive(instance, contract_addresses, user_address, public_key)
        {
            Ok(key) => key,
            Err(e @ AuthError::InvalidAddress(_)) => {
                count_error(OP_LOAD_AUTHORIZATION, ERR_INVALID_INPUT);
                return Err(e);
            }
            Err(AuthError::InvalidPublicKey(pk)) => {
                tracing::warn!("Public key {pk:?} is not hex, nothing can be cached for it");
                count_error(OP_LOAD_AUTHORIZATION, ERR_INVALID_INPUT);
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!("Could not derive the storage key: {e}");
                count_error(OP_LOAD_AUTHORIZATION, ERR_INSTANCE);
                return Ok(None);
            }
        };
        Ok(Self::lookup(store, &key, contract_addresses).await.into_option())
    }

    /// Same as [Self::load] but for an already derived key, telling apart why
    /// nothing usable was found.
    pub async fn lookup<S: GenericStringStorage>(
        store: &S,
        key: &StorageKey,
        contract_addresses: &[Address],
    ) -> CacheLookup {
        count_request(OP_LOAD_AUTHORIZATION);
        let res = Self::lookup_inner(store, key, contract_addresses, now_secs()).await;
        METRICS.increment_cache_counter(res.outcome());
        res
    }

    async fn lookup_inner<S: GenericStringStorage>(
        store: &S,
        key: &StorageKey,
        contract_addresses: &[Address],
        now: u64,
    ) -> CacheLookup {
        let raw = match store.get_item(&key.to_string()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("No authorization under {key}");
                return CacheLookup::Miss;
            }
            Err(e) => {
                tracing::warn!("Could not read {key} from {}: {e}", store.info());
                count_error(OP_LOAD_AUTHORIZATION, ERR_STORAGE);
                return CacheLookup::Miss;
            }
        };
        let auth = match Self::from_json(&raw) {
            Ok(auth) => auth,
            Err(e) => {
                tracing::warn!("Discarding unreadable authorization under {key}: {e}");
                return CacheLookup::Corrupt;
            }
        };
        if auth.user_address != key.user_address()
            || auth.contract_addresses != sort_contract_addresses(contract_addresses.to_vec())
        {
            tracing::warn!("Discarding authorization under {key}, it was issued for other inputs");
            return CacheLookup::Corrupt;
        }
        if !auth.is_valid_at(now) {
            tracing::debug!("Authorization under {key} expired at {}", auth.expires_at());
            return CacheLookup::Stale;
        }
        tracing::debug!("Found authorization under {key}");
        CacheLookup::Hit(Box::new(auth))
    }

    /// Sign a new authorization valid for [DEFAULT_DURATION_DAYS] from now.
    ///
    /// `None` when anything in the chain fails, a refused signing prompt included.
    pub async fn mint<I, W>(
        instance: &I,
        contract_addresses: &[Address],
        public_key: &str,
        private_key: &str,
        signer: &W,
    ) -> Option<Self>
    where
        I: FhevmInstance + ?Sized,
        W: DecryptionSigner,
    {
        Self::mint_with_window(
            instance,
            contract_addresses,
            public_key,
            private_key,
            signer,
            now_secs(),
            DEFAULT_DURATION_DAYS,
        )
        .await
    }

    /// Same as [Self::mint] with an explicit validity window.
    pub async fn mint_with_window<I, W>(
        instance: &I,
        contract_addresses: &[Address],
        public_key: &str,
        private_key: &str,
        signer: &W,
        start_timestamp: u64,
        duration_days: u64,
    ) -> Option<Self>
    where
        I: FhevmInstance + ?Sized,
        W: DecryptionSigner,
    {
        count_request(OP_MINT_AUTHORIZATION);
        let _timer = METRICS.time_operation(OP_MINT_AUTHORIZATION);
        let res = Self::try_mint(
            instance,
            contract_addresses,
            public_key,
            private_key,
            signer,
            start_timestamp,
            duration_days,
        )
        .await;
        if res.is_err() {
            count_error(OP_MINT_AUTHORIZATION, ERR_SIGNER_REJECTED);
        }
        log_and_discard(res, "No authorization available")
    }

    async fn try_mint<I, W>(
        instance: &I,
        contract_addresses: &[Address],
        public_key: &str,
        private_key: &str,
        signer: &W,
        start_timestamp: u64,
        duration_days: u64,
    ) -> anyhow::Result<Self>
    where
        I: FhevmInstance + ?Sized,
        W: DecryptionSigner,
    {
        let user_address = signer.get_address().await?;
        let contract_addresses = sort_contract_addresses(contract_addresses.to_vec());
        let eip712 = instance.create_eip712(
            public_key,
            &contract_addresses,
            start_timestamp,
            duration_days,
        )?;
        let signature = signer.sign_typed_data(&eip712).await?;
        tracing::info!(
            "Minted authorization of {user_address} for {} contract(s), valid {duration_days} day(s)",
            contract_addresses.len()
        );
        Ok(Self {
            public_key: public_key.to_string(),
            private_key: private_key.to_string(),
            signature: signature_to_hex(&signature),
            start_timestamp,
            duration_days,
            user_address,
            contract_addresses,
            eip712,
        })
    }
}
