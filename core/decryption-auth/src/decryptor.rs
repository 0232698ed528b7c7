//! Cache-then-sign flow and the decryption built on top of it.

use crate::authorization::DecryptionAuthorization;
use crate::consts::DEFAULT_DURATION_DAYS;
use crate::error::AuthError;
use crate::instance::{FhevmDecryptor, FhevmInstance, FhevmKeypair, HandleContractPair};
use crate::signer::DecryptionSigner;
use crate::storage::GenericStringStorage;
use crate::{count_error, count_request, now_secs};
use alloy_primitives::{Address, B256, U256};
use error_utils::log_and_discard;
use observability::metrics::METRICS;
use observability::metrics_names::{
    ERR_INSTANCE, ERR_SIGNER_REJECTED, OP_LOAD_OR_SIGN, OP_USER_DECRYPT,
};
use std::collections::HashMap;

/// Return a valid cached authorization, or sign and cache a new one.
///
/// When `keypair` is given its public key is part of the cache key and of the
/// new authorization, otherwise a fresh pair is generated by the instance.
/// While a cached entry is valid, repeated calls neither prompt the signer nor
/// write to the store.
///
/// `Ok(None)` means no authorization is available right now: the signer
/// refused, the key pair is unusable or any other collaborator failed. Errors
/// are reserved for malformed addresses.
pub async fn load_or_sign<I, W, S>(
    instance: &I,
    contract_addresses: &[Address],
    signer: &W,
    store: &mut S,
    keypair: Option<&FhevmKeypair>,
) -> Result<Option<DecryptionAuthorization>, AuthError>
where
    I: FhevmInstance + ?Sized,
    W: DecryptionSigner,
    S: GenericStringStorage,
{
    load_or_sign_for(
        instance,
        contract_addresses,
        signer,
        store,
        keypair,
        DEFAULT_DURATION_DAYS,
    )
    .await
}

/// Same as [load_or_sign], minting for `duration_days` on a miss.
///
/// The cache key does not depend on the duration, an entry minted with a
/// different duration is returned as long as it is valid.
#[tracing::instrument(
    skip_all,
    fields(contracts = contract_addresses.len(), with_keypair = keypair.is_some())
)]
pub async fn load_or_sign_for<I, W, S>(
    instance: &I,
    contract_addresses: &[Address],
    signer: &W,
    store: &mut S,
    keypair: Option<&FhevmKeypair>,
    duration_days: u64,
) -> Result<Option<DecryptionAuthorization>, AuthError>
where
    I: FhevmInstance + ?Sized,
    W: DecryptionSigner,
    S: GenericStringStorage,
{
    count_request(OP_LOAD_OR_SIGN);
    let _timer = METRICS.time_operation(OP_LOAD_OR_SIGN);

    let Some(user_address) = log_and_discard(
        signer.get_address().await,
        "Could not get the address of the signer",
    ) else {
        count_error(OP_LOAD_OR_SIGN, ERR_SIGNER_REJECTED);
        return Ok(None);
    };

    let hint = keypair.map(|k| k.public_key.as_str());
    if let Some(cached) = DecryptionAuthorization::load(
        store,
        instance,
        contract_addresses,
        &user_address.to_string(),
        hint,
    )
    .await?
    {
        tracing::debug!("Reusing authorization of {user_address}");
        return Ok(Some(cached));
    }

    let caller_supplied = keypair.is_some();
    let keypair = match keypair {
        Some(k) => k.clone(),
        None => match log_and_discard(
            instance.generate_keypair(),
            "Could not generate a key pair",
        ) {
            Some(k) => k,
            None => {
                count_error(OP_LOAD_OR_SIGN, ERR_INSTANCE);
                return Ok(None);
            }
        },
    };

    let Some(auth) = DecryptionAuthorization::mint_with_window(
        instance,
        contract_addresses,
        &keypair.public_key,
        &keypair.private_key,
        signer,
        now_secs(),
        duration_days,
    )
    .await
    else {
        return Ok(None);
    };

    auth.persist(store, instance, caller_supplied).await;
    Ok(Some(auth))
}

/// Decrypt `handles` for the signer, signing a new authorization when needed.
///
/// The authorization covers exactly the contracts the handles belong to.
/// `Ok(None)` when no authorization is available or the decryption failed.
pub async fn decrypt_handles<I, W, S>(
    instance: &I,
    handles: &[HandleContractPair],
    signer: &W,
    store: &mut S,
    keypair: Option<&FhevmKeypair>,
) -> Result<Option<HashMap<B256, U256>>, AuthError>
where
    I: FhevmInstance + FhevmDecryptor,
    W: DecryptionSigner,
    S: GenericStringStorage,
{
    let mut contracts: Vec<Address> = handles.iter().map(|h| h.contract_address).collect();
    contracts.sort();
    contracts.dedup();

    let Some(auth) = load_or_sign(instance, &contracts, signer, store, keypair).await? else {
        return Ok(None);
    };

    count_request(OP_USER_DECRYPT);
    let _timer = METRICS.time_operation(OP_USER_DECRYPT);
    let res = instance
        .user_decrypt(auth.user_decrypt_request(handles.to_vec()))
        .await;
    if res.is_err() {
        count_error(OP_USER_DECRYPT, ERR_INSTANCE);
    }
    Ok(log_and_discard(res, "User decryption failed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::LocalFhevmInstance;
    use crate::mock::MockFhevmInstance;
    use crate::signer::testing::{CountingSigner, RejectingSigner};
    use crate::signer::LocalWalletSigner;
    use crate::storage::{FailingRamStorage, RamStringStorage};
    use crate::storage_key::StorageKey;

    fn contracts() -> [Address; 2] {
        [Address::repeat_byte(0x02), Address::repeat_byte(0x01)]
    }

    #[tokio::test]
    async fn second_call_is_a_pure_hit() {
        let instance = LocalFhevmInstance::default();
        let signer = CountingSigner::new(LocalWalletSigner::random());
        let mut store = FailingRamStorage::new(1);

        let first = load_or_sign(&instance, &contracts(), &signer, &mut store, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signer.sign_requests(), 1);
        assert_eq!(store.inner().len(), 1);

        // a write would fail now, a hit must not write
        let second = load_or_sign(&instance, &contracts(), &signer, &mut store, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(signer.sign_requests(), 1);
        assert_eq!(store.failed_writes(), 0);
    }

    #[tokio::test]
    async fn permutation_hits_the_same_slot() {
        let instance = LocalFhevmInstance::default();
        let signer = CountingSigner::new(LocalWalletSigner::random());
        let mut store = RamStringStorage::new();
        let [b, a] = contracts();

        let minted = load_or_sign(&instance, &[b, a], &signer, &mut store, None)
            .await
            .unwrap()
            .unwrap();
        let found = load_or_sign(&instance, &[a, b], &signer, &mut store, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, minted);
        assert_eq!(signer.sign_requests(), 1);
    }

    #[tokio::test]
    async fn caller_keypair_is_part_of_the_key() {
        let instance = LocalFhevmInstance::default();
        let signer = CountingSigner::new(LocalWalletSigner::random());
        let mut store = RamStringStorage::new();
        let keypair = instance.generate_keypair().unwrap();

        let auth = load_or_sign(&instance, &contracts(), &signer, &mut store, Some(&keypair))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auth.public_key(), keypair.public_key);
        assert_eq!(auth.private_key(), keypair.private_key);

        let user = signer.get_address().await.unwrap();
        let key = StorageKey::for_address(&instance, &contracts(), user, Some(&keypair.public_key))
            .unwrap();
        assert_eq!(store.keys().collect::<Vec<_>>(), vec![key.to_string().as_str()]);

        // without the hint the slot differs, so this signs again
        load_or_sign(&instance, &contracts(), &signer, &mut store, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signer.sign_requests(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn rejection_leaves_the_store_untouched() {
        let instance = LocalFhevmInstance::default();
        let signer = RejectingSigner::new(Address::repeat_byte(0x0a));
        let mut store = RamStringStorage::new();

        let res = load_or_sign(&instance, &contracts(), &signer, &mut store, None)
            .await
            .unwrap();
        assert!(res.is_none());
        assert_eq!(signer.sign_requests(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn persist_failure_still_returns_the_authorization() {
        let instance = LocalFhevmInstance::default();
        let signer = CountingSigner::new(LocalWalletSigner::random());
        let mut store = FailingRamStorage::new(0);

        let auth = load_or_sign(&instance, &contracts(), &signer, &mut store, None)
            .await
            .unwrap();
        assert!(auth.is_some());
        assert_eq!(store.failed_writes(), 1);

        // nothing was cached, so the next call signs again
        load_or_sign(&instance, &contracts(), &signer, &mut store, None)
            .await
            .unwrap();
        assert_eq!(signer.sign_requests(), 2);
    }

    #[tokio::test]
    async fn non_hex_public_key_is_unavailable() {
        let instance = LocalFhevmInstance::default();
        let signer = CountingSigner::new(LocalWalletSigner::random());
        let mut store = RamStringStorage::new();
        let keypair = FhevmKeypair {
            public_key: "pkHintX".to_string(),
            private_key: "0x01".to_string(),
        };
        let res = load_or_sign(&instance, &contracts(), &signer, &mut store, Some(&keypair))
            .await
            .unwrap();
        assert!(res.is_none());
        assert_eq!(signer.sign_requests(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn custom_duration() {
        let instance = LocalFhevmInstance::default();
        let signer = CountingSigner::new(LocalWalletSigner::random());
        let mut store = RamStringStorage::new();
        let auth = load_or_sign_for(&instance, &contracts(), &signer, &mut store, None, 7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auth.duration_days(), 7);

        // same slot whatever the duration asked for
        let again = load_or_sign(&instance, &contracts(), &signer, &mut store, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.duration_days(), 7);
        assert_eq!(signer.sign_requests(), 1);
    }

    #[tokio::test]
    async fn decrypt_through_the_cache() {
        let instance = MockFhevmInstance::default();
        let signer = CountingSigner::new(LocalWalletSigner::random());
        let user = signer.get_address().await.unwrap();
        let mut store = RamStringStorage::new();
        let [c2, c1] = contracts();

        let h1 = instance.insert_ciphertext(c1, &[user], U256::from(4)).await;
        let h2 = instance.insert_ciphertext(c2, &[user], U256::from(9)).await;
        let handles = [
            HandleContractPair {
                handle: h2,
                contract_address: c2,
            },
            HandleContractPair {
                handle: h1,
                contract_address: c1,
            },
        ];

        let res = decrypt_handles(&instance, &handles, &signer, &mut store, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(res[&h1], U256::from(4));
        assert_eq!(res[&h2], U256::from(9));

        let again = decrypt_handles(&instance, &handles[..1], &signer, &mut store, None)
            .await
            .unwrap();
        // a single contract is another slot
        assert!(again.is_some());
        let again = decrypt_handles(&instance, &handles, &signer, &mut store, None)
            .await
            .unwrap();
        assert_eq!(again, Some(res));
        assert_eq!(signer.sign_requests(), 2);
        assert_eq!(instance.decrypt_calls(), 3);
    }

    #[tokio::test]
    async fn decrypt_without_access_is_none() {
        let instance = MockFhevmInstance::default();
        let signer = CountingSigner::new(LocalWalletSigner::random());
        let mut store = RamStringStorage::new();
        let [c, _] = contracts();
        let handle = instance
            .insert_ciphertext(c, &[Address::repeat_byte(0x44)], U256::from(1))
            .await;
        let res = decrypt_handles(
            &instance,
            &[HandleContractPair {
                handle,
                contract_address: c,
            }],
            &signer,
            &mut store,
            None,
        )
        .await
        .unwrap();
        assert!(res.is_none());
        // the authorization itself is still cached
        assert_eq!(store.len(), 1);
    }
}
