//! End to end behaviour of the authorization cache, with the mocked instance.

use alloy_primitives::{address, Address, U256};
use decryption_auth::authorization::DecryptionAuthorization;
use decryption_auth::decryptor::{decrypt_handles, load_or_sign};
use decryption_auth::instance::{FhevmInstance, HandleContractPair};
use decryption_auth::mock::MockFhevmInstance;
use decryption_auth::signer::testing::{CountingSigner, RejectingSigner};
use decryption_auth::signer::{DecryptionSigner, LocalWalletSigner};
use decryption_auth::storage::{FailingRamStorage, FileStringStorage, RamStringStorage};
use decryption_auth::storage_key::StorageKey;

const CONTRACT_A: Address = address!("0x0101010101010101010101010101010101010101");
const CONTRACT_B: Address = address!("0x0202020202020202020202020202020202020202");

#[tokio::test]
async fn cache_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let instance = MockFhevmInstance::default();
    let signer = CountingSigner::new(LocalWalletSigner::random());

    let minted = {
        let mut store = FileStringStorage::new(dir.path()).unwrap();
        load_or_sign(&instance, &[CONTRACT_B, CONTRACT_A], &signer, &mut store, None)
            .await
            .unwrap()
            .unwrap()
    };

    // a new store on the same directory, contracts in the other order
    let mut store = FileStringStorage::new(dir.path()).unwrap();
    let reused = load_or_sign(&instance, &[CONTRACT_A, CONTRACT_B], &signer, &mut store, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reused, minted);
    assert_eq!(signer.sign_requests(), 1);
    reused.verify().unwrap();
}

#[tokio::test]
async fn storage_key_example() {
    let instance = MockFhevmInstance::default();
    let user = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    let hint = Some("0xabcdef");
    let a = StorageKey::derive(&instance, &[CONTRACT_B, CONTRACT_A], user, hint).unwrap();
    let b = StorageKey::derive(&instance, &[CONTRACT_A, CONTRACT_B], user, hint).unwrap();
    assert_eq!(a.to_string(), b.to_string());
    assert!(a.to_string().starts_with(&format!("{user}:0x")));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn rejected_prompt_is_none_and_writes_nothing() {
    let instance = MockFhevmInstance::default();
    let signer = RejectingSigner::new(Address::repeat_byte(0x77));
    let mut store = RamStringStorage::new();
    let res = load_or_sign(&instance, &[CONTRACT_A], &signer, &mut store, None)
        .await
        .unwrap();
    assert!(res.is_none());
    assert!(store.is_empty());
    assert!(logs_contain("No authorization available"));
}

#[tokio::test]
async fn unreliable_store_does_not_break_decryption() {
    let instance = MockFhevmInstance::default();
    let signer = CountingSigner::new(LocalWalletSigner::random());
    let user = signer.get_address().await.unwrap();
    let mut store = FailingRamStorage::new(0);

    let handle = instance
        .insert_ciphertext(CONTRACT_A, &[user], U256::from(21))
        .await;
    let handles = [HandleContractPair {
        handle,
        contract_address: CONTRACT_A,
    }];
    let res = decrypt_handles(&instance, &handles, &signer, &mut store, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(res[&handle], U256::from(21));
    assert_eq!(store.failed_writes(), 1);
}

#[tokio::test]
async fn expired_entry_is_replaced() {
    let instance = MockFhevmInstance::default();
    let signer = CountingSigner::new(LocalWalletSigner::random());
    let mut store = RamStringStorage::new();
    let keypair = instance.generate_keypair().unwrap();

    // an authorization that ran out long ago, sitting in the right slot
    let expired = DecryptionAuthorization::mint_with_window(
        &instance,
        &[CONTRACT_A],
        &keypair.public_key,
        &keypair.private_key,
        &signer,
        1_000,
        1,
    )
    .await
    .unwrap();
    assert!(expired.persist(&mut store, &instance, false).await);

    let fresh = load_or_sign(&instance, &[CONTRACT_A], &signer, &mut store, None)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(fresh, expired);
    assert!(fresh.is_valid());
    assert_eq!(signer.sign_requests(), 2);
    // overwritten in place
    assert_eq!(store.len(), 1);
}
