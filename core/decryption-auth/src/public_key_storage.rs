//! Cache of the network's FHE public key and public parameters, per ACL contract.
//!
//! Fetching these is slow and they rarely change, so they are kept in a
//! [GenericStringStorage] between runs. Reads and writes are best-effort.

use crate::storage::GenericStringStorage;
use crate::{count_error, count_request};
use alloy_primitives::Address;
use error_utils::log_and_discard;
use observability::metrics_names::{ERR_STORAGE, OP_PUBLIC_KEY_GET, OP_PUBLIC_KEY_SET};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPublicKey {
    pub public_key_id: String,
    #[serde(with = "hex")]
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPublicParams {
    pub public_params_id: String,
    #[serde(with = "hex")]
    pub public_params: Vec<u8>,
}

/// Whatever could be read back, each part independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedPublicMaterial {
    pub public_key: Option<StoredPublicKey>,
    pub public_params: Option<StoredPublicParams>,
}

pub struct PublicKeyStorage<S> {
    store: S,
}

impl<S: GenericStringStorage> PublicKeyStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    fn public_key_item(acl_address: Address) -> String {
        format!("fhevm:publicKey:{}", acl_address.to_checksum(None))
    }

    fn public_params_item(acl_address: Address) -> String {
        format!("fhevm:publicParams:{}", acl_address.to_checksum(None))
    }

    async fn read_part<T: DeserializeOwned>(&self, item: &str) -> Option<T> {
        let raw = log_and_discard(
            self.store.get_item(item).await,
            "Could not read cached public material",
        )
        .flatten()?;
        let parsed = log_and_discard(
            serde_json::from_str::<T>(&raw),
            "Discarding unreadable cached public material",
        );
        if parsed.is_none() {
            count_error(OP_PUBLIC_KEY_GET, ERR_STORAGE);
        }
        parsed
    }

    pub async fn get(&self, acl_address: Address) -> CachedPublicMaterial {
        count_request(OP_PUBLIC_KEY_GET);
        CachedPublicMaterial {
            public_key: self.read_part(&Self::public_key_item(acl_address)).await,
            public_params: self
                .read_part(&Self::public_params_item(acl_address))
                .await,
        }
    }

    async fn write_part<T: Serialize>(&mut self, item: &str, value: &T) -> bool {
        let Some(json) = log_and_discard(
            serde_json::to_string(value),
            "Could not serialize public material",
        ) else {
            return false;
        };
        let written = log_and_discard(
            self.store.set_item(item, &json).await,
            "Could not cache public material",
        )
        .is_some();
        if !written {
            count_error(OP_PUBLIC_KEY_SET, ERR_STORAGE);
        }
        written
    }

    /// Cache the given parts, leaving absent ones as they are.
    ///
    /// Returns whether every given part was written.
    pub async fn set(
        &mut self,
        acl_address: Address,
        public_key: Option<&StoredPublicKey>,
        public_params: Option<&StoredPublicParams>,
    ) -> bool {
        count_request(OP_PUBLIC_KEY_SET);
        let mut ok = true;
        if let Some(pk) = public_key {
            ok &= self
                .write_part(&Self::public_key_item(acl_address), pk)
                .await;
        }
        if let Some(pp) = public_params {
            ok &= self
                .write_part(&Self::public_params_item(acl_address), pp)
                .await;
        }
        ok
    }
}
