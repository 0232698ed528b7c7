//! The structured payload a wallet signs to authorize a user decryption.

use crate::consts::{EIP712_DOMAIN_TYPE, USER_DECRYPT_PRIMARY_TYPE};
use crate::solidity_types::UserDecryptRequestVerification;
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One member of an EIP-712 struct definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl TypedField {
    fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
        }
    }
}

/// Message part of the payload, as handed to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptMessage {
    pub public_key: Bytes,
    pub contract_addresses: Vec<Address>,
    pub contracts_chain_id: u64,
    pub start_timestamp: u64,
    pub duration_days: u64,
    pub extra_data: Bytes,
}

impl From<&UserDecryptMessage> for UserDecryptRequestVerification {
    fn from(msg: &UserDecryptMessage) -> Self {
        UserDecryptRequestVerification::new(
            &msg.public_key,
            msg.contract_addresses.clone(),
            msg.contracts_chain_id,
            msg.start_timestamp,
            msg.duration_days,
            &msg.extra_data,
        )
    }
}

/// Domain, type definitions and message of a user decryption request.
///
/// This is kept verbatim next to the signature so the signature can be
/// checked again later without access to the instance that built it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptEip712 {
    pub domain: Eip712Domain,
    pub types: BTreeMap<String, Vec<TypedField>>,
    pub primary_type: String,
    pub message: UserDecryptMessage,
}

fn domain_fields(domain: &Eip712Domain) -> Vec<TypedField> {
    let mut fields = Vec::with_capacity(5);
    if domain.name.is_some() {
        fields.push(TypedField::new("name", "string"));
    }
    if domain.version.is_some() {
        fields.push(TypedField::new("version", "string"));
    }
    if domain.chain_id.is_some() {
        fields.push(TypedField::new("chainId", "uint256"));
    }
    if domain.verifying_contract.is_some() {
        fields.push(TypedField::new("verifyingContract", "address"));
    }
    if domain.salt.is_some() {
        fields.push(TypedField::new("salt", "bytes32"));
    }
    fields
}

/// Members of `UserDecryptRequestVerification`, in signing order.
pub fn user_decrypt_fields() -> Vec<TypedField> {
    vec![
        TypedField::new("publicKey", "bytes"),
        TypedField::new("contractAddresses", "address[]"),
        TypedField::new("contractsChainId", "uint256"),
        TypedField::new("startTimestamp", "uint256"),
        TypedField::new("durationDays", "uint256"),
        TypedField::new("extraData", "bytes"),
    ]
}

impl UserDecryptEip712 {
    pub fn new(domain: Eip712Domain, message: UserDecryptMessage) -> Self {
        let mut types = BTreeMap::new();
        types.insert(EIP712_DOMAIN_TYPE.to_string(), domain_fields(&domain));
        types.insert(USER_DECRYPT_PRIMARY_TYPE.to_string(), user_decrypt_fields());
        Self {
            domain,
            types,
            primary_type: USER_DECRYPT_PRIMARY_TYPE.to_string(),
            message,
        }
    }

    /// The digest a wallet signs, `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`.
    ///
    /// Only the `UserDecryptRequestVerification` definition enters the hash,
    /// the `EIP712Domain` entry of [Self::types] is informational.
    pub fn signing_hash(&self) -> B256 {
        let sol_struct: UserDecryptRequestVerification = (&self.message).into();
        sol_struct.eip712_signing_hash(&self.domain)
    }

    /// Whether the declared types are exactly the user decryption request
    /// definition, so that [Self::signing_hash] hashes what the wallet displayed.
    pub fn is_canonical(&self) -> bool {
        self.primary_type == USER_DECRYPT_PRIMARY_TYPE
            && self.types.get(USER_DECRYPT_PRIMARY_TYPE) == Some(&user_decrypt_fields())
            && self
                .types
                .get(EIP712_DOMAIN_TYPE)
                .map_or(true, |fields| *fields == domain_fields(&self.domain))
            && self.types.len() <= 2
    }
}
