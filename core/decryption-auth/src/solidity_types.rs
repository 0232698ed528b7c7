//! Solidity types used in EIP-712 signing and verification.
//! WARNING: any changes to these structures is a breaking change,
//! the decryption verifier recomputes the same struct hash.

use alloy_primitives::{Address, Bytes, U256};

alloy_sol_types::sol! {
    struct UserDecryptRequestVerification {
        /// @notice The ephemeral public key results are re-encrypted under.
        bytes publicKey;
        /// @notice The contracts whose ciphertexts may be decrypted.
        address[] contractAddresses;
        /// @notice The chain the contracts live on.
        uint256 contractsChainId;
        /// @notice Start of the validity window, in seconds since the epoch.
        uint256 startTimestamp;
        /// @notice Length of the validity window, in days.
        uint256 durationDays;
        bytes extraData;
    }
}

impl UserDecryptRequestVerification {
    pub fn new(
        public_key: &[u8],
        contract_addresses: Vec<Address>,
        contracts_chain_id: u64,
        start_timestamp: u64,
        duration_days: u64,
        extra_data: &[u8],
    ) -> Self {
        Self {
            publicKey: Bytes::copy_from_slice(public_key),
            contractAddresses: contract_addresses,
            contractsChainId: U256::from(contracts_chain_id),
            startTimestamp: U256::from(start_timestamp),
            durationDays: U256::from(duration_days),
            extraData: Bytes::copy_from_slice(extra_data),
        }
    }
}
