use alloy_primitives::{address, Address};

/// Validity of a freshly minted authorization.
pub const DEFAULT_DURATION_DAYS: u64 = 365;
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Stands in for the public key when a storage key is derived without one.
pub const ZERO_ADDRESS_SENTINEL: &str = "0x0000000000000000000000000000000000000000";

pub const EIP712_DOMAIN_NAME: &str = "Decryption";
pub const EIP712_DOMAIN_VERSION: &str = "1";
pub const EIP712_DOMAIN_TYPE: &str = "EIP712Domain";
pub const USER_DECRYPT_PRIMARY_TYPE: &str = "UserDecryptRequestVerification";

/// Extra data signed along with every user decryption request.
pub const DEFAULT_EXTRA_DATA: [u8; 1] = [0x00];

// Chain defaults of a local hardhat node running the mocked coprocessor.
pub const LOCAL_CHAIN_ID: u64 = 31337;
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;
pub const DEFAULT_GATEWAY_CHAIN_ID: u64 = 55815;
pub const DEFAULT_VERIFYING_CONTRACT_DECRYPTION: Address =
    address!("0x5ffdaAB0373E62E2ea2944776209aEf29E631A64");

/// Known ChallengeFHE deployment on Sepolia, used when none is configured.
pub const SEPOLIA_CHALLENGE_ADDRESS: Address =
    address!("0x78450fe69Da4A8329953735661918bD4aAda0319");
