/// Constants for metric operation names to ensure consistency and prevent typos
//
// Authorization operations
pub const OP_LOAD_OR_SIGN: &str = "load_or_sign";
pub const OP_MINT_AUTHORIZATION: &str = "mint_authorization";
pub const OP_PERSIST_AUTHORIZATION: &str = "persist_authorization";
pub const OP_LOAD_AUTHORIZATION: &str = "load_authorization";
pub const OP_USER_DECRYPT: &str = "user_decrypt";

// Public material cache
pub const OP_PUBLIC_KEY_GET: &str = "public_key_get";
pub const OP_PUBLIC_KEY_SET: &str = "public_key_set";

// Cache outcomes, used as the `outcome` tag
pub const CACHE_HIT: &str = "hit";
pub const CACHE_MISS: &str = "miss";
pub const CACHE_STALE_OR_CORRUPT: &str = "stale_or_corrupt";

// Common error kinds, used as the `error` tag
pub const ERR_SIGNER_REJECTED: &str = "signer_rejected";
pub const ERR_INSTANCE: &str = "instance_error";
pub const ERR_STORAGE: &str = "storage_error";
pub const ERR_INVALID_INPUT: &str = "invalid_input";
