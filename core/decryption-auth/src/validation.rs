use crate::error::AuthError;
use alloy_primitives::Address;
use std::str::FromStr;

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a wallet or contract address.
///
/// 40 hex digits, `0x` prefix optional. Addresses written in a single case are
/// accepted as is, mixed-case addresses must carry a valid EIP-55 checksum.
pub fn parse_user_address(input: &str) -> Result<Address, AuthError> {
    let trimmed = input.trim();
    let digits = strip_hex_prefix(trimmed);
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AuthError::InvalidAddress(input.to_string()));
    }
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    let parsed = if has_lower && has_upper {
        Address::parse_checksummed(format!("0x{digits}"), None).ok()
    } else {
        Address::from_str(digits).ok()
    };
    parsed.ok_or_else(|| AuthError::InvalidAddress(input.to_string()))
}

/// Parse a list of addresses, failing on the first malformed entry.
pub fn parse_contract_addresses<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Address>, AuthError> {
    inputs
        .iter()
        .map(|s| parse_user_address(s.as_ref()))
        .collect()
}

/// Decode a hex encoded public key, `0x` prefix optional.
pub fn parse_public_key(input: &str) -> Result<Vec<u8>, AuthError> {
    let digits = strip_hex_prefix(input.trim());
    match hex::decode(digits) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Err(AuthError::InvalidPublicKey(input.to_string())),
    }
}

/// Sort ascending on the raw address bytes, which is the order of the
/// lowercase hex form. Duplicates are kept.
pub fn sort_contract_addresses(mut addresses: Vec<Address>) -> Vec<Address> {
    addresses.sort();
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn address_case_rules() {
        let expected = parse_user_address(CHECKSUMMED).unwrap();
        assert_eq!(
            parse_user_address(&CHECKSUMMED.to_lowercase()).unwrap(),
            expected
        );
        assert_eq!(
            parse_user_address(&format!("0x{}", CHECKSUMMED[2..].to_uppercase())).unwrap(),
            expected
        );
        // no prefix
        assert_eq!(parse_user_address(&CHECKSUMMED[2..]).unwrap(), expected);

        // flip the case of one letter to break the checksum
        let broken = CHECKSUMMED.replacen("39Fd", "39fd", 1);
        assert!(matches!(
            parse_user_address(&broken),
            Err(AuthError::InvalidAddress(_))
        ));
    }

    #[test]
    fn malformed_addresses() {
        for bad in ["", "0x", "0x1234", "not an address", &format!("{CHECKSUMMED}00")] {
            let err = parse_user_address(bad).unwrap_err();
            assert!(err.is_malformed_input());
        }
        assert!(parse_contract_addresses(&[CHECKSUMMED, "0xzz"]).is_err());
        assert_eq!(parse_contract_addresses(&[CHECKSUMMED]).unwrap().len(), 1);
    }

    #[test]
    fn public_keys() {
        assert_eq!(parse_public_key("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(parse_public_key("0a0b").unwrap(), vec![10, 11]);
        assert!(matches!(
            parse_public_key("pkHintX"),
            Err(AuthError::InvalidPublicKey(_))
        ));
        assert!(parse_public_key("0x").is_err());
        assert!(parse_public_key("0x123").is_err());
    }

    #[test]
    fn sorting_keeps_duplicates() {
        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);
        assert_eq!(sort_contract_addresses(vec![b, a, b]), vec![a, b, b]);
    }
}
