//! Wallet address validation
//!
//! - TON user-friendly addresses (48 base64 / base64url characters)
//! - TON raw addresses (`<workchain>:<64 hex chars>`)
//! - Length check for every other network

use tracing::debug;

use crate::error::RejectionReason;

/// Minimum length accepted for networks without a dedicated format check
pub const MIN_GENERIC_ADDRESS_LEN: usize = 10;

const TON_FRIENDLY_LEN: usize = 48;
const TON_RAW_HASH_LEN: usize = 64;

/// Check if a string is a user-friendly TON address
pub fn is_valid_ton_friendly(address: &str) -> bool {
    if address.len() != TON_FRIENDLY_LEN {
        return false;
    }
    let url_safe = address
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    let standard = address
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/');
    url_safe || standard
}

/// Check if a string is a raw TON address (`0:abcd...`)
pub fn is_valid_ton_raw(address: &str) -> bool {
    let Some((workchain, hash)) = address.split_once(':') else {
        return false;
    };
    if workchain.parse::<i32>().is_err() {
        debug!("Invalid TON workchain: {}", workchain);
        return false;
    }
    if hash.len() != TON_RAW_HASH_LEN {
        return false;
    }
    match hex::decode(hash) {
        Ok(bytes) => bytes.len() == TON_RAW_HASH_LEN / 2,
        Err(e) => {
            debug!("Failed to decode TON address hash: {}", e);
            false
        }
    }
}

/// Validate `address` for `network`.
pub fn validate(address: &str, network: &str) -> Result<(), RejectionReason> {
    let address = address.trim();
    if address.is_empty() {
        return Err(RejectionReason::InvalidWallet(
            "wallet address is required".to_string(),
        ));
    }
    if address.chars().any(char::is_whitespace) {
        return Err(RejectionReason::InvalidWallet(
            "wallet address must not contain whitespace".to_string(),
        ));
    }

    if network.eq_ignore_ascii_case("ton") {
        if is_valid_ton_friendly(address) || is_valid_ton_raw(address) {
            return Ok(());
        }
        return Err(RejectionReason::InvalidWallet(format!(
            "{} is not a TON address",
            address
        )));
    }

    if address.len() < MIN_GENERIC_ADDRESS_LEN {
        return Err(RejectionReason::InvalidWallet(format!(
            "address must be at least {} characters",
            MIN_GENERIC_ADDRESS_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ton_friendly_validation() {
        assert!(is_valid_ton_friendly(
            "UQBvW8Z5huBkMJYdnfAEM5JqTNkuWX3diqYENkWsIL0XggGG"
        ));
        assert!(is_valid_ton_friendly(
            "EQDtFpEwcFAEcRe5mLVh2N6C0x-_hJEM7W61_JLnSF74p4q2"
        ));
        // Mixed alphabets are not an encoding
        assert!(!is_valid_ton_friendly(
            "EQDtFpEwcFAEcRe5mLVh2N6C0x+_hJEM7W61_JLnSF74p4q2"
        ));
        assert!(!is_valid_ton_friendly("UQBvW8Z5huBkMJYdnfAEM5JqTNkuWX3diqYENkWsIL0Xgg"));
        assert!(!is_valid_ton_friendly(
            "UQBvW8Z5huBkMJYdnfAEM5JqTNkuWX3diqYENkWsIL0Xgg!!"
        ));
    }

    #[test]
    fn test_ton_raw_validation() {
        let hash = "a".repeat(64);
        assert!(is_valid_ton_raw(&format!("0:{}", hash)));
        assert!(is_valid_ton_raw(&format!("-1:{}", hash)));
        assert!(!is_valid_ton_raw(&format!("x:{}", hash)));
        assert!(!is_valid_ton_raw(&format!("0:{}", "z".repeat(64))));
        assert!(!is_valid_ton_raw("0:abcd"));
        assert!(!is_valid_ton_raw("no-colon"));
    }

    #[test]
    fn test_validate_by_network() {
        assert!(validate("UQBvW8Z5huBkMJYdnfAEM5JqTNkuWX3diqYENkWsIL0XggGG", "TON").is_ok());
        assert!(validate("short", "TON").is_err());
        assert!(validate("0x1234567890abcdef", "ethereum").is_ok());
        assert!(validate("0x12345", "ethereum").is_err());
        assert!(validate("   ", "ethereum").is_err());
        assert!(validate("0x1234 567890", "ethereum").is_err());
    }
}
