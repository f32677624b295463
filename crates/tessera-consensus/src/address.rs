//! Address derivation and format checks.
//!
//! An address is `prefix + hex(payload ++ checksum)` where
//! `payload = SHA-256(public_key)[..20]` and
//! `checksum = Keccak-256(prefix ++ payload)[..4]`. Hex is lowercase.

use crate::crypto::{keccak256, sha256};
use crate::error::AddressError;
use crate::types::Address;

pub const PAYLOAD_LEN: usize = 20;
pub const CHECKSUM_LEN: usize = 4;
const BODY_HEX_LEN: usize = (PAYLOAD_LEN + CHECKSUM_LEN) * 2;

fn checksum(prefix: &str, payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut data = Vec::with_capacity(prefix.len() + payload.len());
    data.extend_from_slice(prefix.as_bytes());
    data.extend_from_slice(payload);
    let digest = keccak256(&data);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

/// Address owned by `public_key` on the network using `prefix`.
pub fn derive_address(public_key: &[u8], prefix: &str) -> Address {
    let digest = sha256(public_key);
    let payload = &digest[..PAYLOAD_LEN];
    let mut body = Vec::with_capacity(PAYLOAD_LEN + CHECKSUM_LEN);
    body.extend_from_slice(payload);
    body.extend_from_slice(&checksum(prefix, payload));
    Address::new(format!("{prefix}{}", hex::encode(body)))
}

/// Check prefix, length, lowercase hex and checksum.
pub fn validate_address(address: &Address, prefix: &str) -> Result<(), AddressError> {
    let body = address
        .as_str()
        .strip_prefix(prefix)
        .ok_or_else(|| AddressError::WrongPrefix {
            expected: prefix.to_string(),
        })?;

    if body.len() != BODY_HEX_LEN {
        return Err(AddressError::WrongLength {
            expected: BODY_HEX_LEN,
            got: body.len(),
        });
    }

    if !body
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(AddressError::NotHex);
    }

    let bytes = hex::decode(body).map_err(|_| AddressError::NotHex)?;
    let (payload, sum) = bytes.split_at(PAYLOAD_LEN);
    if checksum(prefix, payload).as_slice() != sum {
        return Err(AddressError::BadChecksum);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: [u8; 33] = [2u8; 33];

    #[test]
    fn test_derived_address_validates() {
        let addr = derive_address(&PK, "TSR");
        assert!(addr.as_str().starts_with("TSR"));
        assert_eq!(addr.as_str().len(), 3 + BODY_HEX_LEN);
        assert_eq!(validate_address(&addr, "TSR"), Ok(()));
    }

    #[test]
    fn test_prefix_is_bound_into_checksum() {
        let main = derive_address(&PK, "TSR");
        let test = derive_address(&PK, "tTSR");
        assert_ne!(main.as_str()[3..], test.as_str()[4..]);
        let forged = Address::new(format!("tTSR{}", &main.as_str()[3..]));
        assert_eq!(validate_address(&forged, "tTSR"), Err(AddressError::BadChecksum));
    }

    #[test]
    fn test_wrong_prefix() {
        let addr = derive_address(&PK, "TSR");
        assert!(matches!(
            validate_address(&addr, "XYZ"),
            Err(AddressError::WrongPrefix { .. })
        ));
    }

    #[test]
    fn test_uppercase_rejected() {
        let addr = derive_address(&PK, "TSR");
        let upper = Address::new(format!("TSR{}", addr.as_str()[3..].to_uppercase()));
        assert_eq!(validate_address(&upper, "TSR"), Err(AddressError::NotHex));
    }

    #[test]
    fn test_flipped_character_fails_checksum() {
        let addr = derive_address(&PK, "TSR");
        let mut s = addr.as_str().to_string();
        let last = s.pop().unwrap();
        s.push(if last == '0' { '1' } else { '0' });
        assert_eq!(validate_address(&Address::new(s), "TSR"), Err(AddressError::BadChecksum));
    }

    #[test]
    fn test_short_body() {
        assert!(matches!(
            validate_address(&Address::new("TSRabcd"), "TSR"),
            Err(AddressError::WrongLength { got: 4, .. })
        ));
    }
}
