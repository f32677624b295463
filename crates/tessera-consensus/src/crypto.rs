//! Hashing and ECDSA primitives.
//!
//! Signatures are secp256k1 ECDSA in 64-byte compact form, public keys are
//! SEC1 encoded (compressed or uncompressed).

use crate::error::SignatureError;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

pub use k256::ecdsa::SigningKey;

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, used for block hashes and merkle nodes.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Verify `signature` over `message` under `public_key`.
///
/// Empty inputs are `Missing`; undecodable key or signature bytes are
/// `CryptoFailure`; a decodable signature that does not verify is `Invalid`.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    if public_key.is_empty() || signature.is_empty() {
        return Err(SignatureError::Missing);
    }

    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| SignatureError::CryptoFailure(format!("public key: {e}")))?;
    let sig = Signature::from_slice(signature)
        .map_err(|e| SignatureError::CryptoFailure(format!("signature encoding: {e}")))?;

    key.verify(message, &sig)
        .map_err(|_| SignatureError::Invalid)
}

/// Sign `message`, returning the compact 64-byte signature.
pub fn sign(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let sig: Signature = key.sign(message);
    sig.to_bytes().to_vec()
}

/// Compressed SEC1 public key for a signing key.
pub fn public_key_bytes(key: &SigningKey) -> Vec<u8> {
    key.verifying_key()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_keccak_known_vector() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let k = key(7);
        let sig = sign(&k, b"hello");
        assert_eq!(sig.len(), 64);
        assert_eq!(verify_signature(&public_key_bytes(&k), b"hello", &sig), Ok(()));
    }

    #[test]
    fn test_missing_is_distinct() {
        let k = key(7);
        let sig = sign(&k, b"hello");
        assert_eq!(
            verify_signature(&[], b"hello", &sig),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verify_signature(&public_key_bytes(&k), b"hello", &[]),
            Err(SignatureError::Missing)
        );
    }

    #[test]
    fn test_wrong_message_is_invalid() {
        let k = key(7);
        let sig = sign(&k, b"hello");
        assert_eq!(
            verify_signature(&public_key_bytes(&k), b"other", &sig),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn test_wrong_key_is_invalid() {
        let sig = sign(&key(7), b"hello");
        assert_eq!(
            verify_signature(&public_key_bytes(&key(8)), b"hello", &sig),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn test_garbage_key_is_crypto_failure() {
        let sig = sign(&key(7), b"hello");
        let result = verify_signature(&[0x05; 33], b"hello", &sig);
        assert!(matches!(result, Err(SignatureError::CryptoFailure(_))));
    }

    #[test]
    fn test_truncated_signature_is_crypto_failure() {
        let k = key(7);
        let sig = sign(&k, b"hello");
        let result = verify_signature(&public_key_bytes(&k), b"hello", &sig[..10]);
        assert!(matches!(result, Err(SignatureError::CryptoFailure(_))));
    }
}
