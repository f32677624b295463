//! Transaction merkle root.

use crate::crypto::sha256d;
use crate::types::TxId;

/// Merkle root over `txids` in block order.
///
/// Pairs are hashed with double SHA-256; an odd node at any level is paired
/// with itself. An empty list yields the zero hash.
pub fn merkle_root(txids: &[TxId]) -> [u8; 32] {
    if txids.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<[u8; 32]> = txids.iter().map(|id| id.0).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0]);
                buf[32..].copy_from_slice(right);
                sha256d(&buf)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> TxId {
        TxId([n; 32])
    }

    #[test]
    fn test_empty() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn test_single_leaf_is_identity() {
        assert_eq!(merkle_root(&[id(1)]), [1u8; 32]);
    }

    #[test]
    fn test_odd_leaf_duplicated() {
        let three = merkle_root(&[id(1), id(2), id(3)]);
        let four = merkle_root(&[id(1), id(2), id(3), id(3)]);
        assert_eq!(three, four);
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(merkle_root(&[id(1), id(2)]), merkle_root(&[id(2), id(1)]));
    }
}
