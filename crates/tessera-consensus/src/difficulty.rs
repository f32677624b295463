//! Compact targets, proof-of-work checks and difficulty retargeting.
//!
//! Targets use the Bitcoin-style compact ("nBits") encoding. Every
//! `difficulty_interval` blocks the target is scaled by the ratio of the
//! actual to the expected timespan of the previous window, with the
//! timespan clamped to `[expected / f, expected * f]`.

use crate::chain_params::ChainParams;
use crate::types::BlockHeader;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use tracing::debug;

/// Expand a compact target.
pub fn nbits_to_target(nbits: u32) -> BigUint {
    let size = (nbits >> 24) as usize;
    let word = nbits & 0x007f_ffff;

    // sign bit set means a negative target; treat as zero
    if nbits & 0x0080_0000 != 0 || size == 0 {
        return BigUint::zero();
    }

    if size <= 3 {
        BigUint::from(word >> (8 * (3 - size)))
    } else {
        BigUint::from(word) << (8 * (size - 3))
    }
}

/// Compress a target to compact form. Precision beyond three bytes is dropped.
pub fn target_to_nbits(target: &BigUint) -> u32 {
    if target.is_zero() {
        return 0;
    }

    let bytes = target.to_bytes_be();
    let mut size = bytes.len() as u32;
    let mut word: u32 = if bytes.len() <= 3 {
        let mut w = 0u32;
        for &b in &bytes {
            w = (w << 8) | u32::from(b);
        }
        w << (8 * (3 - bytes.len()))
    } else {
        (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
    };

    if word & 0x0080_0000 != 0 {
        word >>= 8;
        size += 1;
    }
    (size << 24) | word
}

/// Expected number of hashes to meet `nbits`: `2^256 / (target + 1)`.
pub fn work_for_bits(nbits: u32) -> BigUint {
    let target = nbits_to_target(nbits);
    (BigUint::one() << 256u32) / (target + BigUint::one())
}

/// Whether the header hash, read as a big-endian integer, meets its own target.
pub fn check_proof_of_work(header: &BlockHeader) -> bool {
    let target = nbits_to_target(header.difficulty_target);
    if target.is_zero() {
        return false;
    }
    BigUint::from_bytes_be(header.hash().as_bytes()) <= target
}

/// Whether `declared` is at least as hard as `required`.
pub fn meets_required(declared: u32, required: u32) -> bool {
    let declared = nbits_to_target(declared);
    !declared.is_zero() && declared <= nbits_to_target(required)
}

/// Median of the given timestamps (0 for an empty slice).
pub fn median_time_past(timestamps: &[u64]) -> u64 {
    if timestamps.is_empty() {
        return 0;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2]
}

/// Difficulty retarget calculator.
#[derive(Debug, Clone)]
pub struct DifficultyAdjustment {
    target_block_time_secs: u64,
    interval: u32,
    max_factor: u64,
    pow_limit: BigUint,
    pow_limit_bits: u32,
}

impl DifficultyAdjustment {
    pub fn new(params: &ChainParams) -> Self {
        Self::with_params(
            params.target_block_time_secs,
            params.difficulty_interval,
            params.max_adjustment_factor,
            params.pow_limit_bits,
        )
    }

    /// Create with explicit parameters (for testing).
    pub fn with_params(
        target_block_time_secs: u64,
        interval: u32,
        max_factor: u64,
        pow_limit_bits: u32,
    ) -> Self {
        Self {
            target_block_time_secs,
            interval: interval.max(1),
            max_factor: max_factor.max(1),
            pow_limit: nbits_to_target(pow_limit_bits),
            pow_limit_bits,
        }
    }

    /// Height of the first block of the window that closes before
    /// `next_height`, when `next_height` is a retarget height.
    pub fn retarget_window_start(&self, next_height: u32) -> Option<u32> {
        if next_height == 0 || next_height % self.interval != 0 {
            None
        } else {
            Some(next_height - self.interval)
        }
    }

    fn expected_timespan(&self) -> u64 {
        self.target_block_time_secs * u64::from(self.interval)
    }

    /// Required target for the block after `parent`.
    ///
    /// `window_start_timestamp` is the timestamp of the block at
    /// `retarget_window_start(next_height)`; it is ignored off-boundary.
    pub fn next_bits(
        &self,
        next_height: u32,
        parent_bits: u32,
        parent_timestamp: u64,
        window_start_timestamp: Option<u64>,
    ) -> u32 {
        let (Some(_), Some(first)) = (self.retarget_window_start(next_height), window_start_timestamp)
        else {
            return parent_bits;
        };

        let expected = self.expected_timespan();
        let actual = parent_timestamp
            .saturating_sub(first)
            .clamp(expected / self.max_factor, expected * self.max_factor);

        let old_target = nbits_to_target(parent_bits);
        let mut new_target = old_target * BigUint::from(actual) / BigUint::from(expected.max(1));
        if new_target > self.pow_limit {
            new_target = self.pow_limit.clone();
        }

        let bits = if new_target.is_zero() {
            self.pow_limit_bits
        } else {
            target_to_nbits(&new_target)
        };

        debug!(
            height = next_height,
            actual_timespan = actual,
            expected_timespan = expected,
            old_bits = parent_bits,
            new_bits = bits,
            "Retargeted difficulty"
        );
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_params::REGTEST_POW_LIMIT_BITS;

    #[test]
    fn test_nbits_roundtrip_known_values() {
        for bits in [0x1d00_ffffu32, 0x1f00_ffff, REGTEST_POW_LIMIT_BITS, 0x1b04_64ca] {
            assert_eq!(target_to_nbits(&nbits_to_target(bits)), bits);
        }
    }

    #[test]
    fn test_small_targets() {
        assert_eq!(nbits_to_target(0x0312_3456), BigUint::from(0x12_3456u32));
        assert_eq!(nbits_to_target(0x0212_3456), BigUint::from(0x1234u32));
        assert_eq!(target_to_nbits(&BigUint::from(0x12u32)), 0x0112_0000);
        assert_eq!(target_to_nbits(&BigUint::from(0x80u32)), 0x0200_8000);
    }

    #[test]
    fn test_negative_and_zero_targets() {
        assert!(nbits_to_target(0x0480_0001).is_zero());
        assert!(nbits_to_target(0).is_zero());
    }

    #[test]
    fn test_work_grows_with_difficulty() {
        assert!(work_for_bits(0x1f00_ffff) > work_for_bits(REGTEST_POW_LIMIT_BITS));
        assert_eq!(work_for_bits(REGTEST_POW_LIMIT_BITS), BigUint::from(2u32));
    }

    #[test]
    fn test_meets_required() {
        assert!(meets_required(0x1f00_ffff, REGTEST_POW_LIMIT_BITS));
        assert!(meets_required(REGTEST_POW_LIMIT_BITS, REGTEST_POW_LIMIT_BITS));
        assert!(!meets_required(REGTEST_POW_LIMIT_BITS, 0x1f00_ffff));
        assert!(!meets_required(0, REGTEST_POW_LIMIT_BITS));
    }

    #[test]
    fn test_median_time_past() {
        assert_eq!(median_time_past(&[]), 0);
        assert_eq!(median_time_past(&[5, 1, 3]), 3);
        assert_eq!(median_time_past(&[10, 20, 30, 40]), 30);
    }

    #[test]
    fn test_no_retarget_off_boundary() {
        let adj = DifficultyAdjustment::with_params(120, 10, 4, REGTEST_POW_LIMIT_BITS);
        assert_eq!(adj.retarget_window_start(5), None);
        assert_eq!(adj.next_bits(5, 0x1f00_ffff, 1000, Some(0)), 0x1f00_ffff);
        assert_eq!(adj.retarget_window_start(20), Some(10));
    }

    #[test]
    fn test_on_schedule_keeps_target() {
        let adj = DifficultyAdjustment::with_params(120, 10, 4, REGTEST_POW_LIMIT_BITS);
        assert_eq!(adj.next_bits(10, 0x1f00_ffff, 1200, Some(0)), 0x1f00_ffff);
    }

    #[test]
    fn test_slow_blocks_ease_target_clamped() {
        let adj = DifficultyAdjustment::with_params(120, 10, 4, REGTEST_POW_LIMIT_BITS);
        // 100x slower than expected, clamped to 4x
        let bits = adj.next_bits(10, 0x1e00_ffff, 120_000, Some(0));
        assert_eq!(nbits_to_target(bits), nbits_to_target(0x1e00_ffff) * 4u32);
    }

    #[test]
    fn test_fast_blocks_harden_target_clamped() {
        let adj = DifficultyAdjustment::with_params(120, 10, 4, REGTEST_POW_LIMIT_BITS);
        let bits = adj.next_bits(10, 0x1e00_ffff, 1, Some(0));
        assert_eq!(nbits_to_target(bits), nbits_to_target(0x1e00_ffff) / 4u32);
    }

    #[test]
    fn test_capped_at_pow_limit() {
        let adj = DifficultyAdjustment::with_params(120, 10, 4, 0x1f00_ffff);
        let bits = adj.next_bits(10, 0x1f00_ffff, 1_000_000, Some(0));
        assert_eq!(bits, 0x1f00_ffff);
    }
}
