//! Transaction ordering by fee rate.

use std::cmp::Ordering;
use tessera_consensus::{Amount, TxId};

/// Priority key for a pooled transaction.
///
/// Sorts highest fee rate first, then earliest arrival. Fee rates are
/// compared by cross-multiplication so equal rates compare equal exactly.
#[derive(Debug, Clone, Copy)]
pub struct FeeOrdering {
    pub txid: TxId,
    pub fee: Amount,
    /// Size in bytes.
    pub size: usize,
    /// Arrival time in unix seconds.
    pub arrival_time: u64,
    /// Admission counter, breaks ties between equal arrival times.
    pub sequence: u64,
}

impl FeeOrdering {
    pub fn new(txid: TxId, fee: Amount, size: usize, arrival_time: u64, sequence: u64) -> Self {
        Self {
            txid,
            fee,
            size,
            arrival_time,
            sequence,
        }
    }

    pub fn fee_per_byte(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.fee as f64 / self.size as f64
        }
    }

    /// Compare fee rates: `Greater` if `self` pays more per byte.
    pub fn cmp_rate(&self, other: &Self) -> Ordering {
        let lhs = u128::from(self.fee) * other.size.max(1) as u128;
        let rhs = u128::from(other.fee) * self.size.max(1) as u128;
        lhs.cmp(&rhs)
    }
}

impl PartialEq for FeeOrdering {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FeeOrdering {}

impl PartialOrd for FeeOrdering {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeeOrdering {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the best transaction iterates first in a BTreeSet.
        other
            .cmp_rate(self)
            .then_with(|| self.arrival_time.cmp(&other.arrival_time))
            .then_with(|| self.sequence.cmp(&other.sequence))
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn entry(id: u8, fee: Amount, size: usize, arrival: u64) -> FeeOrdering {
        FeeOrdering::new(TxId([id; 32]), fee, size, arrival, id as u64)
    }

    #[test]
    fn test_fee_ordering() {
        let mut set = BTreeSet::new();
        set.insert(entry(1, 1000, 100, 1000)); // 10 per byte
        set.insert(entry(2, 2000, 100, 1001)); // 20 per byte
        set.insert(entry(3, 1000, 100, 999)); // 10 per byte, earlier

        let ordered: Vec<u8> = set.into_iter().map(|e| e.txid.0[0]).collect();
        assert_eq!(ordered, vec![2, 3, 1]);
    }

    #[test]
    fn test_equal_rate_different_sizes() {
        let a = entry(1, 1000, 100, 5);
        let b = entry(2, 2000, 200, 5);
        assert_eq!(a.cmp_rate(&b), Ordering::Equal);
        assert!(a < b);
    }

    #[test]
    fn test_distinct_entries_never_equal() {
        let a = entry(1, 1000, 100, 5);
        let mut b = a;
        b.txid = TxId([9; 32]);
        let mut set = BTreeSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 2);
    }
}
