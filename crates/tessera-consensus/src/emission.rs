//! Coinbase emission schedule.
//!
//! The reward halves every `halving_interval` blocks, drops to zero below
//! `min_reward`, and cumulative issuance is capped at `max_supply`. The cap is
//! applied to the running total so the last paying block may receive a
//! partial reward.

use crate::chain_params::ChainParams;
use crate::types::Amount;

/// Uncapped reward at `height` before the supply cap is applied.
pub fn scheduled_reward(params: &ChainParams, height: u32) -> Amount {
    let era = if params.halving_interval == 0 {
        0
    } else {
        height / params.halving_interval
    };
    era_reward(params, era)
}

fn era_reward(params: &ChainParams, era: u32) -> Amount {
    if era >= 64 {
        return 0;
    }
    let reward = params.initial_reward >> era;
    if reward < params.min_reward {
        0
    } else {
        reward
    }
}

/// Total issued by all blocks at heights `0..=height`, capped at `max_supply`.
pub fn cumulative_issuance(params: &ChainParams, height: u32) -> Amount {
    let interval = u64::from(params.halving_interval);
    let blocks = u64::from(height) + 1;

    if interval == 0 {
        let total = u128::from(blocks) * u128::from(era_reward(params, 0));
        return cap(total, params.max_supply);
    }

    let mut total: u128 = 0;
    let mut era = 0u32;
    loop {
        let start = u64::from(era) * interval;
        if start >= blocks {
            break;
        }
        let reward = era_reward(params, era);
        if reward == 0 {
            break;
        }
        let count = (blocks - start).min(interval);
        total += u128::from(count) * u128::from(reward);
        if total >= u128::from(params.max_supply) {
            break;
        }
        era += 1;
    }
    cap(total, params.max_supply)
}

fn cap(total: u128, max_supply: Amount) -> Amount {
    total.min(u128::from(max_supply)) as Amount
}

/// Reward payable by the coinbase at `height`.
pub fn coinbase_reward(params: &ChainParams, height: u32) -> Amount {
    let through = cumulative_issuance(params, height);
    let before = match height {
        0 => 0,
        h => cumulative_issuance(params, h - 1),
    };
    through - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::COIN;
    use proptest::prelude::*;

    #[test]
    fn test_initial_reward() {
        let p = ChainParams::mainnet();
        assert_eq!(coinbase_reward(&p, 0), 12 * COIN);
        assert_eq!(coinbase_reward(&p, p.halving_interval - 1), 12 * COIN);
    }

    #[test]
    fn test_first_halving() {
        let p = ChainParams::mainnet();
        assert_eq!(coinbase_reward(&p, p.halving_interval), 6 * COIN);
        assert_eq!(coinbase_reward(&p, 2 * p.halving_interval), 3 * COIN);
    }

    #[test]
    fn test_min_reward_floor() {
        let p = ChainParams {
            initial_reward: 8,
            min_reward: 2,
            halving_interval: 1,
            ..ChainParams::regtest()
        };
        assert_eq!(coinbase_reward(&p, 0), 8);
        assert_eq!(coinbase_reward(&p, 1), 4);
        assert_eq!(coinbase_reward(&p, 2), 2);
        assert_eq!(coinbase_reward(&p, 3), 0);
        assert_eq!(cumulative_issuance(&p, 1000), 14);
    }

    #[test]
    fn test_supply_cap_truncates_last_reward() {
        let p = ChainParams {
            initial_reward: 10,
            halving_interval: 1000,
            max_supply: 25,
            ..ChainParams::regtest()
        };
        assert_eq!(coinbase_reward(&p, 0), 10);
        assert_eq!(coinbase_reward(&p, 1), 10);
        assert_eq!(coinbase_reward(&p, 2), 5);
        assert_eq!(coinbase_reward(&p, 3), 0);
        assert_eq!(cumulative_issuance(&p, 999), 25);
    }

    #[test]
    fn test_issuance_matches_sum_of_rewards() {
        let p = ChainParams {
            halving_interval: 7,
            ..ChainParams::regtest()
        };
        let mut sum = 0;
        for h in 0..200 {
            sum += coinbase_reward(&p, h);
            assert_eq!(sum, cumulative_issuance(&p, h));
        }
    }

    proptest! {
        #[test]
        fn prop_reward_never_exceeds_cap(
            height in 0u32..10_000_000,
            interval in 1u32..500_000,
            max_coins in 1u64..200_000_000,
        ) {
            let p = ChainParams {
                halving_interval: interval,
                max_supply: max_coins * COIN,
                ..ChainParams::mainnet()
            };
            let before = if height == 0 { 0 } else { cumulative_issuance(&p, height - 1) };
            prop_assert!(coinbase_reward(&p, height) + before <= p.max_supply);
        }

        #[test]
        fn prop_reward_non_increasing(height in 0u32..5_000_000) {
            let p = ChainParams::mainnet();
            prop_assert!(coinbase_reward(&p, height + 1) <= coinbase_reward(&p, height));
        }
    }
}
