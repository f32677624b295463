//! End-to-end consensus scenarios on regtest parameters.

use crate::generators::{
    self, address, branch, pay_all, signing_key, BlockSpec, BLOCK_SPACING, GENESIS_TIME, PREFIX,
};
use crate::harness::TestChain;
use tessera_chain::{BlockOutcome, ChainError, Disposition};
use tessera_consensus::{
    coinbase_reward, Block, ConsensusError, TransactionBuilder, ValidationError, COIN,
};
use tessera_mempool::{Admission, MempoolError};
use tessera_state::UtxoSet;

/// Roughly 256 times the work of the regtest limit.
const HARD_BITS: u32 = 0x1f7f_ffff;

#[test]
fn test_genesis_reward_accepted() {
    let mut chain = TestChain::new();
    assert_eq!(chain.height(), 0);
    assert_eq!(chain.balance(&address(1)), 12 * COIN);
    assert_eq!(chain.tip().total_issued, 12 * COIN);

    let block = BlockSpec::on(&chain.tip_block().header)
        .coinbase_amount(12 * COIN)
        .build();
    chain.advance(BLOCK_SPACING);
    assert_eq!(chain.receive(block).unwrap(), BlockOutcome::Extended { height: 1 });
    assert_eq!(chain.utxos().total_value(), 24 * COIN);
}

#[test]
fn test_full_reward_rejected_after_halving() {
    let mut chain = TestChain::new();
    let halving = chain.params().halving_interval;
    chain.mine_empty(halving as usize - 1);
    assert_eq!(chain.height(), halving - 1);
    assert_eq!(coinbase_reward(chain.params(), halving), 6 * COIN);

    let tip = chain.tip_block();
    let greedy = BlockSpec::on(&tip.header)
        .coinbase_amount(12 * COIN)
        .build();
    chain.advance(BLOCK_SPACING);
    let err = chain.receive(greedy).unwrap_err();
    match &err {
        ChainError::Consensus(inner) => assert_eq!(
            *inner,
            ConsensusError::RewardExceeded {
                height: halving,
                claimed: 12 * COIN,
                allowed: 6 * COIN,
            }
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.disposition(), Disposition::RejectAndPenalize);
    assert_eq!(chain.height(), halving - 1);

    let honest = BlockSpec::on(&tip.header).offset(1).build();
    assert_eq!(
        chain.receive(honest).unwrap(),
        BlockOutcome::Extended { height: halving }
    );
    assert_eq!(chain.utxos().total_value(), chain.utxos().total_issued());
}

#[test]
fn test_double_spend_of_confirmed_output_rejected() {
    let mut chain = TestChain::new();
    let coin = chain.utxos_of(&address(1)).remove(0);

    let first = pay_all(1, &coin, 2, 2_000, 1);
    chain.submit(first.clone()).unwrap();
    assert!(matches!(chain.mine_pool().unwrap(), BlockOutcome::Extended { height: 1 }));
    assert!(chain.mempool().is_empty());
    assert_eq!(chain.balance(&address(2)), 12 * COIN - 2_000);

    let second = pay_all(1, &coin, 3, 4_000, 2);
    let err = chain.submit(second.clone()).unwrap_err();
    assert!(matches!(
        err,
        ChainError::Mempool(MempoolError::Invalid(ValidationError::DoubleSpend(r)))
            if r == coin.utxo_ref()
    ));
    assert_eq!(err.disposition(), Disposition::Reject);

    let block = BlockSpec::on(&chain.tip_block().header)
        .txs(vec![second])
        .build();
    chain.advance(BLOCK_SPACING);
    let err = chain.receive(block).unwrap_err();
    assert!(matches!(
        err,
        ChainError::Consensus(ConsensusError::Transaction {
            index: 1,
            source: ValidationError::DoubleSpend(_),
            ..
        })
    ));
    assert_eq!(err.disposition(), Disposition::RejectAndPenalize);
    assert_eq!(chain.height(), 1);
    assert_eq!(chain.balance(&address(3)), 0);
}

#[test]
fn test_replace_by_fee_evicts_original() {
    let mut chain = TestChain::new();
    let coin = chain.utxos_of(&address(1)).remove(0);

    let original = pay_all(1, &coin, 2, 2_000, 1);
    assert_eq!(chain.submit(original.clone()).unwrap(), Admission::Accepted);

    let bump = TransactionBuilder::new()
        .input(coin.utxo_ref())
        .output(address(3), coin.amount - 5_000)
        .fee(5_000)
        .nonce(1)
        .timestamp(GENESIS_TIME)
        .rbf(true)
        .sign(&signing_key(1), PREFIX);
    assert_eq!(
        chain.submit(bump.clone()).unwrap(),
        Admission::Replaced {
            evicted: vec![original.txid]
        }
    );
    assert!(!chain.mempool().contains(&original.txid));
    assert!(chain.mempool().contains(&bump.txid));
    assert_eq!(chain.utxos().reserved_by(&coin.utxo_ref()), Some(bump.txid));

    chain.mine_pool().unwrap();
    let block = chain.tip_block();
    assert_eq!(block.transactions.len(), 2);
    assert_eq!(block.transactions[1].txid, bump.txid);
    assert_eq!(chain.balance(&address(2)), 0);
    assert_eq!(chain.balance(&address(3)), coin.amount - 5_000);
    assert_eq!(
        chain.balance(&address(9)),
        coinbase_reward(chain.params(), 1) + 5_000
    );
}

#[test]
fn test_heavier_shorter_branch_wins() {
    let mut chain = TestChain::new();
    chain.advance(1_000_000);
    let genesis = chain.genesis().clone();

    let light = branch(&genesis, 100, 0);
    for block in light.iter().cloned() {
        chain.receive(block).unwrap();
    }
    assert_eq!(chain.height(), 100);
    let light_tip = chain.tip_hash();

    let mut heavy: Vec<Block> = Vec::with_capacity(99);
    for _ in 0..99 {
        let parent = heavy.last().unwrap_or(&genesis);
        let block = BlockSpec::on(&parent.header).offset(1).bits(HARD_BITS).build();
        heavy.push(block);
    }

    let mut reorgs = Vec::new();
    for block in heavy.iter().cloned() {
        if let BlockOutcome::Reorganized(event) = chain.receive(block).unwrap() {
            reorgs.push(event);
        }
    }

    assert_eq!(reorgs.len(), 1);
    assert_eq!(reorgs[0].fork_height, 0);
    assert_eq!(reorgs[0].depth, 100);
    assert_eq!(reorgs[0].old_tip, light_tip);
    assert_eq!(chain.height(), 99);
    assert_eq!(chain.tip_hash(), heavy[98].hash());

    let mut expected = UtxoSet::new();
    expected.apply_block(&genesis).unwrap();
    for block in &heavy {
        expected.apply_block(block).unwrap();
    }
    assert_eq!(chain.utxos().snapshot_digest(), expected.snapshot_digest());
    assert_eq!(chain.tip().total_issued, expected.total_issued());
    assert_eq!(chain.balance(&address(9)), 99 * 12 * COIN);
    assert!(!chain.utxos().is_applied(&light[0].hash()));
}

#[test]
fn test_transfer_chain_keeps_supply_conserved() {
    let mut chain = TestChain::new();
    let mut coin = chain.utxos_of(&address(1)).remove(0);
    let mut owner = 1u8;

    for round in 0..5u8 {
        let next = round + 2;
        let tx = pay_all(owner, &coin, next, 1_000, u64::from(round) + 1);
        chain.submit(tx.clone()).unwrap();
        chain.mine_pool().unwrap();
        coin = chain.utxos_of(&address(next)).remove(0);
        owner = next;
        assert_eq!(chain.utxos().total_value(), chain.utxos().total_issued());
    }

    assert_eq!(coin.amount, 12 * COIN - 5_000);
    assert_eq!(
        chain.tip().total_issued,
        generators::regtest_params().initial_reward * 6
    );
}
