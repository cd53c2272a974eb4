//! End-to-end behaviour of a single ledger and of fork resolution between ledgers.

use proptest::prelude::*;
use vote_ledger::{is_valid_chain, resolve, Block, Ledger, LedgerConfig, LedgerError, PeerChain, Resolution, Vote};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ledger_with(difficulty: usize, votes_per_block: usize) -> Ledger {
    Ledger::new(LedgerConfig {
        difficulty,
        votes_per_block,
        verify_work_on_validate: true,
    })
    .expect("valid config")
}

/// A default-config ledger grown to `len` blocks, one vote per mined block.
fn grown(len: usize, tag: &str) -> Ledger {
    let mut ledger = ledger_with(2, 5);
    for i in 1..len {
        ledger.submit_vote(Vote::new(format!("{tag}-{i}"), "X")).unwrap();
        ledger.mine_pending().expect("block mined");
    }
    assert_eq!(ledger.chain_len(), len);
    ledger
}

fn peer(name: &str, chain: Vec<Block>) -> PeerChain {
    PeerChain {
        peer: name.to_string(),
        chain,
    }
}

fn assert_linked(chain: &[Block]) {
    assert_eq!(chain[0].previous_hash, "0");
    for pair in chain.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].hash);
        assert_eq!(pair[1].index, pair[0].index + 1);
    }
    for block in chain {
        assert_eq!(block.compute_hash(), block.hash);
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn same_voter_twice_is_rejected() {
    let mut ledger = Ledger::default();
    assert!(ledger.submit_vote(Vote::new("A", "X")).is_ok());
    assert!(matches!(
        ledger.submit_vote(Vote::new("A", "X")),
        Err(LedgerError::DuplicateVoter { .. })
    ));
    assert_eq!(ledger.pending_votes().len(), 1);
}

#[test]
fn fifth_vote_mines_a_block() {
    let mut ledger = ledger_with(2, 5);
    for id in ["v1", "v2", "v3", "v4"] {
        let accepted = ledger.submit_vote(Vote::new(id, "X")).unwrap();
        assert!(accepted.mined.is_none());
    }
    let block = ledger.submit_vote(Vote::new("v5", "Y")).unwrap().mined.expect("threshold mines");

    assert_eq!(ledger.chain_len(), 2);
    assert_eq!(block.index, 1);
    assert_eq!(block.votes.len(), 5);
    assert!(block.hash.starts_with("00"));
    assert!(ledger.pending_votes().is_empty());
    assert_linked(ledger.chain());
}

#[test]
fn broken_link_to_genesis_is_invalid() {
    let ledger = Ledger::default();
    let genesis = ledger.chain()[0].clone();
    let orphan = Block::seal(1, genesis.timestamp + 1.0, vec![Vote::new("A", "X")], "f00d".to_string(), 0);
    assert!(!is_valid_chain(&[genesis, orphan], None));
}

#[test]
fn resolver_adopts_longest_valid_candidate() {
    let mut local = grown(3, "local");
    let short = grown(2, "short");
    let long = grown(5, "long");

    let outcome = resolve(
        &mut local,
        vec![peer("short", short.export_chain()), peer("long", long.export_chain())],
    );
    assert_eq!(outcome, Resolution::Replaced);
    assert_eq!(local.chain(), long.chain());
}

#[test]
fn resolver_keeps_longer_local_chain() {
    let mut local = grown(3, "local");
    let before = local.export_chain();
    let outcome = resolve(&mut local, vec![peer("short", grown(2, "short").export_chain())]);
    assert_eq!(outcome, Resolution::Authoritative);
    assert_eq!(local.chain(), before.as_slice());
}

#[test]
fn equal_length_replacement_is_refused() {
    let mut local = grown(3, "local");
    let before = local.export_chain();
    assert!(!local.replace_chain(grown(3, "other").export_chain()));
    assert_eq!(local.chain(), before.as_slice());
}

#[test]
fn chain_without_enough_work_is_refused() {
    let mut weak = ledger_with(0, 5);
    for i in 0..4 {
        weak.submit_vote(Vote::new(format!("w{i}"), "X")).unwrap();
        weak.mine_pending().unwrap();
    }
    let weak_chain = weak.export_chain();
    let lacks_work = weak_chain.iter().skip(1).any(|b| !b.hash.starts_with("00"));

    let mut strict = ledger_with(2, 5);
    assert_eq!(strict.replace_chain(weak_chain.clone()), !lacks_work);

    let mut lenient = Ledger::new(LedgerConfig {
        difficulty: 2,
        votes_per_block: 5,
        verify_work_on_validate: false,
    })
    .unwrap();
    assert!(lenient.replace_chain(weak_chain));
}

#[test]
fn exported_chain_round_trips_through_json() {
    let ledger = grown(3, "json");
    let text = serde_json::to_string(&ledger.export_chain()).unwrap();
    let decoded: Vec<Block> = serde_json::from_str(&text).unwrap();
    let mut fresh = Ledger::default();
    assert!(fresh.replace_chain(decoded));
    assert_eq!(fresh.chain(), ledger.chain());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn accepted_voters_are_unique_and_chain_stays_linked(
        ops in proptest::collection::vec((0u8..12, any::<bool>()), 1..40)
    ) {
        let mut ledger = ledger_with(1, 3);
        for (voter, mine) in ops {
            let _ = ledger.submit_vote(Vote::new(format!("voter-{voter}"), "X"));
            if mine {
                let before = ledger.last_block().index;
                if let Some(block) = ledger.mine_pending() {
                    prop_assert_eq!(block.index, before + 1);
                    prop_assert!(ledger.pending_votes().is_empty());
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        let confirmed = ledger.chain().iter().flat_map(|b| b.votes.iter());
        for vote in confirmed.chain(ledger.pending_votes().iter()) {
            prop_assert!(seen.insert(vote.voter_id.clone()), "{} accepted twice", vote.voter_id);
        }
        assert_linked(ledger.chain());
        prop_assert!(ledger.is_valid_chain(ledger.chain()));
    }
}
