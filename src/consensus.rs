//! Longest-valid-chain fork resolution.

use crate::ledger::Ledger;
use crate::models::Block;

/// A chain reported by a peer, as fetched by the networking layer.
#[derive(Debug, Clone)]
pub struct PeerChain {
    pub peer: String,
    pub chain: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Replaced,
    Authoritative,
}

/// Picks the longest candidate that is strictly longer than `local_len` and passes
/// `is_valid`. Candidates are considered in the order given, so among equally long
/// winners the first one is kept.
pub fn select_longest<'a, F>(local_len: usize, candidates: &'a [PeerChain], is_valid: F) -> Option<&'a PeerChain>
where
    F: Fn(&[Block]) -> bool,
{
    let mut best_length = local_len;
    let mut best = None;
    for candidate in candidates {
        if candidate.chain.len() > best_length && is_valid(&candidate.chain) {
            best_length = candidate.chain.len();
            best = Some(candidate);
        }
    }
    best
}

/// Replaces the local chain with the longest valid candidate, if any beats it.
pub fn resolve(ledger: &mut Ledger, candidates: Vec<PeerChain>) -> Resolution {
    let winner = select_longest(ledger.chain_len(), &candidates, |chain| ledger.is_valid_chain(chain))
        .map(|best| (best.peer.clone(), best.chain.clone()));

    if let Some((peer, chain)) = winner {
        if ledger.replace_chain(chain) {
            log::info!("Adopted chain from {} ({} blocks)", peer, ledger.chain_len());
            return Resolution::Replaced;
        }
    }
    log::info!("Our chain is authoritative ({} blocks)", ledger.chain_len());
    Resolution::Authoritative
}
