//! Proof-of-work search.
//!
//! A block satisfies difficulty `d` when its hex hash starts with `d` `'0'` characters.
//! The expected number of attempts is about `16^d`. The search is unbounded; the only
//! way to stop it early is the [`CancelToken`] handed out with each mining job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::Block;

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Searches nonces upward from 0 until the block hash meets `difficulty`.
///
/// Returns the sealed block, or `None` if `cancel` fired first.
pub fn search(candidate: Block, difficulty: usize, cancel: &CancelToken) -> Option<Block> {
    let mut block = candidate.with_nonce(0);
    loop {
        if cancel.is_cancelled() {
            log::info!("Mining of block {} cancelled at nonce {}", block.index, block.nonce);
            return None;
        }
        if meets_difficulty(&block.hash, difficulty) {
            log::debug!("Found nonce {} for block {}", block.nonce, block.index);
            return Some(block);
        }
        let next = block.nonce.checked_add(1)?;
        block = block.with_nonce(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vote;

    fn candidate() -> Block {
        Block::seal(1, 42.0, vec![Vote::new("a", "X")], "prev".to_string(), 0)
    }

    #[test]
    fn difficulty_prefix() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("0", 2));
    }

    #[test]
    fn search_finds_smallest_nonce() {
        let sealed = search(candidate(), 2, &CancelToken::new()).unwrap();
        assert!(sealed.hash.starts_with("00"));
        assert!(sealed.has_valid_hash());
        for nonce in 0..sealed.nonce {
            assert!(!meets_difficulty(&candidate().with_nonce(nonce).hash, 2));
        }
    }

    #[test]
    fn zero_difficulty_takes_first_nonce() {
        let sealed = search(candidate(), 0, &CancelToken::new()).unwrap();
        assert_eq!(sealed.nonce, 0);
    }

    #[test]
    fn cancelled_search_gives_up() {
        let token = CancelToken::new();
        token.cancel();
        assert!(search(candidate(), 64, &token).is_none());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }
}
