//! Structural and cryptographic checks on candidate chains.
//!
//! Everything here is pure: a chain is inspected, never modified, and the same input
//! always yields the same verdict.

use serde_json::Value;
use thiserror::Error;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Block, GENESIS_PREVIOUS_HASH};
use crate::pow::meets_difficulty;

/// First problem found in a candidate chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainDefect {
    #[error("chain is empty")]
    Empty,
    #[error("genesis block is malformed")]
    BadGenesis,
    #[error("block at position {position} has index {index}")]
    IndexGap { position: usize, index: u64 },
    #[error("block {position} does not link to its predecessor")]
    BrokenLink { position: usize },
    #[error("block {position} hash does not match its contents")]
    HashMismatch { position: usize },
    #[error("block {position} does not meet the difficulty")]
    InsufficientWork { position: usize },
}

/// Walks `candidate` and reports the first defect.
///
/// When `required_work` is set, every non-genesis hash must also carry that many
/// leading zeros.
pub fn check_chain(candidate: &[Block], required_work: Option<usize>) -> Result<(), ChainDefect> {
    let genesis = candidate.first().ok_or(ChainDefect::Empty)?;
    if genesis.previous_hash != GENESIS_PREVIOUS_HASH || genesis.index != 0 || !genesis.votes.is_empty() {
        return Err(ChainDefect::BadGenesis);
    }

    for (position, block) in candidate.iter().enumerate() {
        if block.index != position as u64 {
            return Err(ChainDefect::IndexGap {
                position,
                index: block.index,
            });
        }
        if position > 0 && block.previous_hash != candidate[position - 1].hash {
            return Err(ChainDefect::BrokenLink { position });
        }
        if !block.has_valid_hash() {
            return Err(ChainDefect::HashMismatch { position });
        }
        if let Some(difficulty) = required_work {
            if position > 0 && !meets_difficulty(&block.hash, difficulty) {
                return Err(ChainDefect::InsufficientWork { position });
            }
        }
    }
    Ok(())
}

pub fn is_valid_chain(candidate: &[Block], required_work: Option<usize>) -> bool {
    check_chain(candidate, required_work).is_ok()
}

/// Decodes an untrusted chain payload into blocks. Missing fields, wrong types and
/// negative integers are reported here, before any hashing happens.
pub fn parse_chain(payload: Value) -> LedgerResult<Vec<Block>> {
    serde_json::from_value(payload).map_err(|e| LedgerError::MalformedChain(e.to_string()))
}
