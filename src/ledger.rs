//! The ledger: the chain of sealed blocks plus the pool of votes waiting to be mined.
//!
//! A [`Ledger`] is the only thing that mutates either. It does no locking of its own;
//! whoever embeds it must serialize calls to `&mut self` methods (the node keeps it
//! behind a mutex).

use std::collections::{BTreeMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LedgerConfig;
use crate::error::{AppendRejection, LedgerError, LedgerResult};
use crate::models::{Block, Vote};
use crate::pow::{self, meets_difficulty, CancelToken};
use crate::validator::check_chain;

/// A vote that made it into the ledger. `mined` holds the block sealed as a side
/// effect when the vote filled the pending pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub mined: Option<Block>,
}

/// A candidate block snapshotted from the pending pool, ready for proof-of-work.
///
/// The search can run without access to the ledger; hand the result back through
/// [`Ledger::finish_mining`].
#[derive(Debug, Clone)]
pub struct MiningJob {
    pub candidate: Block,
    pub difficulty: usize,
    pub cancel: CancelToken,
}

impl MiningJob {
    /// Blocks the calling thread until a nonce is found or the job is cancelled.
    pub fn run(self) -> Option<Block> {
        pow::search(self.candidate, self.difficulty, &self.cancel)
    }
}

#[derive(Debug)]
pub struct Ledger {
    config: LedgerConfig,
    chain: Vec<Block>,
    pending: Vec<Vote>,
    confirmed_voters: HashSet<String>,
    mining: Option<ActiveJob>,
}

// The registered mining job, identified by its candidate's hash at nonce 0.
#[derive(Debug)]
struct ActiveJob {
    cancel: CancelToken,
    seed_hash: String,
}

impl ActiveJob {
    fn produced(&self, block: &Block) -> bool {
        block.clone().with_nonce(0).hash == self.seed_hash
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::with_config(LedgerConfig::default())
    }
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

impl Ledger {
    /// Creates a ledger holding only a fresh genesis block.
    pub fn new(config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Ledger::with_config(config))
    }

    fn with_config(config: LedgerConfig) -> Self {
        let genesis = Block::genesis(now());
        log::info!("Genesis block created: {}", genesis.hash);
        Ledger {
            config,
            chain: vec![genesis],
            pending: Vec::new(),
            confirmed_voters: HashSet::new(),
            mining: None,
        }
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// Number of blocks, genesis included.
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block.
        &self.chain[self.chain.len() - 1]
    }

    pub fn pending_votes(&self) -> &[Vote] {
        &self.pending
    }

    /// Serializable copy of the whole chain, genesis first.
    pub fn export_chain(&self) -> Vec<Block> {
        self.chain.clone()
    }

    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.confirmed_voters.contains(voter_id) || self.pending.iter().any(|v| v.voter_id == voter_id)
    }

    /// Confirmed votes per candidate. Pending votes are not counted.
    pub fn tally(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for vote in self.chain.iter().flat_map(|b| &b.votes) {
            *counts.entry(vote.candidate.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Takes a vote into the pending pool.
    ///
    /// When the pool reaches `votes_per_block` this mines a block before returning,
    /// which can take a while at higher difficulties.
    pub fn submit_vote(&mut self, vote: Vote) -> LedgerResult<Accepted> {
        if vote.voter_id.trim().is_empty() || vote.candidate.trim().is_empty() {
            return Err(LedgerError::InvalidVote("voter_id and candidate are required".to_string()));
        }
        if self.has_voted(&vote.voter_id) {
            log::warn!("Duplicate vote attempt by voter_id: {}", vote.voter_id);
            return Err(LedgerError::DuplicateVoter { voter_id: vote.voter_id });
        }

        log::info!("Vote from {} for {} added to pending pool", vote.voter_id, vote.candidate);
        self.pending.push(vote);

        let mut mined = None;
        if self.pending.len() >= self.config.votes_per_block {
            log::info!("Votes threshold reached. Mining new block.");
            mined = self.mine_pending();
        }
        Ok(Accepted { mined })
    }

    /// Mines every pending vote into a new block on the calling thread.
    ///
    /// Returns `None` when the pool is empty or the sealed block was refused; in the
    /// latter case the pool is left as it was.
    pub fn mine_pending(&mut self) -> Option<Block> {
        let job = self.begin_mining()?;
        let sealed = job.run();
        match sealed {
            Some(block) => self.finish_mining(block).ok(),
            None => {
                self.mining = None;
                None
            }
        }
    }

    /// Snapshots the pending pool into a candidate block on top of the current tip.
    ///
    /// Any job started earlier is cancelled, as is the returned one if the chain is
    /// replaced before it finishes.
    pub fn begin_mining(&mut self) -> Option<MiningJob> {
        if self.pending.is_empty() {
            log::info!("No votes to mine.");
            return None;
        }
        if let Some(previous) = self.mining.take() {
            previous.cancel.cancel();
        }

        let last = self.last_block();
        let candidate = Block::seal(last.index + 1, now(), self.pending.clone(), last.hash.clone(), 0);
        let cancel = CancelToken::new();
        self.mining = Some(ActiveJob {
            cancel: cancel.clone(),
            seed_hash: candidate.hash.clone(),
        });
        Some(MiningJob {
            candidate,
            difficulty: self.config.difficulty,
            cancel,
        })
    }

    /// Appends a sealed block produced by a [`MiningJob`] and drops its votes from
    /// the pending pool.
    ///
    /// On rejection the job that sealed `block` is unregistered; a newer job stays
    /// registered. On success any other registered job is cancelled, since it now
    /// builds on a stale tip.
    pub fn finish_mining(&mut self, block: Block) -> Result<Block, AppendRejection> {
        if let Err(rejection) = self.check_append(&block) {
            log::error!("Failed to add mined block {}: {}", block.index, rejection);
            if self.mining.as_ref().is_some_and(|job| job.produced(&block)) {
                self.mining = None;
            }
            return Err(rejection);
        }
        if let Some(job) = self.mining.take() {
            if !job.produced(&block) {
                job.cancel.cancel();
            }
        }

        let included: HashSet<&str> = block.votes.iter().map(|v| v.voter_id.as_str()).collect();
        self.pending.retain(|v| !included.contains(v.voter_id.as_str()));
        self.confirmed_voters
            .extend(block.votes.iter().map(|v| v.voter_id.clone()));
        self.chain.push(block.clone());

        log::info!(
            "Block {} mined successfully with {} votes.",
            block.index,
            block.votes.len()
        );
        Ok(block)
    }

    fn check_append(&self, block: &Block) -> Result<(), AppendRejection> {
        let last = self.last_block();
        if block.previous_hash != last.hash || block.index != last.index + 1 {
            return Err(AppendRejection::LinkageMismatch);
        }
        if !meets_difficulty(&block.hash, self.config.difficulty) {
            return Err(AppendRejection::ProofMismatch);
        }
        if !block.has_valid_hash() {
            return Err(AppendRejection::HashMismatch);
        }
        let mut seen = HashSet::new();
        for vote in &block.votes {
            if self.confirmed_voters.contains(&vote.voter_id) || !seen.insert(vote.voter_id.as_str()) {
                return Err(AppendRejection::DuplicateVoter);
            }
        }
        Ok(())
    }

    /// Structural validity under this ledger's rules, plus one vote per voter
    /// across the whole candidate.
    pub fn is_valid_chain(&self, candidate: &[Block]) -> bool {
        let required_work = self.config.verify_work_on_validate.then_some(self.config.difficulty);
        if let Err(defect) = check_chain(candidate, required_work) {
            log::debug!("Rejected candidate chain: {}", defect);
            return false;
        }
        let mut voters = HashSet::new();
        let unique = candidate
            .iter()
            .flat_map(|b| &b.votes)
            .all(|v| voters.insert(v.voter_id.as_str()));
        if !unique {
            log::debug!("Rejected candidate chain: a voter appears twice");
        }
        unique
    }

    /// Swaps in `candidate` if it is valid and strictly longer than the local chain.
    ///
    /// An in-flight mining job is cancelled, and pending votes already present in
    /// the adopted chain are dropped.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() || !self.is_valid_chain(&candidate) {
            log::warn!("Received chain is invalid or shorter than the current chain.");
            return false;
        }

        if let Some(job) = self.mining.take() {
            job.cancel.cancel();
        }
        self.confirmed_voters = candidate
            .iter()
            .flat_map(|b| &b.votes)
            .map(|v| v.voter_id.clone())
            .collect();
        self.chain = candidate;

        let before = self.pending.len();
        let confirmed = &self.confirmed_voters;
        self.pending.retain(|v| !confirmed.contains(&v.voter_id));
        log::info!(
            "Blockchain replaced with a chain of {} blocks ({} pending votes already confirmed).",
            self.chain.len(),
            before - self.pending.len()
        );
        true
    }
}
