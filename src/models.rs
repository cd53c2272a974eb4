use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `previous_hash` carried by every genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: String,
    pub candidate: String,
}

impl Vote {
    pub fn new(voter_id: impl Into<String>, candidate: impl Into<String>) -> Self {
        Vote {
            voter_id: voter_id.into(),
            candidate: candidate.into(),
        }
    }
}

/// One ledger entry. This is also the wire shape exchanged between nodes: a chain
/// export is a JSON array of these objects, genesis first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub votes: Vec<Vote>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

// Hash input with keys in sorted order, so the digest does not depend on how a
// peer happened to order the fields of the object it sent.
#[derive(Serialize)]
struct HashInput<'a> {
    index: u64,
    nonce: u64,
    previous_hash: &'a str,
    timestamp: f64,
    votes: Vec<HashVote<'a>>,
}

#[derive(Serialize)]
struct HashVote<'a> {
    candidate: &'a str,
    voter_id: &'a str,
}

/// SHA-256 over the canonical JSON encoding of the hashed fields, as lowercase hex.
pub fn hash_fields(index: u64, timestamp: f64, votes: &[Vote], previous_hash: &str, nonce: u64) -> String {
    let input = HashInput {
        index,
        nonce,
        previous_hash,
        timestamp,
        votes: votes
            .iter()
            .map(|v| HashVote {
                candidate: &v.candidate,
                voter_id: &v.voter_id,
            })
            .collect(),
    };
    let mut hasher = Sha256::new();
    // Unreachable in practice: the sink is a hasher and every field is plain data.
    if let Err(err) = serde_json::to_writer(&mut hasher, &input) {
        log::error!("Failed to encode block {} for hashing: {}", index, err);
    }
    format!("{:x}", hasher.finalize())
}

impl Block {
    /// Builds a block and stamps it with the hash of its own fields.
    pub fn seal(index: u64, timestamp: f64, votes: Vec<Vote>, previous_hash: String, nonce: u64) -> Self {
        let hash = hash_fields(index, timestamp, &votes, &previous_hash, nonce);
        Block {
            index,
            timestamp,
            votes,
            previous_hash,
            nonce,
            hash,
        }
    }

    pub fn genesis(timestamp: f64) -> Self {
        Block::seal(0, timestamp, Vec::new(), GENESIS_PREVIOUS_HASH.to_string(), 0)
    }

    /// Recomputes the hash from the stored fields, ignoring the stored `hash`.
    pub fn compute_hash(&self) -> String {
        hash_fields(self.index, self.timestamp, &self.votes, &self.previous_hash, self.nonce)
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Re-seals the block with a different nonce.
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self.hash = self.compute_hash();
        self
    }
}
