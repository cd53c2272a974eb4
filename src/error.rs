use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("voter {voter_id} has already voted")]
    DuplicateVoter { voter_id: String },

    #[error("invalid vote: {0}")]
    InvalidVote(String),

    #[error("malformed chain payload: {0}")]
    MalformedChain(String),

    #[error("peer {peer}: {reason}")]
    Peer { peer: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Why a sealed block was refused by the append checks. The chain is untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppendRejection {
    #[error("previous hash does not match the last block")]
    LinkageMismatch,

    #[error("proof of work does not meet the difficulty")]
    ProofMismatch,

    #[error("stored hash does not match the block contents")]
    HashMismatch,

    #[error("block repeats a voter that has already voted")]
    DuplicateVoter,
}

pub type LedgerResult<T> = Result<T, LedgerError>;
