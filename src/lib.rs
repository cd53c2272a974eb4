//! Replicated, append-only ledger of votes.
//!
//! Each node keeps its own [`Ledger`]: votes are deduplicated by voter, pooled, and
//! sealed into blocks by proof-of-work. Nodes converge by adopting the longest valid
//! chain offered by their peers ([`consensus::resolve`]).

pub mod config;
pub mod consensus;
pub mod error;
pub mod ledger;
pub mod models;
pub mod peers;
pub mod pow;
pub mod server;
pub mod validator;

pub use config::{LedgerConfig, NodeConfig};
pub use consensus::{resolve, PeerChain, Resolution};
pub use error::{AppendRejection, LedgerError, LedgerResult};
pub use ledger::{Accepted, Ledger, MiningJob};
pub use models::{Block, Vote};
pub use validator::{check_chain, is_valid_chain, ChainDefect};
