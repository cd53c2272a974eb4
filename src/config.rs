use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LedgerError, LedgerResult};

pub const DEFAULT_DIFFICULTY: usize = 2;
pub const DEFAULT_VOTES_PER_BLOCK: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Leading zero hex characters required of a mined block hash.
    pub difficulty: usize,
    /// Pending pool size that triggers mining during vote intake.
    pub votes_per_block: usize,
    /// Whether chain validation re-checks the difficulty of historical blocks.
    pub verify_work_on_validate: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            difficulty: DEFAULT_DIFFICULTY,
            votes_per_block: DEFAULT_VOTES_PER_BLOCK,
            verify_work_on_validate: true,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.votes_per_block == 0 {
            return Err(LedgerError::Config("votes_per_block must be at least 1".to_string()));
        }
        if self.difficulty > 64 {
            return Err(LedgerError::Config("difficulty cannot exceed the 64 hex digits of a hash".to_string()));
        }
        Ok(())
    }
}

/// Settings for the node binary, read from environment variables.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub port: u16,
    pub nodes_file: PathBuf,
    pub mine_on_vote: bool,
    pub peer_timeout: Duration,
    pub ledger: LedgerConfig,
}

impl NodeConfig {
    pub fn from_env() -> LedgerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> LedgerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("SERVER_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => parse_value("SERVER_PORT", &raw)?,
            None => 5000,
        };
        let ledger = LedgerConfig {
            difficulty: parse_or(&lookup, "DIFFICULTY", DEFAULT_DIFFICULTY)?,
            votes_per_block: parse_or(&lookup, "VOTES_PER_BLOCK", DEFAULT_VOTES_PER_BLOCK)?,
            verify_work_on_validate: parse_or(&lookup, "VERIFY_WORK", true)?,
        };
        ledger.validate()?;

        Ok(NodeConfig {
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            nodes_file: lookup("NODES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("nodes.json")),
            mine_on_vote: parse_or(&lookup, "MINE_ON_VOTE", true)?,
            peer_timeout: Duration::from_secs(parse_or(&lookup, "PEER_TIMEOUT_SECS", 5u64)?),
            ledger,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> LedgerResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> LedgerResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| LedgerError::Config(format!("{key} has invalid value {raw:?}")))
}
