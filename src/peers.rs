//! Peer list and the HTTP calls a node makes to its peers.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::consensus::PeerChain;
use crate::error::{LedgerError, LedgerResult};
use crate::models::Vote;
use crate::validator::parse_chain;

/// Reads a JSON array of `host:port` strings. A missing file means no peers.
pub fn load_peers(path: &Path) -> LedgerResult<Vec<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            log::warn!("Peer file {} not found, starting without peers", path.display());
            return Ok(Vec::new());
        }
        Err(err) => return Err(LedgerError::Config(format!("{}: {}", path.display(), err))),
    };
    serde_json::from_str(&contents).map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))
}

#[derive(Debug, Default)]
pub struct PeerSet {
    nodes: RwLock<BTreeSet<String>>,
}

impl PeerSet {
    pub fn new(nodes: impl IntoIterator<Item = String>) -> Self {
        PeerSet {
            nodes: RwLock::new(nodes.into_iter().collect()),
        }
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.nodes.read().await.iter().cloned().collect()
    }

    /// Adds every address not already known, skipping `own_address`.
    /// Returns the full peer list afterwards.
    pub async fn register(&self, nodes: Vec<String>, own_address: &str) -> Vec<String> {
        let mut known = self.nodes.write().await;
        for node in nodes {
            let node = node.trim().to_string();
            if node.is_empty() || node == own_address {
                continue;
            }
            if known.insert(node.clone()) {
                log::info!("Registered peer {}", node);
            }
        }
        known.iter().cloned().collect()
    }
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    chain: Value,
    length: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(timeout: Duration) -> LedgerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Config(format!("http client: {e}")))?;
        Ok(PeerClient { http })
    }

    pub async fn fetch_chain(&self, peer: &str) -> LedgerResult<PeerChain> {
        let peer_error = |reason: String| LedgerError::Peer {
            peer: peer.to_string(),
            reason,
        };
        let response = self
            .http
            .get(format!("http://{peer}/chain"))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| peer_error(e.to_string()))?;
        let body: ChainResponse = response.json().await.map_err(|e| peer_error(e.to_string()))?;

        let chain = parse_chain(body.chain)?;
        if let Some(length) = body.length.filter(|&l| l != chain.len()) {
            log::warn!("Peer {} reported length {} for a chain of {} blocks", peer, length, chain.len());
        }
        Ok(PeerChain {
            peer: peer.to_string(),
            chain,
        })
    }

    /// Fetches every peer's chain in turn. Unreachable peers and malformed payloads
    /// are logged and left out.
    pub async fn fetch_chains(&self, peers: &[String]) -> Vec<PeerChain> {
        let mut chains = Vec::with_capacity(peers.len());
        for peer in peers {
            match self.fetch_chain(peer).await {
                Ok(chain) => chains.push(chain),
                Err(err) => log::error!("Failed to fetch chain: {}", err),
            }
        }
        chains
    }

    pub async fn broadcast_vote(&self, peers: &[String], vote: &Vote) {
        for peer in peers {
            match self.http.post(format!("http://{peer}/vote")).json(vote).send().await {
                Ok(r) if r.status().is_success() => log::info!("Vote broadcasted to {}", peer),
                Ok(r) => log::warn!("Vote rejected by {}: {}", peer, r.status()),
                Err(err) => log::error!("Failed to broadcast vote to {}: {}", peer, err),
            }
        }
    }

    /// Asks every peer to mine its own pending pool.
    pub async fn announce_block(&self, peers: &[String]) {
        for peer in peers {
            match self.http.get(format!("http://{peer}/mine")).send().await {
                Ok(r) if r.status().is_success() => log::info!("Block announced to {}", peer),
                Ok(r) => log::warn!("Peer {} answered {} to block announcement", peer, r.status()),
                Err(err) => log::error!("Failed to announce block to {}: {}", peer, err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_means_no_peers() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_peers(&dir.path().join("nodes.json")).unwrap().is_empty());
    }

    #[test]
    fn reads_peer_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["127.0.0.1:5001", "127.0.0.1:5002"]"#).unwrap();
        let peers = load_peers(file.path()).unwrap();
        assert_eq!(peers, vec!["127.0.0.1:5001", "127.0.0.1:5002"]);
    }

    #[test]
    fn bad_peer_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(load_peers(file.path()), Err(LedgerError::Config(_))));
    }

    #[tokio::test]
    async fn register_skips_self_and_duplicates() {
        let peers = PeerSet::new(vec!["a:1".to_string()]);
        let all = peers
            .register(vec!["a:1".into(), "b:2".into(), "me:5000".into(), " ".into()], "me:5000")
            .await;
        assert_eq!(all, vec!["a:1", "b:2"]);
    }
}
