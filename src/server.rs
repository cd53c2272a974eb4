//! HTTP routes of a voting node.

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{rt, web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::consensus::{resolve, Resolution};
use crate::error::{AppendRejection, LedgerError};
use crate::ledger::{Ledger, MiningJob};
use crate::models::{Block, Vote};
use crate::peers::{PeerClient, PeerSet};

pub struct AppState {
    pub ledger: Arc<Mutex<Ledger>>,
    pub peers: PeerSet,
    pub client: PeerClient,
    /// Mine after every accepted vote, on top of the pool threshold.
    pub mine_on_vote: bool,
}

impl AppState {
    pub fn new(ledger: Ledger, peers: PeerSet, client: PeerClient, mine_on_vote: bool) -> Self {
        AppState {
            ledger: Arc::new(Mutex::new(ledger)),
            peers,
            client,
            mine_on_vote,
        }
    }
}

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::DuplicateVoter { .. } | LedgerError::InvalidVote(_) | LedgerError::MalformedChain(_) => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::Peer { .. } => StatusCode::BAD_GATEWAY,
            LedgerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "message": self.to_string() }))
    }
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    voter_id: Option<String>,
    candidate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    nodes: Option<Vec<String>>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/chain", web::get().to(get_chain))
        .route("/vote", web::post().to(add_vote))
        .route("/mine", web::get().to(mine_votes))
        .route("/register_node", web::post().to(register_nodes))
        .route("/resolve_conflicts", web::get().to(resolve_conflicts))
        .route("/tally", web::get().to(get_tally));
}

// A block that lost the race for the tip is retried this many times in total.
const MAX_MINE_ATTEMPTS: usize = 3;

#[derive(Debug)]
enum MineOutcome {
    Mined(Block),
    NothingPending,
    /// Votes are still pending but this attempt was cancelled or outrun.
    Superseded,
}

fn leftover(ledger: &Ledger) -> MineOutcome {
    if ledger.pending_votes().is_empty() {
        MineOutcome::NothingPending
    } else {
        MineOutcome::Superseded
    }
}

/// Mines the pending pool without holding the ledger lock during the search, so a
/// chain replacement can cancel it.
async fn mine_detached(ledger: &Arc<Mutex<Ledger>>) -> Result<MineOutcome, actix_web::Error> {
    mine_detached_with(ledger, MiningJob::run).await
}

async fn mine_detached_with<S>(ledger: &Arc<Mutex<Ledger>>, search: S) -> Result<MineOutcome, actix_web::Error>
where
    S: Fn(MiningJob) -> Option<Block> + Clone + Send + 'static,
{
    for _ in 0..MAX_MINE_ATTEMPTS {
        let job = match ledger.lock().await.begin_mining() {
            Some(job) => job,
            None => return Ok(MineOutcome::NothingPending),
        };
        let search = search.clone();
        let sealed = match web::block(move || search(job)).await? {
            Some(block) => block,
            None => return Ok(leftover(&*ledger.lock().await)),
        };

        let mut guard = ledger.lock().await;
        match guard.finish_mining(sealed) {
            Ok(block) => return Ok(MineOutcome::Mined(block)),
            Err(AppendRejection::LinkageMismatch) if !guard.pending_votes().is_empty() => {
                log::info!(
                    "Tip moved while mining, retrying with {} pending votes",
                    guard.pending_votes().len()
                );
            }
            Err(_) => return Ok(leftover(&guard)),
        }
    }
    Ok(leftover(&*ledger.lock().await))
}

fn announce(data: &web::Data<AppState>) {
    let data = data.clone();
    rt::spawn(async move {
        let peers = data.peers.snapshot().await;
        data.client.announce_block(&peers).await;
    });
}

async fn get_chain(data: web::Data<AppState>) -> HttpResponse {
    let chain = data.ledger.lock().await.export_chain();
    HttpResponse::Ok().json(json!({ "length": chain.len(), "chain": chain }))
}

async fn add_vote(data: web::Data<AppState>, body: web::Json<VoteRequest>) -> Result<HttpResponse, actix_web::Error> {
    let body = body.into_inner();
    let vote = match (body.voter_id, body.candidate) {
        (Some(voter_id), Some(candidate)) => Vote { voter_id, candidate },
        _ => {
            log::error!("Invalid vote data received.");
            return Err(LedgerError::InvalidVote("voter_id and candidate are required".to_string()).into());
        }
    };

    // Intake may mine synchronously once the pool is full, so it runs off the async worker.
    let ledger = data.ledger.clone();
    let submitted = vote.clone();
    let accepted = web::block(move || ledger.blocking_lock().submit_vote(submitted)).await??;

    {
        let data = data.clone();
        let vote = vote.clone();
        rt::spawn(async move {
            let peers = data.peers.snapshot().await;
            data.client.broadcast_vote(&peers, &vote).await;
        });
    }

    let mut mined = accepted.mined;
    if mined.is_some() {
        announce(&data);
    }
    if data.mine_on_vote {
        if let MineOutcome::Mined(block) = mine_detached(&data.ledger).await? {
            announce(&data);
            mined = Some(block);
        }
    }

    Ok(HttpResponse::Created().json(json!({ "message": "Vote added", "block": mined })))
}

async fn mine_votes(data: web::Data<AppState>) -> Result<HttpResponse, actix_web::Error> {
    match mine_detached(&data.ledger).await? {
        MineOutcome::Mined(block) => {
            announce(&data);
            Ok(HttpResponse::Ok().json(json!({ "message": "Block mined successfully", "block": block })))
        }
        MineOutcome::NothingPending => Ok(HttpResponse::Ok().json(json!({ "message": "No votes to mine" }))),
        MineOutcome::Superseded => {
            let pending = data.ledger.lock().await.pending_votes().len();
            Ok(HttpResponse::Ok().json(json!({ "message": "Mining superseded", "pending": pending })))
        }
    }
}

async fn register_nodes(req: HttpRequest, data: web::Data<AppState>, body: web::Json<RegisterRequest>) -> HttpResponse {
    let nodes = match body.into_inner().nodes {
        Some(nodes) => nodes,
        None => return HttpResponse::BadRequest().json(json!({ "message": "Invalid data" })),
    };
    let own_address = req.connection_info().host().to_string();
    let total = data.peers.register(nodes, &own_address).await;
    HttpResponse::Created().json(json!({ "message": "New nodes have been added.", "total_nodes": total }))
}

async fn resolve_conflicts(data: web::Data<AppState>) -> HttpResponse {
    let peers = data.peers.snapshot().await;
    let candidates = data.client.fetch_chains(&peers).await;

    let mut ledger = data.ledger.lock().await;
    match resolve(&mut ledger, candidates) {
        Resolution::Replaced => HttpResponse::Ok().json(json!({
            "message": "Our chain was replaced",
            "new_chain": ledger.export_chain(),
        })),
        Resolution::Authoritative => HttpResponse::Ok().json(json!({
            "message": "Our chain is authoritative",
            "chain": ledger.export_chain(),
        })),
    }
}

async fn get_tally(data: web::Data<AppState>) -> HttpResponse {
    let ledger = data.ledger.lock().await;
    HttpResponse::Ok().json(json!({
        "tally": ledger.tally(),
        "pending": ledger.pending_votes().len(),
    }))
}
