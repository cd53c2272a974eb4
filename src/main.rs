use std::io;

use actix_web::{middleware::Logger, web, App, HttpServer};

use vote_ledger::peers::{load_peers, PeerClient, PeerSet};
use vote_ledger::server::{configure, AppState};
use vote_ledger::{Ledger, LedgerError, NodeConfig};

fn to_io(err: LedgerError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = NodeConfig::from_env().map_err(to_io)?;
    let ledger = Ledger::new(config.ledger.clone()).map_err(to_io)?;
    let peers = load_peers(&config.nodes_file).map_err(to_io)?;
    let client = PeerClient::new(config.peer_timeout).map_err(to_io)?;

    log::info!(
        "Starting node on {}:{} (difficulty {}, {} votes per block, {} peers)",
        config.bind_address,
        config.port,
        config.ledger.difficulty,
        config.ledger.votes_per_block,
        peers.len()
    );

    let state = web::Data::new(AppState::new(ledger, PeerSet::new(peers), client, config.mine_on_vote));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}
