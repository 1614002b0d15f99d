//! Market-data gatherer for a prediction-market exchange: a Market Registry,
//! a two-pool Connection Manager, a Message Router, per-event-type Batch
//! Writers, and a REST Snapshot Poller, wired together into one ingest
//! pipeline.

pub mod bounded_channel;
pub mod config;
pub mod connection;
pub mod errors;
pub mod model;
pub mod pool;
pub mod poller;
pub mod price;
pub mod registry;
pub mod router;
pub mod time;
pub mod writer;

use std::sync::Arc;

use chrono::Utc;
use exchange_client::auth::Account;
use exchange_client::ExchangeClient;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GathererConfig;
use crate::errors::RegistryError;
use crate::pool::Pools;
use crate::registry::MarketRegistry;
use crate::router::{make_router_outputs, RouterCapacities};
use crate::writer::{orderbook_delta_writer, orderbook_snapshot_writer, ticker_writer, trade_writer, PgStore, Store};

/// Everything the gatherer needs to run that isn't covered by
/// [`GathererConfig`]: the exchange's REST base URL, an optional signing
/// identity (required only for private endpoints, which this service never
/// calls, but threaded through for completeness), and the store backing
/// the batch writers.
pub struct GathererDeps {
    pub rest_base_url: String,
    pub account: Option<Account>,
    pub store: Arc<dyn Store>,
}

/// Build a `PgStore` against the given Postgres pool.
pub async fn connect_store(database_url: &str) -> Result<Arc<dyn Store>, sqlx::Error> {
    let pool = sqlx::postgres::PgPoolOptions::new().connect(database_url).await?;
    Ok(Arc::new(PgStore::new(pool)))
}

/// Run the full gatherer pipeline until `token` is cancelled. Performs the
/// registry's initial REST sync first so the connection pools start with a
/// complete market universe; returns only once every spawned task has been
/// asked to stop (the caller is expected to `token.cancel()` and then await
/// this future, or race it against a shutdown signal).
pub async fn run(config: GathererConfig, deps: GathererDeps, token: CancellationToken) -> Result<(), RegistryError> {
    let client = Arc::new(ExchangeClient::new(deps.rest_base_url, deps.account.clone()));

    let mut registry = MarketRegistry::new(client.clone(), config.registry.clone());
    let pool_changes = registry.subscribe_changes().expect("subscribe_changes called once, before start");
    registry.initial_sync().await?;
    let registry = Arc::new(registry);

    let active_tickers: Vec<String> = registry.get_active_markets().into_iter().map(|m| m.ticker).collect();

    let (frames_tx, mut frames_rx) = connection::make_frame_channel(config.connection.orderbook_count * config.connection.markets_per_connection);
    let pools = Pools::spawn(&config.connection, deps.account.clone(), active_tickers, frames_tx, token.clone());
    tokio::spawn(pools.run(pool_changes, token.clone()));

    let (router_outputs, router_receivers) = make_router_outputs(RouterCapacities::default());
    let poller_snapshot_sender = router_outputs.orderbook_snapshots.clone();
    let router::RouterReceivers { trades, orderbook_deltas, orderbook_snapshots, tickers, lifecycle } = router_receivers;

    {
        let token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    frame = frames_rx.recv() => {
                        match frame {
                            None => return,
                            Some(frame) => router::route(frame, Utc::now().timestamp_micros(), &router_outputs).await,
                        }
                    }
                }
            }
        });
    }

    {
        let registry = registry.clone();
        let token = token.clone();
        tokio::spawn(async move {
            registry.run_lifecycle_source(lifecycle, token).await;
        });
    }
    registry.clone().start(token.clone());

    tokio::spawn(trade_writer(config.writer.clone(), trades, deps.store.clone()).run(token.clone()));
    tokio::spawn(orderbook_delta_writer(config.writer.clone(), orderbook_deltas, deps.store.clone()).run(token.clone()));
    tokio::spawn(ticker_writer(config.writer.clone(), tickers, deps.store.clone()).run(token.clone()));

    tokio::spawn(orderbook_snapshot_writer(config.writer.clone(), orderbook_snapshots, deps.store.clone()).run(token.clone()));

    let poller = Arc::new(poller::SnapshotPoller::new(client, registry, config.poller.clone(), poller_snapshot_sender));
    tokio::spawn(poller.run(token.clone()));

    info!("gatherer running");
    token.cancelled().await;
    Ok(())
}
