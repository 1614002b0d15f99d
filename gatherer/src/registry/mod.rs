//! Market Registry: tracks every known market and its lifecycle state,
//! reconciling against the REST listing on a timer and consuming raw
//! lifecycle frames forwarded from the Message Router.

use std::sync::Arc;

use dashmap::DashMap;
use exchange_client::markets::MarketsQuery;
use exchange_client::ws::models::MarketLifecycleFrame;
use exchange_client::ExchangeClient;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bounded_channel::{self, OverflowPolicy};
use crate::config::RegistryConfig;
use crate::errors::RegistryError;
use crate::model::{Market, MarketChange, MarketChangeType, MarketStatus, MarketType};
use crate::price::Price;

pub struct MarketRegistry {
    markets: Arc<DashMap<String, Market>>,
    client: Arc<ExchangeClient>,
    config: RegistryConfig,
    changes_tx: bounded_channel::Sender<MarketChange>,
    changes_rx_template: Option<bounded_channel::Receiver<MarketChange>>,
}

fn wire_to_market(wire: exchange_client::markets::Market) -> Option<Market> {
    let status = MarketStatus::from_wire(&wire.status)?;
    let market_type = match wire.market_type.as_str() {
        "binary" => MarketType::Binary,
        "scalar" => MarketType::Scalar,
        _ => return None,
    };
    Some(Market {
        ticker: wire.ticker,
        event_ticker: wire.event_ticker,
        title: wire.title,
        status,
        market_type,
        yes_bid: Price::parse_dollars(&wire.yes_bid_dollars).ok()?,
        yes_ask: Price::parse_dollars(&wire.yes_ask_dollars).ok()?,
        last_price: Price::parse_dollars(&wire.last_price_dollars).ok()?,
        volume: wire.volume,
        volume_24h: wire.volume_24h,
        open_interest: wire.open_interest,
        open_ts: wire.open_ts,
        close_ts: wire.close_ts,
        expiration_ts: wire.expiration_ts,
    })
}

impl MarketRegistry {
    pub fn new(client: Arc<ExchangeClient>, config: RegistryConfig) -> Self {
        let (tx, rx) = bounded_channel::bounded(config.changes_channel_capacity, OverflowPolicy::DropOldest);
        Self {
            markets: Arc::new(DashMap::new()),
            client,
            config,
            changes_tx: tx,
            changes_rx_template: Some(rx),
        }
    }

    /// Takes the single receiver for `MarketChange` notifications. Callers
    /// should call this once before `start`; subsequent calls return `None`.
    pub fn subscribe_changes(&mut self) -> Option<bounded_channel::Receiver<MarketChange>> {
        self.changes_rx_template.take()
    }

    pub fn get_market(&self, ticker: &str) -> Option<Market> {
        self.markets.get(ticker).map(|entry| entry.value().clone())
    }

    pub fn get_active_markets(&self) -> Vec<Market> {
        self.markets
            .iter()
            .filter(|entry| entry.value().is_active())
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Initial sync: fetch every `active`/`open` and `initialized` market
    /// via paginated REST, upserting each and emitting `Created` for the
    /// active ones. Must succeed for callers to consider startup complete;
    /// REST failures here propagate rather than being swallowed the way
    /// the reconcile loop swallows them.
    pub async fn initial_sync(&self) -> Result<(), RegistryError> {
        for status in ["open", "unopened"] {
            self.fetch_and_upsert(Some(status), true).await?;
        }
        Ok(())
    }

    /// Spawn the background reconcile loop. Runs until `token` is
    /// cancelled.
    pub fn start(self: Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.reconcile_interval);
            ticker.tick().await; // first tick fires immediately; skip it, initial_sync already ran
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("market registry reconcile loop stopping");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.reconcile().await {
                            warn!(error = %e, "market registry reconcile cycle failed, will retry next tick");
                        }
                    }
                }
            }
        })
    }

    /// Feed raw lifecycle frames from the Message Router into the
    /// registry. Runs until `token` is cancelled or `source` closes.
    pub async fn run_lifecycle_source(&self, mut source: mpsc::Receiver<MarketLifecycleFrame>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                frame = source.recv() => {
                    match frame {
                        None => return,
                        Some(frame) => self.apply_lifecycle_frame(frame).await,
                    }
                }
            }
        }
    }

    async fn apply_lifecycle_frame(&self, frame: MarketLifecycleFrame) {
        let ticker = frame.msg.market_ticker;
        match frame.msg.event_type.as_str() {
            "created" => {
                match self.client.get_market(&ticker).await {
                    Ok(response) => {
                        if let Some(market) = wire_to_market(response.market) {
                            let is_active = market.is_active();
                            self.markets.insert(ticker.clone(), market.clone());
                            if is_active {
                                self.emit(MarketChange {
                                    ticker,
                                    event_type: MarketChangeType::Created,
                                    old_status: None,
                                    new_status: Some(market.status),
                                    market: Some(market),
                                })
                                .await;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, %ticker, "lifecycle 'created' lookup failed, next reconciliation will recover it"),
                }
            }
            "status_change" => {
                let Some(new_status) = frame.msg.new_status.as_deref().and_then(MarketStatus::from_wire) else {
                    warn!(%ticker, "status_change lifecycle frame missing a recognizable new_status");
                    return;
                };
                let old_status = self.markets.get(&ticker).map(|m| m.status);
                if let Some(mut entry) = self.markets.get_mut(&ticker) {
                    entry.status = new_status;
                }
                let market = self.get_market(&ticker);
                self.emit(MarketChange {
                    ticker,
                    event_type: MarketChangeType::StatusChange,
                    old_status,
                    new_status: Some(new_status),
                    market,
                })
                .await;
            }
            "settled" => {
                let old_status = self.markets.get(&ticker).map(|m| m.status);
                if let Some(mut entry) = self.markets.get_mut(&ticker) {
                    entry.status = MarketStatus::Determined;
                }
                self.emit(MarketChange {
                    ticker,
                    event_type: MarketChangeType::Settled,
                    old_status,
                    new_status: Some(MarketStatus::Determined),
                    market: None,
                })
                .await;
            }
            other => warn!(event_type = other, %ticker, "unrecognized lifecycle event type"),
        }
    }

    async fn emit(&self, change: MarketChange) {
        self.changes_tx.send(change).await;
    }

    /// Walk the full paginated market listing for `status` and upsert every
    /// entry, emitting `Created` for newly-seen active markets when
    /// `emit_created` is set (used by `initial_sync`; the reconcile loop
    /// instead distinguishes created-vs-changed per entry).
    async fn fetch_and_upsert(&self, status: Option<&str>, emit_created: bool) -> Result<(), RegistryError> {
        let mut cursor = None;
        loop {
            let mut query = MarketsQuery::default().with_limit(MarketsQuery::MAX_LIMIT);
            query.cursor = cursor.clone();
            if let Some(status) = status {
                query = query.with_status(status);
            }
            let page = self.client.get_markets(&query).await?;
            for wire_market in page.markets {
                let Some(market) = wire_to_market(wire_market) else { continue };
                let existed = self.markets.contains_key(&market.ticker);
                let is_active = market.is_active();
                self.markets.insert(market.ticker.clone(), market.clone());
                if emit_created && !existed && is_active {
                    self.emit(MarketChange {
                        ticker: market.ticker.clone(),
                        event_type: MarketChangeType::Created,
                        old_status: None,
                        new_status: Some(market.status),
                        market: Some(market),
                    })
                    .await;
                }
            }
            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(())
    }

    /// Re-fetch `open`+`unopened` markets. Markets that disappear from the
    /// listing are not removed: per the observed exchange behavior, a
    /// market absent from this page may simply have transitioned to a
    /// status this query doesn't cover, and that transition arrives via
    /// the lifecycle channel instead.
    async fn reconcile(&self) -> Result<(), RegistryError> {
        let mut seen = 0usize;
        for status in ["open", "unopened"] {
            let before = self.markets.len();
            self.reconcile_status(status).await?;
            seen += self.markets.len().saturating_sub(before).max(0);
        }
        info!(markets_tracked = self.markets.len(), new_this_cycle = seen, "market registry reconcile cycle complete");
        Ok(())
    }

    async fn reconcile_status(&self, status: &str) -> Result<(), RegistryError> {
        let mut cursor = None;
        loop {
            let mut query = MarketsQuery::default().with_limit(MarketsQuery::MAX_LIMIT).with_status(status);
            query.cursor = cursor.clone();
            let page = self.client.get_markets(&query).await?;
            for wire_market in page.markets {
                let Some(market) = wire_to_market(wire_market) else { continue };
                let previous = self.markets.get(&market.ticker).map(|m| m.value().clone());
                self.markets.insert(market.ticker.clone(), market.clone());
                match previous {
                    None => {
                        if market.is_active() {
                            self.emit(MarketChange {
                                ticker: market.ticker.clone(),
                                event_type: MarketChangeType::Created,
                                old_status: None,
                                new_status: Some(market.status),
                                market: Some(market),
                            })
                            .await;
                        }
                    }
                    Some(previous) if previous.status != market.status => {
                        self.emit(MarketChange {
                            ticker: market.ticker.clone(),
                            event_type: MarketChangeType::StatusChange,
                            old_status: Some(previous.status),
                            new_status: Some(market.status),
                            market: Some(market),
                        })
                        .await;
                    }
                    Some(_) => {}
                }
            }
            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(())
    }
}
