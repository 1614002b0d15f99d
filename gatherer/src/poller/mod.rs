//! Snapshot Poller: periodically fetches the full-depth REST orderbook for
//! every active market, as a backstop against missed or unrecoverable
//! WebSocket deltas. Cycles never overlap; a slow cycle simply delays the
//! next tick rather than stacking concurrent polls.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use exchange_client::ExchangeClient;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bounded_channel;
use crate::config::PollerConfig;
use crate::errors::PollerError;
use crate::model::{OrderbookSnapshotRow, SnapshotSource};
use crate::price::Price;
use crate::registry::MarketRegistry;

pub struct SnapshotPoller {
    client: Arc<ExchangeClient>,
    registry: Arc<MarketRegistry>,
    config: PollerConfig,
    output: bounded_channel::Sender<OrderbookSnapshotRow>,
}

impl SnapshotPoller {
    pub fn new(
        client: Arc<ExchangeClient>,
        registry: Arc<MarketRegistry>,
        config: PollerConfig,
        output: bounded_channel::Sender<OrderbookSnapshotRow>,
    ) -> Self {
        Self { client, registry, config, output }
    }

    /// Run the poll-cycle dispatcher until `token` is cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.effective_poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("snapshot poller stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_cycle(&token).await;
                }
            }
        }
    }

    async fn run_cycle(&self, token: &CancellationToken) {
        let markets = self.registry.get_active_markets();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests));
        let mut handles = Vec::with_capacity(markets.len());

        for market in markets {
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            let output = self.output.clone();
            let timeout = self.config.request_timeout;
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else { return };
                if let Err(e) = poll_one(&client, &output, &market.ticker, timeout).await {
                    warn!(ticker = %market.ticker, error = %e, "orderbook poll failed for market, skipping");
                }
            }));
        }

        tokio::select! {
            _ = token.cancelled() => {}
            _ = futures_util::future::join_all(handles) => {}
        }
    }
}

async fn poll_one(
    client: &ExchangeClient,
    output: &bounded_channel::Sender<OrderbookSnapshotRow>,
    ticker: &str,
    timeout: Duration,
) -> Result<(), PollerError> {
    let response = tokio::time::timeout(timeout, client.get_market_orderbook(ticker))
        .await
        .map_err(|_| PollerError::Exchange(exchange_client::ExchangeError::Other("request timed out".to_string())))??;

    let yes_bids = parse_levels(&response.orderbook.yes);
    let no_bids = parse_levels(&response.orderbook.no);
    let snapshot_ts = Utc::now().timestamp_micros();

    let row = OrderbookSnapshotRow::from_levels(ticker.to_string(), SnapshotSource::Rest, snapshot_ts, 0, None, yes_bids, no_bids);
    output.send(row).await;
    Ok(())
}

pub(crate) fn parse_levels(levels: &[(String, i64)]) -> Vec<(Price, i64)> {
    levels
        .iter()
        .filter_map(|(price, size)| Price::parse_dollars(price).ok().map(|p| (p, *size)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels_skips_unparseable_prices() {
        let levels = vec![
            ("0.5250".to_string(), 10),
            ("not-a-price".to_string(), 5),
            ("0.0100".to_string(), 20),
        ];
        let parsed = parse_levels(&levels);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0.scaled(), 52_500);
        assert_eq!(parsed[0].1, 10);
        assert_eq!(parsed[1].0.scaled(), 1_000);
        assert_eq!(parsed[1].1, 20);
    }

    #[test]
    fn test_parse_levels_empty_input() {
        assert!(parse_levels(&[]).is_empty());
    }
}
