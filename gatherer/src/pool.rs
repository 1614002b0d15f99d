//! Spawns and coordinates the two Connection Manager pools: an orderbook
//! pool (each connection owns up to `markets_per_connection` tickers,
//! subscribed only to `orderbook_delta`) and a global pool (each
//! connection subscribed to `trade`+`ticker`+`market_lifecycle_v2` for the
//! full market universe). The orderbook pool's assignment table is the
//! single source of truth for which connection owns which ticker; the
//! global pool simply mirrors every membership change onto every one of
//! its connections.

use std::collections::HashMap;

use exchange_client::ws::Channel;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bounded_channel;
use crate::config::ConnectionConfig;
use crate::connection::{ConnectionManager, InboundFrame, PoolCommand};
use crate::model::{MarketChange, MarketChangeType, MarketStatus};

const COMMAND_CHANNEL_CAPACITY: usize = 256;

pub struct Pools {
    orderbook_commands: Vec<mpsc::Sender<PoolCommand>>,
    orderbook_load: Vec<usize>,
    orderbook_assignment: HashMap<String, usize>,
    global_commands: Vec<mpsc::Sender<PoolCommand>>,
    capacity: usize,
}

impl Pools {
    /// Partition `active_tickers` across the orderbook pool, spawn both
    /// pools' connections under `token`, and return the handle used to
    /// keep them in sync with subsequent `MarketChange`s.
    pub fn spawn(
        config: &ConnectionConfig,
        account: Option<exchange_client::auth::Account>,
        active_tickers: Vec<String>,
        frames_tx: bounded_channel::Sender<InboundFrame>,
        token: CancellationToken,
    ) -> Self {
        let chunks: Vec<Vec<String>> = active_tickers
            .chunks(config.markets_per_connection.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        if chunks.len() > config.orderbook_count {
            warn!(
                connections_needed = chunks.len(),
                orderbook_count = config.orderbook_count,
                "initial active market count exceeds orderbook pool capacity; extra markets are unassigned until a reconnect repartitions"
            );
        }

        let mut orderbook_commands = Vec::with_capacity(config.orderbook_count);
        let mut orderbook_load = Vec::with_capacity(config.orderbook_count);
        let mut orderbook_assignment = HashMap::new();

        for index in 0..config.orderbook_count {
            let tickers = chunks.get(index).cloned().unwrap_or_default();
            for ticker in &tickers {
                orderbook_assignment.insert(ticker.clone(), index);
            }
            orderbook_load.push(tickers.len());

            let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
            orderbook_commands.push(cmd_tx);
            spawn_connection(config, account.clone(), vec![Channel::OrderbookDelta], tickers, frames_tx.clone(), cmd_rx, token.clone());
        }

        let mut global_commands = Vec::with_capacity(config.global_count);
        for _ in 0..config.global_count {
            let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
            global_commands.push(cmd_tx);
            spawn_connection(
                config,
                account.clone(),
                vec![Channel::Trade, Channel::Ticker, Channel::MarketLifecycleV2],
                active_tickers.clone(),
                frames_tx.clone(),
                cmd_rx,
                token.clone(),
            );
        }

        info!(
            orderbook_connections = config.orderbook_count,
            global_connections = config.global_count,
            markets = active_tickers.len(),
            "connection pools spawned"
        );

        Self {
            orderbook_commands,
            orderbook_load,
            orderbook_assignment,
            global_commands,
            capacity: config.markets_per_connection,
        }
    }

    /// Consume the registry's `MarketChange` stream, keeping both pools'
    /// subscriptions in sync. Runs until `token` is cancelled or the
    /// channel closes.
    pub async fn run(mut self, mut changes: bounded_channel::Receiver<MarketChange>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                change = changes.recv() => {
                    match change {
                        None => return,
                        Some(change) => self.apply_change(change).await,
                    }
                }
            }
        }
    }

    async fn apply_change(&mut self, change: MarketChange) {
        match change.event_type {
            MarketChangeType::Created => {
                self.assign(change.ticker.clone()).await;
                self.broadcast_global(PoolCommand::AddMarkets(vec![change.ticker])).await;
            }
            MarketChangeType::Settled => {
                self.unassign(&change.ticker).await;
                self.broadcast_global(PoolCommand::RemoveMarkets(vec![change.ticker])).await;
            }
            MarketChangeType::StatusChange => {
                let was_active = change.old_status.map(|s| s.is_active()).unwrap_or(false);
                let is_active = change.new_status.map(|s| s.is_active()).unwrap_or(false);
                if !was_active && is_active {
                    self.assign(change.ticker.clone()).await;
                    self.broadcast_global(PoolCommand::AddMarkets(vec![change.ticker])).await;
                } else if was_active && !is_active {
                    self.unassign(&change.ticker).await;
                    self.broadcast_global(PoolCommand::RemoveMarkets(vec![change.ticker])).await;
                }
            }
        }
    }

    async fn assign(&mut self, ticker: String) {
        if self.orderbook_assignment.contains_key(&ticker) {
            return;
        }
        let Some((index, _)) = self
            .orderbook_load
            .iter()
            .enumerate()
            .filter(|&(_, &load)| load < self.capacity)
            .min_by_key(|&(_, &load)| load)
        else {
            warn!(%ticker, "every orderbook connection is at capacity; market left unassigned");
            return;
        };
        self.orderbook_assignment.insert(ticker.clone(), index);
        self.orderbook_load[index] += 1;
        let _ = self.orderbook_commands[index].send(PoolCommand::AddMarkets(vec![ticker])).await;
    }

    async fn unassign(&mut self, ticker: &str) {
        if let Some(index) = self.orderbook_assignment.remove(ticker) {
            self.orderbook_load[index] = self.orderbook_load[index].saturating_sub(1);
            let _ = self.orderbook_commands[index].send(PoolCommand::RemoveMarkets(vec![ticker.to_string()])).await;
        }
    }

    async fn broadcast_global(&self, command: PoolCommand) {
        for sender in &self.global_commands {
            let _ = sender.send(command.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools(orderbook_connections: usize, capacity: usize) -> (Pools, Vec<mpsc::Receiver<PoolCommand>>, Vec<mpsc::Receiver<PoolCommand>>) {
        let mut orderbook_commands = Vec::new();
        let mut orderbook_receivers = Vec::new();
        for _ in 0..orderbook_connections {
            let (tx, rx) = mpsc::channel(8);
            orderbook_commands.push(tx);
            orderbook_receivers.push(rx);
        }
        let (global_tx, global_rx) = mpsc::channel(8);

        let pools = Pools {
            orderbook_commands,
            orderbook_load: vec![0; orderbook_connections],
            orderbook_assignment: HashMap::new(),
            global_commands: vec![global_tx],
            capacity,
        };
        (pools, orderbook_receivers, vec![global_rx])
    }

    fn change(ticker: &str, event_type: MarketChangeType) -> MarketChange {
        MarketChange {
            ticker: ticker.to_string(),
            event_type,
            old_status: None,
            new_status: None,
            market: None,
        }
    }

    fn status_change(ticker: &str, old_status: Option<MarketStatus>, new_status: Option<MarketStatus>) -> MarketChange {
        MarketChange {
            ticker: ticker.to_string(),
            event_type: MarketChangeType::StatusChange,
            old_status,
            new_status,
            market: None,
        }
    }

    #[tokio::test]
    async fn test_assign_picks_least_loaded_connection() {
        let (mut pools, mut receivers, _global) = pools(2, 10);
        pools.orderbook_load[0] = 3;

        pools.apply_change(change("FOO", MarketChangeType::Created)).await;

        assert_eq!(pools.orderbook_assignment.get("FOO"), Some(&1));
        assert_eq!(pools.orderbook_load, vec![3, 1]);
        match receivers[1].recv().await {
            Some(PoolCommand::AddMarkets(tickers)) => assert_eq!(tickers, vec!["FOO".to_string()]),
            other => panic!("expected AddMarkets, got {other:?}"),
        }
        assert!(receivers[0].try_recv().is_err());
    }

    #[tokio::test]
    async fn test_assign_is_idempotent_for_already_assigned_ticker() {
        let (mut pools, mut receivers, _global) = pools(2, 10);
        pools.apply_change(change("FOO", MarketChangeType::Created)).await;
        let assigned_to = *pools.orderbook_assignment.get("FOO").unwrap();
        // Drain the first command so the duplicate doesn't get masked by it.
        receivers[assigned_to].recv().await;

        pools.apply_change(change("FOO", MarketChangeType::Created)).await;

        assert_eq!(pools.orderbook_load[assigned_to], 1);
        assert!(receivers[assigned_to].try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unassign_frees_the_connection_slot() {
        let (mut pools, mut receivers, _global) = pools(1, 10);
        pools.apply_change(change("FOO", MarketChangeType::Created)).await;
        receivers[0].recv().await;

        pools.apply_change(change("FOO", MarketChangeType::Settled)).await;

        assert!(!pools.orderbook_assignment.contains_key("FOO"));
        assert_eq!(pools.orderbook_load, vec![0]);
        match receivers[0].recv().await {
            Some(PoolCommand::RemoveMarkets(tickers)) => assert_eq!(tickers, vec!["FOO".to_string()]),
            other => panic!("expected RemoveMarkets, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_assign_leaves_ticker_unassigned_when_pool_is_full() {
        let (mut pools, mut receivers, _global) = pools(1, 1);
        pools.apply_change(change("FOO", MarketChangeType::Created)).await;
        receivers[0].recv().await;

        pools.apply_change(change("BAR", MarketChangeType::Created)).await;

        assert!(!pools.orderbook_assignment.contains_key("BAR"));
        assert!(receivers[0].try_recv().is_err());
    }

    #[tokio::test]
    async fn test_created_and_settled_broadcast_to_every_global_connection() {
        let (mut pools, _orderbook, mut global) = pools(1, 10);

        pools.apply_change(change("FOO", MarketChangeType::Created)).await;
        match global[0].recv().await {
            Some(PoolCommand::AddMarkets(tickers)) => assert_eq!(tickers, vec!["FOO".to_string()]),
            other => panic!("expected AddMarkets, got {other:?}"),
        }

        pools.apply_change(change("FOO", MarketChangeType::Settled)).await;
        match global[0].recv().await {
            Some(PoolCommand::RemoveMarkets(tickers)) => assert_eq!(tickers, vec!["FOO".to_string()]),
            other => panic!("expected RemoveMarkets, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_change_entering_active_set_assigns_like_created() {
        let (mut pools, mut receivers, mut global) = pools(1, 10);

        pools
            .apply_change(status_change("FOO", Some(MarketStatus::Initialized), Some(MarketStatus::Active)))
            .await;

        assert!(pools.orderbook_assignment.contains_key("FOO"));
        match receivers[0].recv().await {
            Some(PoolCommand::AddMarkets(tickers)) => assert_eq!(tickers, vec!["FOO".to_string()]),
            other => panic!("expected AddMarkets, got {other:?}"),
        }
        match global[0].recv().await {
            Some(PoolCommand::AddMarkets(tickers)) => assert_eq!(tickers, vec!["FOO".to_string()]),
            other => panic!("expected AddMarkets, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_change_leaving_active_set_unassigns_like_settled() {
        let (mut pools, mut receivers, mut global) = pools(1, 10);
        pools.apply_change(change("FOO", MarketChangeType::Created)).await;
        receivers[0].recv().await;
        global[0].recv().await;

        pools
            .apply_change(status_change("FOO", Some(MarketStatus::Active), Some(MarketStatus::Closed)))
            .await;

        assert!(!pools.orderbook_assignment.contains_key("FOO"));
        match receivers[0].recv().await {
            Some(PoolCommand::RemoveMarkets(tickers)) => assert_eq!(tickers, vec!["FOO".to_string()]),
            other => panic!("expected RemoveMarkets, got {other:?}"),
        }
        match global[0].recv().await {
            Some(PoolCommand::RemoveMarkets(tickers)) => assert_eq!(tickers, vec!["FOO".to_string()]),
            other => panic!("expected RemoveMarkets, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_change_within_active_set_is_a_no_op() {
        let (mut pools, mut receivers, mut global) = pools(1, 10);
        pools.apply_change(change("FOO", MarketChangeType::Created)).await;
        receivers[0].recv().await;
        global[0].recv().await;

        pools
            .apply_change(status_change("FOO", Some(MarketStatus::Active), Some(MarketStatus::Active)))
            .await;

        assert!(pools.orderbook_assignment.contains_key("FOO"));
        assert!(receivers[0].try_recv().is_err());
        assert!(global[0].try_recv().is_err());
    }
}

fn spawn_connection(
    config: &ConnectionConfig,
    account: Option<exchange_client::auth::Account>,
    channels: Vec<Channel>,
    tickers: Vec<String>,
    frames_tx: bounded_channel::Sender<InboundFrame>,
    commands: mpsc::Receiver<PoolCommand>,
    token: CancellationToken,
) {
    let mut manager = ConnectionManager::new(config.clone(), account, channels, tickers, frames_tx).with_commands(commands);
    tokio::spawn(async move { manager.run(token).await });
}
