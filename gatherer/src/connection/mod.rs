//! Connection Manager: owns one WebSocket connection to the exchange,
//! subscribes to an assigned set of markets over an assigned set of
//! channels, reconnects with backoff on failure, and forwards typed
//! frames (with sequence-gap annotations attached) downstream for the
//! Message Router to interpret.
//!
//! Two pools of these run side by side: an orderbook pool, each instance
//! carrying up to `markets_per_connection` tickers subscribed only to
//! `orderbook_delta`, and a global pool, each instance subscribed to
//! `trade`+`ticker`+`market_lifecycle_v2` for the full market universe.
//! Both pools share this same type; `channels` is the only thing that
//! varies between them.

pub mod backoff;

use std::collections::HashMap;

use exchange_client::ws::models::UpdateAction;
use exchange_client::ws::{Channel, ExchangeSocketMessage, ExchangeWebsocketClient};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bounded_channel::{self, OverflowPolicy};
use crate::config::ConnectionConfig;
use crate::errors::ConnectionError;

/// A reassignment issued by a pool's least-loaded-connection assignment
/// table in response to a `MarketChange`: add or remove markets from this
/// connection's subscription, on every channel it currently carries.
#[derive(Debug, Clone)]
pub enum PoolCommand {
    AddMarkets(Vec<String>),
    RemoveMarkets(Vec<String>),
}

/// A frame as received off the wire, annotated with sequence-gap info for
/// channels that carry a `sid`/`seq`. `gap_size` is `observed - expected -
/// 1`, i.e. the number of updates that were missed; `0` when no gap was
/// detected. Channels without a `seq` (subscribed/unsubscribed/ok/error,
/// ticker, market lifecycle) pass through with `gap_detected: false`.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub message: ExchangeSocketMessage,
    pub gap_detected: bool,
    pub gap_size: u64,
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    account: Option<exchange_client::auth::Account>,
    channels: Vec<Channel>,
    market_tickers: Vec<String>,
    last_seq: HashMap<u64, u64>,
    frames_tx: bounded_channel::Sender<InboundFrame>,
    commands: Option<mpsc::Receiver<PoolCommand>>,
    current_sids: HashMap<Channel, u64>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        account: Option<exchange_client::auth::Account>,
        channels: Vec<Channel>,
        market_tickers: Vec<String>,
        frames_tx: bounded_channel::Sender<InboundFrame>,
    ) -> Self {
        Self {
            config,
            account,
            channels,
            market_tickers,
            last_seq: HashMap::new(),
            frames_tx,
            commands: None,
            current_sids: HashMap::new(),
        }
    }

    /// Attach the command channel a pool's assignment table uses to push
    /// `update_subscription` changes onto this connection's live markets.
    pub fn with_commands(mut self, commands: mpsc::Receiver<PoolCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Run the connect/subscribe/read loop until `token` is cancelled.
    /// Reconnects with exponential backoff on any non-fatal error,
    /// resetting per-sid sequence tracking on every fresh subscription
    /// since the exchange does not guarantee seq continuity across a
    /// resubscribe.
    pub async fn run(&mut self, token: CancellationToken) {
        let policy = backoff::ReconnectPolicy::new(
            self.config.backoff_initial,
            self.config.backoff_max,
            self.config.backoff_multiplier,
        );
        let mut attempt = 0u32;

        loop {
            if token.is_cancelled() {
                return;
            }

            match self.run_once(&token).await {
                Ok(()) => return,
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "connection manager aborting on fatal error");
                    return;
                }
                Err(e) => {
                    let delay = policy.next_delay(attempt);
                    attempt += 1;
                    warn!(error = %e, attempt, ?delay, "connection lost, reconnecting");
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn run_once(&mut self, token: &CancellationToken) -> Result<(), ConnectionError> {
        let mut client = ExchangeWebsocketClient::new(self.config.ws_url.clone(), self.account.clone());
        client.connect().await?;
        self.last_seq.clear();
        self.current_sids.clear();

        client.subscribe(self.channels.clone(), self.market_tickers.clone()).await?;
        info!(markets = self.market_tickers.len(), channels = ?self.channels, "subscribed");

        loop {
            let read = tokio::time::timeout(self.config.ping_timeout, client.next_message());
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                result = read => {
                    match result {
                        Err(_) => return Err(ConnectionError::Stale),
                        Ok(Err(e)) => return Err(e.into()),
                        Ok(Ok(None)) => return Err(ConnectionError::ClosedByPeer),
                        Ok(Ok(Some(message))) => self.handle_frame(message).await,
                    }
                }
                command = recv_command(&mut self.commands) => {
                    if let Some(command) = command {
                        self.apply_command(&mut client, command).await?;
                    }
                }
            }
        }
    }

    async fn apply_command(&mut self, client: &mut ExchangeWebsocketClient, command: PoolCommand) -> Result<(), ConnectionError> {
        let action = match &command {
            PoolCommand::AddMarkets(_) => UpdateAction::AddMarkets,
            PoolCommand::RemoveMarkets(_) => UpdateAction::RemoveMarkets,
        };
        let tickers = match command {
            PoolCommand::AddMarkets(tickers) => tickers,
            PoolCommand::RemoveMarkets(tickers) => tickers,
        };
        for &sid in self.current_sids.clone().values() {
            client.update_subscription(sid, tickers.clone(), action).await?;
        }
        match action {
            UpdateAction::AddMarkets => self.market_tickers.extend(tickers),
            UpdateAction::RemoveMarkets => self.market_tickers.retain(|t| !tickers.contains(t)),
        }
        Ok(())
    }

    async fn handle_frame(&mut self, message: ExchangeSocketMessage) {
        if let ExchangeSocketMessage::Subscribed(frame) = &message {
            self.current_sids.insert(frame.msg.channel, frame.msg.sid);
        }
        let (gap_detected, gap_size) = self.check_sequence(&message);
        self.frames_tx.send(InboundFrame { message, gap_detected, gap_size }).await;
    }

    /// Update per-sid sequence tracking and report whether this frame's
    /// `seq` was contiguous with the last one observed for its `sid`, plus
    /// how many updates were skipped if not (`observed - expected - 1`).
    fn check_sequence(&mut self, message: &ExchangeSocketMessage) -> (bool, u64) {
        let (sid, seq) = match message {
            ExchangeSocketMessage::OrderbookDelta(m) => (m.sid, m.seq),
            ExchangeSocketMessage::OrderbookSnapshot(m) => match m.seq {
                Some(seq) => (m.sid, seq),
                None => return (false, 0),
            },
            _ => return (false, 0),
        };

        match self.last_seq.get(&sid) {
            Some(&previous) => {
                self.last_seq.insert(sid, seq);
                if seq == previous + 1 {
                    (false, 0)
                } else {
                    let gap_size = seq.saturating_sub(previous + 1);
                    (true, gap_size)
                }
            }
            None => {
                self.last_seq.insert(sid, seq);
                (false, 0)
            }
        }
    }
}

pub fn make_frame_channel(capacity: usize) -> (bounded_channel::Sender<InboundFrame>, bounded_channel::Receiver<InboundFrame>) {
    bounded_channel::bounded(capacity, OverflowPolicy::DropOldest)
}

/// Awaits the next pool command, or never resolves if this connection has
/// none attached — keeping the `tokio::select!` arm inert rather than
/// special-cased.
async fn recv_command(commands: &mut Option<mpsc::Receiver<PoolCommand>>) -> Option<PoolCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_client::ws::models::{OrderbookDeltaFrame, OrderbookDeltaPayload, WireSide};

    fn delta(sid: u64, seq: u64) -> ExchangeSocketMessage {
        ExchangeSocketMessage::OrderbookDelta(OrderbookDeltaFrame {
            sid,
            seq,
            msg: OrderbookDeltaPayload {
                market_ticker: "FOO".to_string(),
                side: WireSide::Yes,
                price_dollars: "0.50".to_string(),
                size_delta: 10,
            },
        })
    }

    fn manager() -> ConnectionManager {
        let (tx, _rx) = make_frame_channel(8);
        ConnectionManager::new(
            ConnectionConfig::default(),
            None,
            vec![Channel::OrderbookDelta],
            vec!["FOO".to_string()],
            tx,
        )
    }

    #[test]
    fn test_check_sequence_detects_gap() {
        let mut manager = manager();

        assert_eq!(manager.check_sequence(&delta(1, 1)), (false, 0));
        assert_eq!(manager.check_sequence(&delta(1, 2)), (false, 0));
        // expected 3, observed 5: two updates (3, 4) were skipped.
        assert_eq!(manager.check_sequence(&delta(1, 5)), (true, 2));
        assert_eq!(manager.check_sequence(&delta(1, 6)), (false, 0));
    }

    #[test]
    fn test_check_sequence_tracks_sids_independently() {
        let mut manager = manager();

        assert_eq!(manager.check_sequence(&delta(1, 1)), (false, 0));
        assert_eq!(manager.check_sequence(&delta(2, 1)), (false, 0));
        assert_eq!(manager.check_sequence(&delta(1, 2)), (false, 0));
        assert_eq!(manager.check_sequence(&delta(2, 2)), (false, 0));
    }
}
