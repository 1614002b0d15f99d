//! Message Router: stateless parse-and-demux of inbound frames into typed,
//! normalized rows, fanned out onto per-type bounded channels for the
//! batch writers and, for lifecycle frames, forwarded untouched to the
//! registry for it to interpret.

use exchange_client::ws::models::{ExchangeSocketMessage, WireSide};
use tracing::warn;
use uuid::Uuid;

use crate::bounded_channel::{self, OverflowPolicy};
use crate::connection::InboundFrame;
use crate::model::{OrderbookDeltaRow, OrderbookSnapshotRow, SnapshotSource, TickerRow, TradeRow};
use crate::poller::parse_levels;
use crate::price::Price;
use crate::time::{is_valid_ts, normalize_ts};

fn to_side(wire: WireSide) -> bool {
    matches!(wire, WireSide::Yes)
}

pub struct RouterOutputs {
    pub trades: bounded_channel::Sender<TradeRow>,
    pub orderbook_deltas: bounded_channel::Sender<OrderbookDeltaRow>,
    pub orderbook_snapshots: bounded_channel::Sender<OrderbookSnapshotRow>,
    pub tickers: bounded_channel::Sender<TickerRow>,
    pub lifecycle: tokio::sync::mpsc::Sender<exchange_client::ws::models::MarketLifecycleFrame>,
}

pub struct RouterReceivers {
    pub trades: bounded_channel::Receiver<TradeRow>,
    pub orderbook_deltas: bounded_channel::Receiver<OrderbookDeltaRow>,
    pub orderbook_snapshots: bounded_channel::Receiver<OrderbookSnapshotRow>,
    pub tickers: bounded_channel::Receiver<TickerRow>,
    pub lifecycle: tokio::sync::mpsc::Receiver<exchange_client::ws::models::MarketLifecycleFrame>,
}

/// Default per-channel buffer sizes: orderbook delta 5000, orderbook
/// snapshot 500 (snapshots are far less frequent than deltas), trade 1000,
/// ticker 1000.
pub struct RouterCapacities {
    pub orderbook: usize,
    pub orderbook_snapshot: usize,
    pub trade: usize,
    pub ticker: usize,
    pub lifecycle: usize,
}

impl Default for RouterCapacities {
    fn default() -> Self {
        Self {
            orderbook: 5_000,
            orderbook_snapshot: 500,
            trade: 1_000,
            ticker: 1_000,
            lifecycle: 1_000,
        }
    }
}

/// Builds the router's own snapshot channel alongside the rest. The
/// returned `RouterOutputs::orderbook_snapshots` sender can be cloned (the
/// Snapshot Poller's REST-sourced snapshots feed the same writer this way)
/// before the outputs are moved into the frame-routing task.
pub fn make_router_outputs(capacities: RouterCapacities) -> (RouterOutputs, RouterReceivers) {
    let (trades_tx, trades_rx) = bounded_channel::bounded(capacities.trade, OverflowPolicy::DropOldest);
    let (deltas_tx, deltas_rx) = bounded_channel::bounded(capacities.orderbook, OverflowPolicy::DropOldest);
    let (snapshots_tx, snapshots_rx) = bounded_channel::bounded(capacities.orderbook_snapshot, OverflowPolicy::DropOldest);
    let (tickers_tx, tickers_rx) = bounded_channel::bounded(capacities.ticker, OverflowPolicy::DropOldest);
    let (lifecycle_tx, lifecycle_rx) = tokio::sync::mpsc::channel(capacities.lifecycle);
    (
        RouterOutputs {
            trades: trades_tx,
            orderbook_deltas: deltas_tx,
            orderbook_snapshots: snapshots_tx,
            tickers: tickers_tx,
            lifecycle: lifecycle_tx,
        },
        RouterReceivers {
            trades: trades_rx,
            orderbook_deltas: deltas_rx,
            orderbook_snapshots: snapshots_rx,
            tickers: tickers_rx,
            lifecycle: lifecycle_rx,
        },
    )
}

/// Parse one inbound frame and route it to the appropriate output channel.
/// A parse error drops and counts the frame rather than aborting the
/// connection; unknown `type`s, and `subscribed`/`unsubscribed`/`ok`
/// acknowledgements, are silently ignored, matching the forgiving-parsing
/// contract.
pub async fn route(frame: InboundFrame, received_at: i64, outputs: &RouterOutputs) {
    match frame.message {
        ExchangeSocketMessage::OrderbookDelta(wire) => {
            let Ok(price) = Price::parse_dollars(&wire.msg.price_dollars) else {
                warn!(price = %wire.msg.price_dollars, "dropping orderbook delta with unparseable price");
                return;
            };
            let row = OrderbookDeltaRow {
                exchange_ts: received_at,
                received_at,
                ticker: wire.msg.market_ticker,
                side: to_side(wire.msg.side),
                price,
                size_delta: wire.msg.size_delta,
                seq: wire.seq,
                sid: wire.sid,
                seq_gap: frame.gap_detected,
                gap_size: frame.gap_size,
            };
            outputs.orderbook_deltas.send(row).await;
        }
        ExchangeSocketMessage::Trade(wire) => {
            let Ok(yes_price) = Price::parse_dollars(&wire.msg.yes_price_dollars) else {
                warn!(price = %wire.msg.yes_price_dollars, "dropping trade with unparseable yes price");
                return;
            };
            let Ok(trade_id) = Uuid::parse_str(&wire.msg.trade_id) else {
                warn!(trade_id = %wire.msg.trade_id, "dropping trade with unparseable trade id");
                return;
            };
            let exchange_ts = normalize_ts(&wire.msg.ts, received_at);
            if !is_valid_ts(exchange_ts) {
                warn!(ticker = %wire.msg.market_ticker, exchange_ts, "dropping trade with negative timestamp");
                return;
            }
            let row = TradeRow {
                trade_id,
                exchange_ts,
                received_at,
                ticker: wire.msg.market_ticker,
                price: yes_price,
                size: wire.msg.count,
                taker_side: to_side(wire.msg.taker_side),
                sid: wire.sid,
            };
            outputs.trades.send(row).await;
        }
        ExchangeSocketMessage::Ticker(wire) => {
            let (Ok(yes_bid), Ok(yes_ask), Ok(last_price)) = (
                Price::parse_dollars(&wire.msg.yes_bid_dollars),
                Price::parse_dollars(&wire.msg.yes_ask_dollars),
                Price::parse_dollars(&wire.msg.last_price_dollars),
            ) else {
                warn!(ticker = %wire.msg.market_ticker, "dropping ticker update with unparseable price");
                return;
            };
            let exchange_ts = normalize_ts(&wire.msg.ts, received_at);
            if !is_valid_ts(exchange_ts) {
                warn!(ticker = %wire.msg.market_ticker, exchange_ts, "dropping ticker update with negative timestamp");
                return;
            }
            let row = TickerRow {
                exchange_ts,
                received_at,
                ticker: wire.msg.market_ticker,
                yes_bid,
                yes_ask,
                last_price,
                volume: wire.msg.volume,
                open_interest: wire.msg.open_interest,
                dollar_volume: wire.msg.dollar_volume,
                dollar_open_interest: wire.msg.dollar_open_interest,
                sid: wire.sid,
            };
            outputs.tickers.send(row).await;
        }
        ExchangeSocketMessage::MarketLifecycle(frame) => {
            let _ = outputs.lifecycle.send(frame).await;
        }
        ExchangeSocketMessage::OrderbookSnapshot(wire) => {
            let yes_bids = parse_levels(&wire.msg.yes);
            let no_bids = parse_levels(&wire.msg.no);
            let row = OrderbookSnapshotRow::from_levels(
                wire.msg.market_ticker,
                SnapshotSource::Ws,
                received_at,
                received_at,
                Some(wire.sid),
                yes_bids,
                no_bids,
            );
            outputs.orderbook_snapshots.send(row).await;
        }
        ExchangeSocketMessage::Error(frame) => {
            warn!(code = frame.code, msg = %frame.msg, id = ?frame.id, "exchange rejected a command");
        }
        ExchangeSocketMessage::Subscribed(_) | ExchangeSocketMessage::Unsubscribed(_) | ExchangeSocketMessage::Ok(_) | ExchangeSocketMessage::Unknown(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_client::ws::models::{
        ErrorFrame, OrderbookDeltaFrame, OrderbookDeltaPayload, OrderbookSnapshotFrame, OrderbookSnapshotPayload, RawTimestamp, TradeFrame,
        TradePayload,
    };

    #[tokio::test]
    async fn test_route_trade_parses_literal_example() {
        let (outputs, mut rx) = make_router_outputs(RouterCapacities::default());

        let frame = InboundFrame {
            message: ExchangeSocketMessage::Trade(TradeFrame {
                sid: 1,
                seq: Some(5),
                msg: TradePayload {
                    market_ticker: "FOO".to_string(),
                    trade_id: "11111111-1111-1111-1111-111111111111".to_string(),
                    count: 10,
                    yes_price_dollars: "0.5250".to_string(),
                    no_price_dollars: "0.4750".to_string(),
                    taker_side: WireSide::Yes,
                    ts: Some(RawTimestamp::Seconds(1_705_320_000)),
                },
            }),
            gap_detected: false,
            gap_size: 0,
        };
        route(frame, 0, &outputs).await;

        let row = rx.trades.recv().await.unwrap();
        assert_eq!(row.ticker, "FOO");
        assert_eq!(row.price.scaled(), 52_500);
        assert_eq!(row.size, 10);
        assert!(row.taker_side);
        assert_eq!(row.exchange_ts, 1_705_320_000_000_000);
    }

    #[tokio::test]
    async fn test_route_orderbook_delta_carries_gap_flag() {
        let (outputs, mut rx) = make_router_outputs(RouterCapacities::default());
        let frame = InboundFrame {
            message: ExchangeSocketMessage::OrderbookDelta(OrderbookDeltaFrame {
                sid: 9,
                seq: 42,
                msg: OrderbookDeltaPayload {
                    market_ticker: "BAR".to_string(),
                    side: WireSide::No,
                    price_dollars: "0.12345".to_string(),
                    size_delta: -5,
                },
            }),
            gap_detected: true,
            gap_size: 2,
        };
        route(frame, 123, &outputs).await;
        let row = rx.orderbook_deltas.recv().await.unwrap();
        assert!(row.seq_gap);
        assert_eq!(row.gap_size, 2);
        assert_eq!(row.seq, 42);
        assert!(!row.side);
    }

    #[tokio::test]
    async fn test_route_drops_trade_with_bad_uuid() {
        let (outputs, mut rx) = make_router_outputs(RouterCapacities::default());
        let frame = InboundFrame {
            message: ExchangeSocketMessage::Trade(TradeFrame {
                sid: 1,
                seq: None,
                msg: TradePayload {
                    market_ticker: "FOO".to_string(),
                    trade_id: "not-a-uuid".to_string(),
                    count: 1,
                    yes_price_dollars: "0.5".to_string(),
                    no_price_dollars: "0.5".to_string(),
                    taker_side: WireSide::Yes,
                    ts: Some(RawTimestamp::Seconds(0)),
                },
            }),
            gap_detected: false,
            gap_size: 0,
        };
        route(frame, 0, &outputs).await;
        drop(outputs);
        assert!(rx.trades.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_route_orderbook_snapshot_builds_row_from_levels() {
        let (outputs, mut rx) = make_router_outputs(RouterCapacities::default());
        let frame = InboundFrame {
            message: ExchangeSocketMessage::OrderbookSnapshot(OrderbookSnapshotFrame {
                sid: 3,
                seq: Some(1),
                msg: OrderbookSnapshotPayload {
                    market_ticker: "FOO".to_string(),
                    yes: vec![("0.40".to_string(), 10)],
                    no: vec![("0.55".to_string(), 20)],
                },
            }),
            gap_detected: false,
            gap_size: 0,
        };
        route(frame, 555, &outputs).await;

        let row = rx.orderbook_snapshots.recv().await.unwrap();
        assert_eq!(row.ticker, "FOO");
        assert_eq!(row.source, SnapshotSource::Ws);
        assert_eq!(row.sid, Some(3));
        assert_eq!(row.snapshot_ts, 555);
        assert_eq!(row.exchange_ts, 555);
        assert_eq!(row.yes_bids, vec![(Price::parse_dollars("0.40").unwrap(), 10)]);
        assert_eq!(row.no_bids, vec![(Price::parse_dollars("0.55").unwrap(), 20)]);
        assert_eq!(row.best_yes_bid, Some(Price::parse_dollars("0.40").unwrap()));
    }

    #[tokio::test]
    async fn test_route_orderbook_snapshot_skips_unparseable_levels() {
        let (outputs, mut rx) = make_router_outputs(RouterCapacities::default());
        let frame = InboundFrame {
            message: ExchangeSocketMessage::OrderbookSnapshot(OrderbookSnapshotFrame {
                sid: 3,
                seq: None,
                msg: OrderbookSnapshotPayload {
                    market_ticker: "FOO".to_string(),
                    yes: vec![("not-a-price".to_string(), 10)],
                    no: vec![],
                },
            }),
            gap_detected: false,
            gap_size: 0,
        };
        route(frame, 0, &outputs).await;

        let row = rx.orderbook_snapshots.recv().await.unwrap();
        assert!(row.yes_bids.is_empty());
        assert!(row.best_yes_bid.is_none());
    }

    #[tokio::test]
    async fn test_route_error_frame_does_not_panic_or_enqueue_anything() {
        let (outputs, mut rx) = make_router_outputs(RouterCapacities::default());
        let frame = InboundFrame {
            message: ExchangeSocketMessage::Error(ErrorFrame {
                id: Some(7),
                code: 6,
                msg: "already subscribed".to_string(),
            }),
            gap_detected: false,
            gap_size: 0,
        };
        route(frame, 0, &outputs).await;
        drop(outputs);

        assert!(rx.trades.recv().await.is_none());
        assert!(rx.orderbook_deltas.recv().await.is_none());
        assert!(rx.orderbook_snapshots.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_route_drops_trade_with_negative_timestamp() {
        let (outputs, mut rx) = make_router_outputs(RouterCapacities::default());
        let frame = InboundFrame {
            message: ExchangeSocketMessage::Trade(TradeFrame {
                sid: 1,
                seq: Some(1),
                msg: TradePayload {
                    market_ticker: "FOO".to_string(),
                    trade_id: "11111111-1111-1111-1111-111111111111".to_string(),
                    count: 1,
                    yes_price_dollars: "0.5".to_string(),
                    no_price_dollars: "0.5".to_string(),
                    taker_side: WireSide::Yes,
                    ts: Some(RawTimestamp::Seconds(-1)),
                },
            }),
            gap_detected: false,
            gap_size: 0,
        };
        route(frame, 0, &outputs).await;
        drop(outputs);
        assert!(rx.trades.recv().await.is_none());
    }
}
