//! Typed WebSocket frames.
//!
//! Every inbound frame carries a `type` discriminant; `determine_type` reads
//! just that field first so the router can dispatch without fully decoding
//! frames it isn't interested in. Numeric prices travel the wire as dollar
//! strings (e.g. `"0.5250"`); callers convert with `gatherer::price::Price`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    OrderbookDelta,
    Trade,
    Ticker,
    MarketLifecycleV2,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Subscribe {
        id: u64,
        params: SubscribeParams,
    },
    Unsubscribe {
        id: u64,
        params: UnsubscribeParams,
    },
    UpdateSubscription {
        id: u64,
        params: UpdateSubscriptionParams,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeParams {
    pub channels: Vec<Channel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub market_tickers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeParams {
    pub sids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateSubscriptionParams {
    pub sid: u64,
    pub market_tickers: Vec<String>,
    pub action: UpdateAction,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    AddMarkets,
    RemoveMarkets,
}

/// Raw, untyped lookahead used only to decide which concrete variant to
/// parse the frame into.
#[derive(Debug, Deserialize)]
pub(crate) struct FrameEnvelope {
    #[serde(rename = "type")]
    pub frame_type: String,
}

pub(crate) fn determine_type(raw: &str) -> Option<String> {
    serde_json::from_str::<FrameEnvelope>(raw)
        .ok()
        .map(|envelope| envelope.frame_type)
}

/// `Seconds` is the integer-seconds-since-epoch form some channels use;
/// `Iso8601` is the string form others use. Both normalize to microseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Seconds(i64),
    Iso8601(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribedMsgPayload {
    pub sid: u64,
    pub channel: Channel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribedFrame {
    pub msg: SubscribedMsgPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribedMsgPayload {
    pub sids: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribedFrame {
    pub msg: UnsubscribedMsgPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkFrame {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    pub id: Option<u64>,
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireSide {
    Yes,
    No,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradePayload {
    pub market_ticker: String,
    pub trade_id: String,
    pub count: i64,
    pub yes_price_dollars: String,
    pub no_price_dollars: String,
    pub taker_side: WireSide,
    #[serde(default)]
    pub ts: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeFrame {
    pub sid: u64,
    pub seq: Option<u64>,
    pub msg: TradePayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookDeltaPayload {
    pub market_ticker: String,
    pub side: WireSide,
    pub price_dollars: String,
    pub size_delta: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookDeltaFrame {
    pub sid: u64,
    pub seq: u64,
    pub msg: OrderbookDeltaPayload,
}

/// `(price_dollars, size)` resting levels for one side of the book.
pub type DollarLevels = Vec<(String, i64)>;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookSnapshotPayload {
    pub market_ticker: String,
    #[serde(default)]
    pub yes: DollarLevels,
    #[serde(default)]
    pub no: DollarLevels,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookSnapshotFrame {
    pub sid: u64,
    pub seq: Option<u64>,
    pub msg: OrderbookSnapshotPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerPayload {
    pub market_ticker: String,
    pub yes_bid_dollars: String,
    pub yes_ask_dollars: String,
    pub last_price_dollars: String,
    pub volume: i64,
    pub open_interest: i64,
    #[serde(default)]
    pub dollar_volume: i64,
    #[serde(default)]
    pub dollar_open_interest: i64,
    #[serde(default)]
    pub ts: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerFrame {
    pub sid: u64,
    pub msg: TickerPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketLifecyclePayload {
    pub market_ticker: String,
    pub event_type: String,
    #[serde(default)]
    pub new_status: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketLifecycleFrame {
    pub msg: MarketLifecyclePayload,
}

/// Every inbound frame, dispatched on `type`. Frames this client doesn't
/// recognize decode to `Unknown` rather than erroring the connection.
#[derive(Debug, Clone)]
pub enum ExchangeSocketMessage {
    Subscribed(SubscribedFrame),
    Unsubscribed(UnsubscribedFrame),
    Ok(OkFrame),
    Error(ErrorFrame),
    OrderbookSnapshot(OrderbookSnapshotFrame),
    OrderbookDelta(OrderbookDeltaFrame),
    Trade(TradeFrame),
    Ticker(TickerFrame),
    MarketLifecycle(MarketLifecycleFrame),
    Unknown(String),
}

impl ExchangeSocketMessage {
    pub fn parse(raw: &str) -> Self {
        let Some(frame_type) = determine_type(raw) else {
            return ExchangeSocketMessage::Unknown(raw.to_string());
        };

        macro_rules! decode {
            ($variant:ident) => {
                match serde_json::from_str(raw) {
                    Ok(payload) => ExchangeSocketMessage::$variant(payload),
                    Err(_) => ExchangeSocketMessage::Unknown(raw.to_string()),
                }
            };
        }

        match frame_type.as_str() {
            "subscribed" => decode!(Subscribed),
            "unsubscribed" => decode!(Unsubscribed),
            "ok" => decode!(Ok),
            "error" => decode!(Error),
            "orderbook_snapshot" => decode!(OrderbookSnapshot),
            "orderbook_delta" => decode!(OrderbookDelta),
            "trade" => decode!(Trade),
            "ticker" => decode!(Ticker),
            "market_lifecycle_v2" | "market_lifecycle" => decode!(MarketLifecycle),
            _ => ExchangeSocketMessage::Unknown(raw.to_string()),
        }
    }
}
