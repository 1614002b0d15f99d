//! Market listing and orderbook wire types.
//!
//! Status and market-type are carried as raw strings: the exchange's own
//! lifecycle vocabulary is inconsistent across endpoints (`active` vs.
//! `open`, `determined` vs. `settled`), so normalizing it is left to the
//! caller rather than baked into a closed enum here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Market {
    pub ticker: String,
    pub event_ticker: String,
    pub title: String,
    pub status: String,
    pub market_type: String,
    pub yes_bid_dollars: String,
    pub yes_ask_dollars: String,
    pub last_price_dollars: String,
    pub volume: i64,
    pub volume_24h: i64,
    pub open_interest: i64,
    pub open_ts: i64,
    pub close_ts: i64,
    pub expiration_ts: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl MarketsQuery {
    /// The exchange rejects page sizes above 1000.
    pub const MAX_LIMIT: u32 = 1000;

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit.min(Self::MAX_LIMIT));
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetMarketsResponse {
    pub markets: Vec<Market>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetMarketResponse {
    pub market: Market,
}

/// `(price_dollars, size)` resting levels for one side of the book.
pub type OrderbookSide = Vec<(String, i64)>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Orderbook {
    #[serde(default)]
    pub yes: OrderbookSide,
    #[serde(default)]
    pub no: OrderbookSide,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetMarketOrderbookResponse {
    pub orderbook: Orderbook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeTradingStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetExchangeStatusResponse {
    pub trading_active: bool,
    pub exchange_active: bool,
}
