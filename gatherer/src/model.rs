//! Shared entity types: the registry's view of a market, the changes it
//! emits, and the row shapes the batch writers persist.

use serde::{Deserialize, Serialize};

use crate::price::Price;

/// The exchange's lifecycle vocabulary is inconsistent across its own
/// surfaces: the market listing reports one set of status strings
/// (`initialized`/`inactive`/`active`/`closed`/`determined`/`disputed`/
/// `amended`/`finalized`), while some lifecycle frames use `open` and
/// `settled` as synonyms for `active` and `determined`. Both spellings are
/// accepted and normalized to one enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Initialized,
    Inactive,
    Active,
    Closed,
    Determined,
    Disputed,
    Amended,
    Finalized,
}

impl MarketStatus {
    /// A market is in the active set iff its status is `active` (the
    /// wire's `open` is a synonym for the same state).
    pub fn is_active(&self) -> bool {
        matches!(self, MarketStatus::Active)
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "initialized" => Some(MarketStatus::Initialized),
            "inactive" => Some(MarketStatus::Inactive),
            "active" | "open" => Some(MarketStatus::Active),
            "closed" => Some(MarketStatus::Closed),
            "determined" | "settled" => Some(MarketStatus::Determined),
            "disputed" => Some(MarketStatus::Disputed),
            "amended" => Some(MarketStatus::Amended),
            "finalized" => Some(MarketStatus::Finalized),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Binary,
    Scalar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub ticker: String,
    pub event_ticker: String,
    pub title: String,
    pub status: MarketStatus,
    pub market_type: MarketType,
    pub yes_bid: Price,
    pub yes_ask: Price,
    pub last_price: Price,
    pub volume: i64,
    pub volume_24h: i64,
    pub open_interest: i64,
    pub open_ts: i64,
    pub close_ts: i64,
    pub expiration_ts: i64,
}

impl Market {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketChangeType {
    Created,
    StatusChange,
    Settled,
}

/// Produced by the Registry, consumed by the Connection Manager (to
/// (un)subscribe) and any external `SubscribeChanges` caller. Ephemeral:
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketChange {
    pub ticker: String,
    pub event_type: MarketChangeType,
    pub old_status: Option<MarketStatus>,
    pub new_status: Option<MarketStatus>,
    /// `None` for `Settled` (the market snapshot is no longer meaningful).
    pub market: Option<Market>,
}

/// `true` = YES, matching the wire's `taker_side`/`side` boolean
/// convention.
pub type Side = bool;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    pub trade_id: uuid::Uuid,
    pub exchange_ts: i64,
    pub received_at: i64,
    pub ticker: String,
    pub price: Price,
    pub size: i64,
    pub taker_side: Side,
    pub sid: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderbookDeltaRow {
    pub exchange_ts: i64,
    pub received_at: i64,
    pub ticker: String,
    pub side: Side,
    pub price: Price,
    pub size_delta: i64,
    pub seq: u64,
    pub sid: u64,
    pub seq_gap: bool,
    pub gap_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotSource {
    Ws,
    Rest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderbookSnapshotRow {
    pub snapshot_ts: i64,
    /// `0` for a synthetic (REST-sourced) snapshot with no wire timestamp.
    pub exchange_ts: i64,
    pub ticker: String,
    pub source: SnapshotSource,
    pub yes_bids: Vec<(Price, i64)>,
    pub yes_asks: Vec<(Price, i64)>,
    pub no_bids: Vec<(Price, i64)>,
    pub no_asks: Vec<(Price, i64)>,
    pub best_yes_bid: Option<Price>,
    pub best_yes_ask: Option<Price>,
    pub spread: Option<i64>,
    pub sid: Option<u64>,
}

impl OrderbookSnapshotRow {
    /// Build a snapshot from raw yes/no resting levels. `yes_asks` and
    /// `no_asks` are derived as the complement of the opposite side's bids
    /// (binary-market invariant: a YES ask at price `p` is a NO bid at
    /// `100000 - p`), matching invariant 5's sort order (bids descending,
    /// asks ascending).
    pub fn from_levels(
        ticker: String,
        source: SnapshotSource,
        snapshot_ts: i64,
        exchange_ts: i64,
        sid: Option<u64>,
        yes_bids: Vec<(Price, i64)>,
        no_bids: Vec<(Price, i64)>,
    ) -> Self {
        let complement = |price: Price| Price::from_scaled(100_000 - price.scaled()).unwrap_or(price);

        let mut yes_asks: Vec<(Price, i64)> = no_bids.iter().map(|&(p, s)| (complement(p), s)).collect();
        let mut no_asks: Vec<(Price, i64)> = yes_bids.iter().map(|&(p, s)| (complement(p), s)).collect();

        let mut yes_bids_sorted = yes_bids;
        let mut no_bids_sorted = no_bids;
        yes_bids_sorted.sort_by(|a, b| b.0.cmp(&a.0));
        no_bids_sorted.sort_by(|a, b| b.0.cmp(&a.0));
        yes_asks.sort_by(|a, b| a.0.cmp(&b.0));
        no_asks.sort_by(|a, b| a.0.cmp(&b.0));

        let best_yes_bid = yes_bids_sorted.first().map(|&(p, _)| p);
        let best_yes_ask = yes_asks.first().map(|&(p, _)| p);
        let spread = match (best_yes_bid, best_yes_ask) {
            (Some(bid), Some(ask)) => Some(ask.scaled() as i64 - bid.scaled() as i64),
            _ => None,
        };

        Self {
            snapshot_ts,
            exchange_ts,
            ticker,
            source,
            yes_bids: yes_bids_sorted,
            yes_asks,
            no_bids: no_bids_sorted,
            no_asks,
            best_yes_bid,
            best_yes_ask,
            spread,
            sid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerRow {
    pub exchange_ts: i64,
    pub received_at: i64,
    pub ticker: String,
    pub yes_bid: Price,
    pub yes_ask: Price,
    pub last_price: Price,
    pub volume: i64,
    pub open_interest: i64,
    pub dollar_volume: i64,
    pub dollar_open_interest: i64,
    pub sid: u64,
}
