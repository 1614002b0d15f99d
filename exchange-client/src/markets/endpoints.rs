//! Market listing, single-market lookup, and orderbook endpoint bindings.

use super::models::{
    GetExchangeStatusResponse, GetMarketOrderbookResponse, GetMarketResponse, GetMarketsResponse, MarketsQuery,
};
use crate::client::ExchangeClient;
use crate::errors::Result;

const MARKETS_PATH: &str = "/trade-api/v2/markets";
const EXCHANGE_STATUS_PATH: &str = "/trade-api/v2/exchange/status";

impl ExchangeClient {
    /// Fetch a page of markets. Callers follow `cursor` until it comes back
    /// empty to walk the full listing.
    pub async fn get_markets(&self, query: &MarketsQuery) -> Result<GetMarketsResponse> {
        self.get(MARKETS_PATH, query).await
    }

    pub async fn get_market(&self, ticker: &str) -> Result<GetMarketResponse> {
        let path = format!("{MARKETS_PATH}/{ticker}");
        self.get(&path, &()).await
    }

    /// Fetch the full-depth orderbook for a market (`depth=0`).
    pub async fn get_market_orderbook(&self, ticker: &str) -> Result<GetMarketOrderbookResponse> {
        let path = format!("{MARKETS_PATH}/{ticker}/orderbook");
        self.get(&path, &[("depth", 0)]).await
    }

    pub async fn get_exchange_status(&self) -> Result<GetExchangeStatusResponse> {
        self.get(EXCHANGE_STATUS_PATH, &()).await
    }
}
