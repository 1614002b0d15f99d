mod endpoints;
mod models;

pub use models::{
    ExchangeTradingStatus, GetExchangeStatusResponse, GetMarketOrderbookResponse, GetMarketResponse,
    GetMarketsResponse, Market, Orderbook, OrderbookSide, MarketsQuery,
};
