//! Batch Writers: per-event-type buffered batching and bulk insert into
//! the time-series store.

mod batch;
mod pg_store;
pub mod store;

use std::sync::Arc;

use futures_util::future::BoxFuture;

pub use batch::{BatchWriter, WriterStats};
pub use pg_store::PgStore;
pub use store::Store;

use crate::bounded_channel;
use crate::config::WriterConfig;
use crate::errors::StoreError;
use crate::model::{OrderbookDeltaRow, OrderbookSnapshotRow, TickerRow, TradeRow};

pub type TradeWriter = BatchWriter<TradeRow>;
pub type OrderbookDeltaWriter = BatchWriter<OrderbookDeltaRow>;
pub type OrderbookSnapshotWriter = BatchWriter<OrderbookSnapshotRow>;
pub type TickerWriter = BatchWriter<TickerRow>;

pub fn trade_writer(config: WriterConfig, receiver: bounded_channel::Receiver<TradeRow>, store: Arc<dyn Store>) -> TradeWriter {
    BatchWriter::new(
        "trades",
        config,
        receiver,
        Box::new(move |rows| {
            let store = store.clone();
            Box::pin(async move { store.insert_trades(rows).await }) as BoxFuture<'static, Result<(), StoreError>>
        }),
    )
}

pub fn orderbook_delta_writer(
    config: WriterConfig,
    receiver: bounded_channel::Receiver<OrderbookDeltaRow>,
    store: Arc<dyn Store>,
) -> OrderbookDeltaWriter {
    BatchWriter::new(
        "orderbook_deltas",
        config,
        receiver,
        Box::new(move |rows| {
            let store = store.clone();
            Box::pin(async move { store.insert_orderbook_deltas(rows).await }) as BoxFuture<'static, Result<(), StoreError>>
        }),
    )
}

pub fn orderbook_snapshot_writer(
    config: WriterConfig,
    receiver: bounded_channel::Receiver<OrderbookSnapshotRow>,
    store: Arc<dyn Store>,
) -> OrderbookSnapshotWriter {
    BatchWriter::new(
        "orderbook_snapshots",
        config,
        receiver,
        Box::new(move |rows| {
            let store = store.clone();
            Box::pin(async move { store.insert_orderbook_snapshots(rows).await }) as BoxFuture<'static, Result<(), StoreError>>
        }),
    )
}

pub fn ticker_writer(config: WriterConfig, receiver: bounded_channel::Receiver<TickerRow>, store: Arc<dyn Store>) -> TickerWriter {
    BatchWriter::new(
        "tickers",
        config,
        receiver,
        Box::new(move |rows| {
            let store = store.clone();
            Box::pin(async move { store.insert_tickers(rows).await }) as BoxFuture<'static, Result<(), StoreError>>
        }),
    )
}
