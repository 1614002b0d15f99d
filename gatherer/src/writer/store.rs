//! The `Store` trait batch writers drain into, plus an in-memory
//! `RecordingStore` test double so writer tests don't need a live Postgres
//! instance.

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::model::{OrderbookDeltaRow, OrderbookSnapshotRow, TickerRow, TradeRow};

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_trades(&self, rows: Vec<TradeRow>) -> Result<(), StoreError>;
    async fn insert_orderbook_deltas(&self, rows: Vec<OrderbookDeltaRow>) -> Result<(), StoreError>;
    async fn insert_orderbook_snapshots(&self, rows: Vec<OrderbookSnapshotRow>) -> Result<(), StoreError>;
    async fn insert_tickers(&self, rows: Vec<TickerRow>) -> Result<(), StoreError>;
}

pub mod test_support {
    use tokio::sync::Mutex;

    use super::*;

    /// Accumulates every row handed to it rather than writing anywhere, so
    /// writer tests can assert on exactly what was flushed.
    #[derive(Default)]
    pub struct RecordingStore {
        pub trades: Mutex<Vec<TradeRow>>,
        pub orderbook_deltas: Mutex<Vec<OrderbookDeltaRow>>,
        pub orderbook_snapshots: Mutex<Vec<OrderbookSnapshotRow>>,
        pub tickers: Mutex<Vec<TickerRow>>,
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn insert_trades(&self, mut rows: Vec<TradeRow>) -> Result<(), StoreError> {
            self.trades.lock().await.append(&mut rows);
            Ok(())
        }

        async fn insert_orderbook_deltas(&self, mut rows: Vec<OrderbookDeltaRow>) -> Result<(), StoreError> {
            self.orderbook_deltas.lock().await.append(&mut rows);
            Ok(())
        }

        async fn insert_orderbook_snapshots(&self, mut rows: Vec<OrderbookSnapshotRow>) -> Result<(), StoreError> {
            self.orderbook_snapshots.lock().await.append(&mut rows);
            Ok(())
        }

        async fn insert_tickers(&self, mut rows: Vec<TickerRow>) -> Result<(), StoreError> {
            self.tickers.lock().await.append(&mut rows);
            Ok(())
        }
    }

    /// A `Store` whose every method fails, for exercising the writer's
    /// retry-then-drop path.
    pub struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn insert_trades(&self, _rows: Vec<TradeRow>) -> Result<(), StoreError> {
            Err(StoreError::Other("simulated failure".to_string()))
        }

        async fn insert_orderbook_deltas(&self, _rows: Vec<OrderbookDeltaRow>) -> Result<(), StoreError> {
            Err(StoreError::Other("simulated failure".to_string()))
        }

        async fn insert_orderbook_snapshots(&self, _rows: Vec<OrderbookSnapshotRow>) -> Result<(), StoreError> {
            Err(StoreError::Other("simulated failure".to_string()))
        }

        async fn insert_tickers(&self, _rows: Vec<TickerRow>) -> Result<(), StoreError> {
            Err(StoreError::Other("simulated failure".to_string()))
        }
    }
}
