//! `Store` implementation against the time-series hypertable schema.
//! Bulk inserts go through `UNNEST`-based multi-row `INSERT`s with `ON
//! CONFLICT DO NOTHING`, matching the "silently skipped on PK conflict"
//! contract: the downstream deduplicator is authoritative, not this store.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::StoreError;
use crate::model::{OrderbookDeltaRow, OrderbookSnapshotRow, SnapshotSource, TickerRow, TradeRow};
use crate::price::Price;

use super::store::Store;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_trades(&self, rows: Vec<TradeRow>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let trade_ids: Vec<_> = rows.iter().map(|r| r.trade_id).collect();
        let exchange_ts: Vec<_> = rows.iter().map(|r| r.exchange_ts).collect();
        let received_at: Vec<_> = rows.iter().map(|r| r.received_at).collect();
        let tickers: Vec<_> = rows.iter().map(|r| r.ticker.clone()).collect();
        let prices: Vec<_> = rows.iter().map(|r| r.price.scaled()).collect();
        let sizes: Vec<_> = rows.iter().map(|r| r.size as i32).collect();
        let taker_sides: Vec<_> = rows.iter().map(|r| r.taker_side).collect();
        let sids: Vec<_> = rows.iter().map(|r| r.sid as i64).collect();

        sqlx::query(
            r#"
            INSERT INTO trades (trade_id, exchange_ts, received_at, ticker, price, size, taker_side, sid)
            SELECT * FROM UNNEST($1::uuid[], $2::bigint[], $3::bigint[], $4::text[], $5::int[], $6::int[], $7::bool[], $8::bigint[])
            ON CONFLICT (trade_id, exchange_ts) DO NOTHING
            "#,
        )
        .bind(trade_ids)
        .bind(exchange_ts)
        .bind(received_at)
        .bind(tickers)
        .bind(prices)
        .bind(sizes)
        .bind(taker_sides)
        .bind(sids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_orderbook_deltas(&self, rows: Vec<OrderbookDeltaRow>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let exchange_ts: Vec<_> = rows.iter().map(|r| r.exchange_ts).collect();
        let received_at: Vec<_> = rows.iter().map(|r| r.received_at).collect();
        let tickers: Vec<_> = rows.iter().map(|r| r.ticker.clone()).collect();
        let sides: Vec<_> = rows.iter().map(|r| r.side).collect();
        let prices: Vec<_> = rows.iter().map(|r| r.price.scaled()).collect();
        let size_deltas: Vec<_> = rows.iter().map(|r| r.size_delta as i32).collect();
        let seqs: Vec<_> = rows.iter().map(|r| r.seq as i64).collect();
        let sids: Vec<_> = rows.iter().map(|r| r.sid as i64).collect();

        sqlx::query(
            r#"
            INSERT INTO orderbook_deltas (exchange_ts, received_at, ticker, side, price, size_delta, seq, sid)
            SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::text[], $4::bool[], $5::int[], $6::int[], $7::bigint[], $8::bigint[])
            ON CONFLICT (exchange_ts, ticker, price, side) DO NOTHING
            "#,
        )
        .bind(exchange_ts)
        .bind(received_at)
        .bind(tickers)
        .bind(sides)
        .bind(prices)
        .bind(size_deltas)
        .bind(seqs)
        .bind(sids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Snapshot rows carry nested level arrays, which don't fit the flat
    /// `UNNEST` shape the other three writers use; these insert one row at
    /// a time inside a transaction instead.
    async fn insert_orderbook_snapshots(&self, rows: Vec<OrderbookSnapshotRow>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for row in &rows {
            let yes_bids = levels_to_json(&row.yes_bids);
            let yes_asks = levels_to_json(&row.yes_asks);
            let no_bids = levels_to_json(&row.no_bids);
            let no_asks = levels_to_json(&row.no_asks);

            sqlx::query(
                r#"
                INSERT INTO orderbook_snapshots
                    (snapshot_ts, exchange_ts, ticker, source, yes_bids, yes_asks, no_bids, no_asks, best_yes_bid, best_yes_ask, spread, sid)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (snapshot_ts, ticker, source) DO NOTHING
                "#,
            )
            .bind(row.snapshot_ts)
            .bind(row.exchange_ts)
            .bind(&row.ticker)
            .bind(source_label(row.source))
            .bind(yes_bids)
            .bind(yes_asks)
            .bind(no_bids)
            .bind(no_asks)
            .bind(row.best_yes_bid.map(|p| p.scaled()))
            .bind(row.best_yes_ask.map(|p| p.scaled()))
            .bind(row.spread)
            .bind(row.sid.map(|sid| sid as i64))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_tickers(&self, rows: Vec<TickerRow>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let exchange_ts: Vec<_> = rows.iter().map(|r| r.exchange_ts).collect();
        let received_at: Vec<_> = rows.iter().map(|r| r.received_at).collect();
        let tickers: Vec<_> = rows.iter().map(|r| r.ticker.clone()).collect();
        let yes_bids: Vec<_> = rows.iter().map(|r| r.yes_bid.scaled()).collect();
        let yes_asks: Vec<_> = rows.iter().map(|r| r.yes_ask.scaled()).collect();
        let last_prices: Vec<_> = rows.iter().map(|r| r.last_price.scaled()).collect();
        let volumes: Vec<_> = rows.iter().map(|r| r.volume).collect();
        let open_interests: Vec<_> = rows.iter().map(|r| r.open_interest).collect();
        let dollar_volumes: Vec<_> = rows.iter().map(|r| r.dollar_volume).collect();
        let dollar_open_interests: Vec<_> = rows.iter().map(|r| r.dollar_open_interest).collect();
        let sids: Vec<_> = rows.iter().map(|r| r.sid as i64).collect();

        sqlx::query(
            r#"
            INSERT INTO tickers
                (exchange_ts, received_at, ticker, yes_bid, yes_ask, last_price, volume, open_interest, dollar_volume, dollar_open_interest, sid)
            SELECT * FROM UNNEST(
                $1::bigint[], $2::bigint[], $3::text[], $4::int[], $5::int[], $6::int[],
                $7::bigint[], $8::bigint[], $9::bigint[], $10::bigint[], $11::bigint[]
            )
            ON CONFLICT (exchange_ts, ticker) DO NOTHING
            "#,
        )
        .bind(exchange_ts)
        .bind(received_at)
        .bind(tickers)
        .bind(yes_bids)
        .bind(yes_asks)
        .bind(last_prices)
        .bind(volumes)
        .bind(open_interests)
        .bind(dollar_volumes)
        .bind(dollar_open_interests)
        .bind(sids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn source_label(source: SnapshotSource) -> &'static str {
    match source {
        SnapshotSource::Ws => "ws",
        SnapshotSource::Rest => "rest",
    }
}

fn levels_to_json(levels: &[(Price, i64)]) -> serde_json::Value {
    serde_json::Value::Array(
        levels
            .iter()
            .map(|(price, size)| serde_json::json!([price.scaled(), size]))
            .collect(),
    )
}
