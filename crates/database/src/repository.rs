use crate::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    ArbitrageOrder, FundingRateSample, OrderStatus, PnlRecord, SymbolEntry, TradeFill, Venue,
    VenueLeg,
};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPool;
use sqlx::FromRow;

/// The persistence capability consumed by every core component.
///
/// Orders are created/updated by id or status filter, fills and funding-rate
/// samples are append-only, P&L records are upserted, and alerts land as
/// structured log rows. All multi-statement writes commit or roll back as a
/// unit.
#[async_trait]
pub trait ArbStore: Send + Sync {
    async fn insert_order(&self, order: &ArbitrageOrder) -> Result<(), DbError>;

    /// Fetches one order by id; `NotFound` when absent.
    async fn get_order(&self, order_id: &str) -> Result<ArbitrageOrder, DbError>;

    /// All orders whose status is in `statuses`, oldest first.
    async fn orders_by_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<ArbitrageOrder>, DbError>;

    /// Persists one execution cycle's progress: both legs' filled amounts and
    /// order references, the imbalance checkpoint, and the cycle's fills, in
    /// a single transaction.
    async fn update_fill_progress(
        &self,
        order: &ArbitrageOrder,
        fills: &[TradeFill],
    ) -> Result<(), DbError>;

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<(), DbError>;

    /// Marks an order open, recording each leg's volume-weighted entry price.
    async fn mark_open(
        &self,
        order_id: &str,
        lighter_entry_price: Option<Decimal>,
        binance_entry_price: Option<Decimal>,
    ) -> Result<(), DbError>;

    /// Refreshes the persisted imbalance checkpoint from live venue data.
    async fn set_imbalance(&self, order_id: &str, imbalance: Decimal) -> Result<(), DbError>;

    async fn append_trade(&self, fill: &TradeFill) -> Result<(), DbError>;

    /// All fills for one order, oldest first.
    async fn trades_for_order(&self, order_id: &str) -> Result<Vec<TradeFill>, DbError>;

    async fn append_funding_sample(&self, sample: &FundingRateSample) -> Result<(), DbError>;

    /// Samples for one venue/symbol inside `[from_ms, to_ms]`, oldest first.
    async fn funding_samples(
        &self,
        venue: Venue,
        symbol: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<FundingRateSample>, DbError>;

    /// Inserts or replaces the P&L record for an order. Recomputation is
    /// idempotent so replacing is always safe.
    async fn upsert_pnl(&self, record: &PnlRecord) -> Result<(), DbError>;

    async fn get_pnl(&self, order_id: &str) -> Result<Option<PnlRecord>, DbError>;

    /// P&L records whose close time is at or after `since`.
    async fn pnl_since(&self, since: DateTime<Utc>) -> Result<Vec<PnlRecord>, DbError>;

    /// Most recently closed P&L records, newest first.
    async fn pnl_history(&self, limit: i64) -> Result<Vec<PnlRecord>, DbError>;

    /// Appends a structured log/alert row.
    async fn append_system_log(
        &self,
        level: &str,
        module: &str,
        message: &str,
        details: &JsonValue,
    ) -> Result<(), DbError>;

    async fn list_enabled_symbols(&self) -> Result<Vec<SymbolEntry>, DbError>;

    async fn upsert_symbol(&self, entry: &SymbolEntry) -> Result<(), DbError>;

    async fn set_symbol_enabled(&self, symbol: &str, enabled: bool) -> Result<(), DbError>;
}

/// The PostgreSQL implementation of [`ArbStore`].
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

/// A row from the `arbitrage_orders` table.
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    order_id: String,
    symbol: String,
    strategy_type: String,
    lighter_side: String,
    lighter_entry_price: Option<Decimal>,
    lighter_target_amount: Decimal,
    lighter_filled_amount: Decimal,
    lighter_leverage: i32,
    lighter_order_refs: JsonValue,
    binance_side: String,
    binance_entry_price: Option<Decimal>,
    binance_target_amount: Decimal,
    binance_filled_amount: Decimal,
    binance_leverage: i32,
    binance_order_refs: JsonValue,
    status: String,
    imbalance_amount: Decimal,
    stop_loss_price: Option<Decimal>,
    take_profit_price: Option<Decimal>,
    entry_rate_diff: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<ArbitrageOrder, DbError> {
        let corrupt = |e: core_types::CoreError| DbError::Corrupt(e.to_string());
        let refs = |value: JsonValue| -> Result<Vec<String>, DbError> {
            serde_json::from_value(value).map_err(DbError::from)
        };

        Ok(ArbitrageOrder {
            lighter: VenueLeg {
                side: self.lighter_side.parse().map_err(corrupt)?,
                entry_price: self.lighter_entry_price,
                target_amount: self.lighter_target_amount,
                filled_amount: self.lighter_filled_amount,
                leverage: self.lighter_leverage.max(0) as u32,
                order_refs: refs(self.lighter_order_refs)?,
            },
            binance: VenueLeg {
                side: self.binance_side.parse().map_err(corrupt)?,
                entry_price: self.binance_entry_price,
                target_amount: self.binance_target_amount,
                filled_amount: self.binance_filled_amount,
                leverage: self.binance_leverage.max(0) as u32,
                order_refs: refs(self.binance_order_refs)?,
            },
            order_id: self.order_id,
            symbol: self.symbol,
            strategy_type: self.strategy_type.parse().map_err(corrupt)?,
            status: self.status.parse().map_err(corrupt)?,
            imbalance_amount: self.imbalance_amount,
            stop_loss_price: self.stop_loss_price,
            take_profit_price: self.take_profit_price,
            entry_rate_diff: self.entry_rate_diff,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A row from the `trades` table.
#[derive(Debug, Clone, FromRow)]
struct TradeRow {
    order_id: String,
    venue: String,
    symbol: String,
    side: String,
    action: String,
    price: Decimal,
    amount: Decimal,
    fee: Decimal,
    venue_order_ref: Option<String>,
    executed_at: i64,
}

impl TradeRow {
    fn into_fill(self) -> Result<TradeFill, DbError> {
        let corrupt = |e: core_types::CoreError| DbError::Corrupt(e.to_string());
        Ok(TradeFill {
            order_id: self.order_id,
            venue: self.venue.parse().map_err(corrupt)?,
            symbol: self.symbol,
            side: self.side.parse().map_err(corrupt)?,
            action: self.action.parse().map_err(corrupt)?,
            price: self.price,
            amount: self.amount,
            fee: self.fee,
            venue_order_ref: self.venue_order_ref,
            timestamp: self.executed_at,
        })
    }
}

/// A row from the `funding_rates` table.
#[derive(Debug, Clone, FromRow)]
struct FundingRateRow {
    venue: String,
    symbol: String,
    rate: Decimal,
    observed_at: i64,
}

/// A row from the `pnl_records` table.
#[derive(Debug, Clone, FromRow)]
struct PnlRow {
    order_id: String,
    symbol: String,
    price_pnl: Decimal,
    lighter_funding_pnl: Decimal,
    binance_funding_pnl: Decimal,
    total_funding_pnl: Decimal,
    lighter_fees: Decimal,
    binance_fees: Decimal,
    total_fees: Decimal,
    net_pnl: Decimal,
    roi: Decimal,
    open_time: DateTime<Utc>,
    closed_at: DateTime<Utc>,
    holding_hours: Decimal,
}

impl From<PnlRow> for PnlRecord {
    fn from(row: PnlRow) -> Self {
        PnlRecord {
            order_id: row.order_id,
            symbol: row.symbol,
            price_pnl: row.price_pnl,
            lighter_funding_pnl: row.lighter_funding_pnl,
            binance_funding_pnl: row.binance_funding_pnl,
            total_funding_pnl: row.total_funding_pnl,
            lighter_fees: row.lighter_fees,
            binance_fees: row.binance_fees,
            total_fees: row.total_fees,
            net_pnl: row.net_pnl,
            roi: row.roi,
            open_time: row.open_time,
            closed_at: row.closed_at,
            holding_hours: row.holding_hours,
        }
    }
}

/// A row from the `symbols` table.
#[derive(Debug, Clone, FromRow)]
struct SymbolRow {
    symbol: String,
    lighter_symbol: Option<String>,
    binance_symbol: Option<String>,
    enabled: bool,
    max_leverage_lighter: Option<i32>,
    max_leverage_binance: Option<i32>,
    min_order_size: Option<Decimal>,
}

impl From<SymbolRow> for SymbolEntry {
    fn from(row: SymbolRow) -> Self {
        SymbolEntry {
            symbol: row.symbol,
            lighter_symbol: row.lighter_symbol,
            binance_symbol: row.binance_symbol,
            enabled: row.enabled,
            max_leverage_lighter: row.max_leverage_lighter.map(|l| l.max(0) as u32),
            max_leverage_binance: row.max_leverage_binance.map(|l| l.max(0) as u32),
            min_order_size: row.min_order_size,
        }
    }
}

const ORDER_COLUMNS: &str = "order_id, symbol, strategy_type, \
    lighter_side, lighter_entry_price, lighter_target_amount, lighter_filled_amount, \
    lighter_leverage, lighter_order_refs, \
    binance_side, binance_entry_price, binance_target_amount, binance_filled_amount, \
    binance_leverage, binance_order_refs, \
    status, imbalance_amount, stop_loss_price, take_profit_price, entry_rate_diff, \
    created_at, updated_at";

impl PgRepository {
    /// Creates a new `PgRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_trade_tx<'e, E>(executor: E, fill: &TradeFill) -> Result<(), DbError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            "INSERT INTO trades \
             (order_id, venue, symbol, side, action, price, amount, fee, venue_order_ref, executed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&fill.order_id)
        .bind(fill.venue.as_str())
        .bind(&fill.symbol)
        .bind(fill.side.as_str())
        .bind(fill.action.as_str())
        .bind(fill.price)
        .bind(fill.amount)
        .bind(fill.fee)
        .bind(&fill.venue_order_ref)
        .bind(fill.timestamp)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ArbStore for PgRepository {
    async fn insert_order(&self, order: &ArbitrageOrder) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO arbitrage_orders \
             (order_id, symbol, strategy_type, \
              lighter_side, lighter_entry_price, lighter_target_amount, lighter_filled_amount, \
              lighter_leverage, lighter_order_refs, \
              binance_side, binance_entry_price, binance_target_amount, binance_filled_amount, \
              binance_leverage, binance_order_refs, \
              status, imbalance_amount, stop_loss_price, take_profit_price, entry_rate_diff, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
                     $16, $17, $18, $19, $20, $21, $22)",
        )
        .bind(&order.order_id)
        .bind(&order.symbol)
        .bind(order.strategy_type.as_str())
        .bind(order.lighter.side.as_str())
        .bind(order.lighter.entry_price)
        .bind(order.lighter.target_amount)
        .bind(order.lighter.filled_amount)
        .bind(order.lighter.leverage as i32)
        .bind(serde_json::to_value(&order.lighter.order_refs)?)
        .bind(order.binance.side.as_str())
        .bind(order.binance.entry_price)
        .bind(order.binance.target_amount)
        .bind(order.binance.filled_amount)
        .bind(order.binance.leverage as i32)
        .bind(serde_json::to_value(&order.binance.order_refs)?)
        .bind(order.status.as_str())
        .bind(order.imbalance_amount)
        .bind(order.stop_loss_price)
        .bind(order.take_profit_price)
        .bind(order.entry_rate_diff)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<ArbitrageOrder, DbError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM arbitrage_orders WHERE order_id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)?;
        row.into_order()
    }

    async fn orders_by_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<ArbitrageOrder>, DbError> {
        let status_strings: Vec<String> =
            statuses.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM arbitrage_orders \
             WHERE status = ANY($1) ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(&status_strings)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn update_fill_progress(
        &self,
        order: &ArbitrageOrder,
        fills: &[TradeFill],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE arbitrage_orders SET \
             lighter_filled_amount = $2, lighter_order_refs = $3, \
             binance_filled_amount = $4, binance_order_refs = $5, \
             imbalance_amount = $6, updated_at = now() \
             WHERE order_id = $1",
        )
        .bind(&order.order_id)
        .bind(order.lighter.filled_amount)
        .bind(serde_json::to_value(&order.lighter.order_refs)?)
        .bind(order.binance.filled_amount)
        .bind(serde_json::to_value(&order.binance.order_refs)?)
        .bind(order.imbalance())
        .execute(&mut *tx)
        .await?;

        for fill in fills {
            Self::insert_trade_tx(&mut *tx, fill).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE arbitrage_orders SET status = $2, updated_at = now() WHERE order_id = $1",
        )
        .bind(order_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn mark_open(
        &self,
        order_id: &str,
        lighter_entry_price: Option<Decimal>,
        binance_entry_price: Option<Decimal>,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE arbitrage_orders SET \
             status = $2, lighter_entry_price = $3, binance_entry_price = $4, updated_at = now() \
             WHERE order_id = $1",
        )
        .bind(order_id)
        .bind(OrderStatus::Open.as_str())
        .bind(lighter_entry_price)
        .bind(binance_entry_price)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn set_imbalance(&self, order_id: &str, imbalance: Decimal) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE arbitrage_orders SET imbalance_amount = $2, updated_at = now() \
             WHERE order_id = $1",
        )
        .bind(order_id)
        .bind(imbalance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_trade(&self, fill: &TradeFill) -> Result<(), DbError> {
        Self::insert_trade_tx(&self.pool, fill).await
    }

    async fn trades_for_order(&self, order_id: &str) -> Result<Vec<TradeFill>, DbError> {
        let rows = sqlx::query_as::<_, TradeRow>(
            "SELECT order_id, venue, symbol, side, action, price, amount, fee, \
             venue_order_ref, executed_at \
             FROM trades WHERE order_id = $1 ORDER BY executed_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TradeRow::into_fill).collect()
    }

    async fn append_funding_sample(&self, sample: &FundingRateSample) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO funding_rates (venue, symbol, rate, observed_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(sample.venue.as_str())
        .bind(&sample.symbol)
        .bind(sample.rate)
        .bind(sample.observed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn funding_samples(
        &self,
        venue: Venue,
        symbol: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<FundingRateSample>, DbError> {
        let rows = sqlx::query_as::<_, FundingRateRow>(
            "SELECT venue, symbol, rate, observed_at FROM funding_rates \
             WHERE venue = $1 AND symbol = $2 AND observed_at BETWEEN $3 AND $4 \
             ORDER BY observed_at ASC",
        )
        .bind(venue.as_str())
        .bind(symbol)
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(FundingRateSample {
                    venue: row
                        .venue
                        .parse()
                        .map_err(|e: core_types::CoreError| DbError::Corrupt(e.to_string()))?,
                    symbol: row.symbol,
                    rate: row.rate,
                    observed_at: row.observed_at,
                })
            })
            .collect()
    }

    async fn upsert_pnl(&self, record: &PnlRecord) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO pnl_records \
             (order_id, symbol, price_pnl, lighter_funding_pnl, binance_funding_pnl, \
              total_funding_pnl, lighter_fees, binance_fees, total_fees, net_pnl, roi, \
              open_time, closed_at, holding_hours) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (order_id) DO UPDATE SET \
             price_pnl = EXCLUDED.price_pnl, \
             lighter_funding_pnl = EXCLUDED.lighter_funding_pnl, \
             binance_funding_pnl = EXCLUDED.binance_funding_pnl, \
             total_funding_pnl = EXCLUDED.total_funding_pnl, \
             lighter_fees = EXCLUDED.lighter_fees, \
             binance_fees = EXCLUDED.binance_fees, \
             total_fees = EXCLUDED.total_fees, \
             net_pnl = EXCLUDED.net_pnl, \
             roi = EXCLUDED.roi, \
             open_time = EXCLUDED.open_time, \
             closed_at = EXCLUDED.closed_at, \
             holding_hours = EXCLUDED.holding_hours",
        )
        .bind(&record.order_id)
        .bind(&record.symbol)
        .bind(record.price_pnl)
        .bind(record.lighter_funding_pnl)
        .bind(record.binance_funding_pnl)
        .bind(record.total_funding_pnl)
        .bind(record.lighter_fees)
        .bind(record.binance_fees)
        .bind(record.total_fees)
        .bind(record.net_pnl)
        .bind(record.roi)
        .bind(record.open_time)
        .bind(record.closed_at)
        .bind(record.holding_hours)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_pnl(&self, order_id: &str) -> Result<Option<PnlRecord>, DbError> {
        let row = sqlx::query_as::<_, PnlRow>(
            "SELECT order_id, symbol, price_pnl, lighter_funding_pnl, binance_funding_pnl, \
             total_funding_pnl, lighter_fees, binance_fees, total_fees, net_pnl, roi, \
             open_time, closed_at, holding_hours \
             FROM pnl_records WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PnlRecord::from))
    }

    async fn pnl_since(&self, since: DateTime<Utc>) -> Result<Vec<PnlRecord>, DbError> {
        let rows = sqlx::query_as::<_, PnlRow>(
            "SELECT order_id, symbol, price_pnl, lighter_funding_pnl, binance_funding_pnl, \
             total_funding_pnl, lighter_fees, binance_fees, total_fees, net_pnl, roi, \
             open_time, closed_at, holding_hours \
             FROM pnl_records WHERE closed_at >= $1 ORDER BY closed_at ASC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PnlRecord::from).collect())
    }

    async fn pnl_history(&self, limit: i64) -> Result<Vec<PnlRecord>, DbError> {
        let rows = sqlx::query_as::<_, PnlRow>(
            "SELECT order_id, symbol, price_pnl, lighter_funding_pnl, binance_funding_pnl, \
             total_funding_pnl, lighter_fees, binance_fees, total_fees, net_pnl, roi, \
             open_time, closed_at, holding_hours \
             FROM pnl_records ORDER BY closed_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PnlRecord::from).collect())
    }

    async fn append_system_log(
        &self,
        level: &str,
        module: &str,
        message: &str,
        details: &JsonValue,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO system_logs (level, module, message, details) VALUES ($1, $2, $3, $4)",
        )
        .bind(level)
        .bind(module)
        .bind(message)
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_enabled_symbols(&self) -> Result<Vec<SymbolEntry>, DbError> {
        let rows = sqlx::query_as::<_, SymbolRow>(
            "SELECT symbol, lighter_symbol, binance_symbol, enabled, \
             max_leverage_lighter, max_leverage_binance, min_order_size \
             FROM symbols WHERE enabled = TRUE ORDER BY symbol ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SymbolEntry::from).collect())
    }

    async fn upsert_symbol(&self, entry: &SymbolEntry) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO symbols \
             (symbol, lighter_symbol, binance_symbol, enabled, \
              max_leverage_lighter, max_leverage_binance, min_order_size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (symbol) DO UPDATE SET \
             lighter_symbol = EXCLUDED.lighter_symbol, \
             binance_symbol = EXCLUDED.binance_symbol, \
             enabled = EXCLUDED.enabled, \
             max_leverage_lighter = EXCLUDED.max_leverage_lighter, \
             max_leverage_binance = EXCLUDED.max_leverage_binance, \
             min_order_size = EXCLUDED.min_order_size",
        )
        .bind(&entry.symbol)
        .bind(&entry.lighter_symbol)
        .bind(&entry.binance_symbol)
        .bind(entry.enabled)
        .bind(entry.max_leverage_lighter.map(|l| l as i32))
        .bind(entry.max_leverage_binance.map(|l| l as i32))
        .bind(entry.min_order_size)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_symbol_enabled(&self, symbol: &str, enabled: bool) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE symbols SET enabled = $2 WHERE symbol = $1")
            .bind(symbol)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
