//! An in-process [`ArbStore`] used by tests and dry runs. Mirrors the
//! PostgreSQL implementation's observable behavior, including `updated_at`
//! bumps and `NotFound` on missing ids.

use crate::error::DbError;
use crate::repository::ArbStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    ArbitrageOrder, FundingRateSample, OrderStatus, PnlRecord, SymbolEntry, TradeFill, Venue,
};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    orders: HashMap<String, ArbitrageOrder>,
    trades: Vec<TradeFill>,
    samples: Vec<FundingRateSample>,
    pnl: HashMap<String, PnlRecord>,
    logs: Vec<LogRow>,
    symbols: HashMap<String, SymbolEntry>,
}

#[derive(Debug, Clone)]
pub struct LogRow {
    pub logged_at: DateTime<Utc>,
    pub level: String,
    pub module: String,
    pub message: String,
    pub details: JsonValue,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded log/alert rows, oldest first. Test observability hook.
    pub async fn logs(&self) -> Vec<LogRow> {
        self.state.read().await.logs.clone()
    }

    /// All recorded fills, oldest first. Test observability hook.
    pub async fn all_trades(&self) -> Vec<TradeFill> {
        self.state.read().await.trades.clone()
    }
}

#[async_trait]
impl ArbStore for MemoryRepository {
    async fn insert_order(&self, order: &ArbitrageOrder) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        state.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<ArbitrageOrder, DbError> {
        self.state
            .read()
            .await
            .orders
            .get(order_id)
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn orders_by_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<ArbitrageOrder>, DbError> {
        let state = self.state.read().await;
        let mut orders: Vec<ArbitrageOrder> = state
            .orders
            .values()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn update_fill_progress(
        &self,
        order: &ArbitrageOrder,
        fills: &[TradeFill],
    ) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(&order.order_id)
            .ok_or(DbError::NotFound)?;
        stored.lighter.filled_amount = order.lighter.filled_amount;
        stored.lighter.order_refs = order.lighter.order_refs.clone();
        stored.binance.filled_amount = order.binance.filled_amount;
        stored.binance.order_refs = order.binance.order_refs.clone();
        stored.imbalance_amount = order.imbalance();
        stored.updated_at = Utc::now();
        state.trades.extend_from_slice(fills);
        Ok(())
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        let order = state.orders.get_mut(order_id).ok_or(DbError::NotFound)?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_open(
        &self,
        order_id: &str,
        lighter_entry_price: Option<Decimal>,
        binance_entry_price: Option<Decimal>,
    ) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        let order = state.orders.get_mut(order_id).ok_or(DbError::NotFound)?;
        order.status = OrderStatus::Open;
        order.lighter.entry_price = lighter_entry_price;
        order.binance.entry_price = binance_entry_price;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn set_imbalance(&self, order_id: &str, imbalance: Decimal) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        let order = state.orders.get_mut(order_id).ok_or(DbError::NotFound)?;
        order.imbalance_amount = imbalance;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn append_trade(&self, fill: &TradeFill) -> Result<(), DbError> {
        self.state.write().await.trades.push(fill.clone());
        Ok(())
    }

    async fn trades_for_order(&self, order_id: &str) -> Result<Vec<TradeFill>, DbError> {
        let state = self.state.read().await;
        let mut fills: Vec<TradeFill> = state
            .trades
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        fills.sort_by_key(|t| t.timestamp);
        Ok(fills)
    }

    async fn append_funding_sample(&self, sample: &FundingRateSample) -> Result<(), DbError> {
        self.state.write().await.samples.push(sample.clone());
        Ok(())
    }

    async fn funding_samples(
        &self,
        venue: Venue,
        symbol: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<FundingRateSample>, DbError> {
        let state = self.state.read().await;
        let mut samples: Vec<FundingRateSample> = state
            .samples
            .iter()
            .filter(|s| {
                s.venue == venue
                    && s.symbol == symbol
                    && s.observed_at >= from_ms
                    && s.observed_at <= to_ms
            })
            .cloned()
            .collect();
        samples.sort_by_key(|s| s.observed_at);
        Ok(samples)
    }

    async fn upsert_pnl(&self, record: &PnlRecord) -> Result<(), DbError> {
        self.state
            .write()
            .await
            .pnl
            .insert(record.order_id.clone(), record.clone());
        Ok(())
    }

    async fn get_pnl(&self, order_id: &str) -> Result<Option<PnlRecord>, DbError> {
        Ok(self.state.read().await.pnl.get(order_id).cloned())
    }

    async fn pnl_since(&self, since: DateTime<Utc>) -> Result<Vec<PnlRecord>, DbError> {
        let state = self.state.read().await;
        let mut records: Vec<PnlRecord> = state
            .pnl
            .values()
            .filter(|r| r.closed_at >= since)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.closed_at);
        Ok(records)
    }

    async fn pnl_history(&self, limit: i64) -> Result<Vec<PnlRecord>, DbError> {
        let state = self.state.read().await;
        let mut records: Vec<PnlRecord> = state.pnl.values().cloned().collect();
        records.sort_by(|a, b| b.closed_at.cmp(&a.closed_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn append_system_log(
        &self,
        level: &str,
        module: &str,
        message: &str,
        details: &JsonValue,
    ) -> Result<(), DbError> {
        self.state.write().await.logs.push(LogRow {
            logged_at: Utc::now(),
            level: level.to_string(),
            module: module.to_string(),
            message: message.to_string(),
            details: details.clone(),
        });
        Ok(())
    }

    async fn list_enabled_symbols(&self) -> Result<Vec<SymbolEntry>, DbError> {
        let state = self.state.read().await;
        let mut symbols: Vec<SymbolEntry> = state
            .symbols
            .values()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(symbols)
    }

    async fn upsert_symbol(&self, entry: &SymbolEntry) -> Result<(), DbError> {
        self.state
            .write()
            .await
            .symbols
            .insert(entry.symbol.clone(), entry.clone());
        Ok(())
    }

    async fn set_symbol_enabled(&self, symbol: &str, enabled: bool) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        let entry = state.symbols.get_mut(symbol).ok_or(DbError::NotFound)?;
        entry.enabled = enabled;
        Ok(())
    }
}
