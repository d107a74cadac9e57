//! The position ledger: read-side views that join persisted orders with
//! live venue data, plus the periodic imbalance sync that refreshes each
//! order's skew checkpoint from the venues.
//!
//! Live venue reads degrade gracefully: an unknown position or price shows
//! as zero/absent in a view, never as a failed request.

use chrono::{DateTime, Utc};
use core_types::{ArbitrageOrder, OrderStatus, PositionSide, StrategyType, TradeFill, Venue};
use database::{ArbStore, DbError};
use events::PositionSnapshot;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use venues::{ExchangeAdapter, Retry, VenuePosition};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("persistence failure: {0}")]
    Store(#[from] DbError),
}

/// One venue's half of a position view: persisted leg state joined with the
/// venue's live amount and unrealized P&L.
#[derive(Debug, Clone, Serialize)]
pub struct LegView {
    pub side: PositionSide,
    pub entry_price: Option<Decimal>,
    pub target_amount: Decimal,
    pub filled_amount: Decimal,
    pub leverage: u32,
    pub current_amount: Decimal,
    pub unrealized_pnl: Decimal,
}

/// The full detail view of one paired position.
#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    pub order_id: String,
    pub symbol: String,
    pub strategy_type: StrategyType,
    pub status: OrderStatus,
    pub lighter: LegView,
    pub binance: LegView,
    pub current_price: Option<Decimal>,
    pub imbalance_amount: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub entry_rate_diff: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub holding_hours: f64,
}

/// Aggregate counts and committed exposure across all orders.
#[derive(Debug, Clone, Serialize)]
pub struct PositionSummary {
    pub status_counts: HashMap<OrderStatus, usize>,
    pub open_positions: usize,
    pub total_lighter_amount: Decimal,
    pub total_binance_amount: Decimal,
    pub total_amount: Decimal,
}

pub struct PositionLedger {
    lighter: Arc<dyn ExchangeAdapter>,
    binance: Arc<dyn ExchangeAdapter>,
    store: Arc<dyn ArbStore>,
    retry: Retry,
}

impl PositionLedger {
    pub fn new(
        lighter: Arc<dyn ExchangeAdapter>,
        binance: Arc<dyn ExchangeAdapter>,
        store: Arc<dyn ArbStore>,
        retry: Retry,
    ) -> Self {
        Self {
            lighter,
            binance,
            store,
            retry,
        }
    }

    async fn live_position(&self, venue: Venue, symbol: &str) -> Option<VenuePosition> {
        let adapter = match venue {
            Venue::Lighter => &self.lighter,
            Venue::Binance => &self.binance,
        };
        self.retry
            .call_or("position", None, || adapter.position(symbol))
            .await
    }

    fn leg_view(order: &ArbitrageOrder, venue: Venue, live: Option<VenuePosition>) -> LegView {
        let leg = order.leg(venue);
        LegView {
            side: leg.side,
            entry_price: leg.entry_price,
            target_amount: leg.target_amount,
            filled_amount: leg.filled_amount,
            leverage: leg.leverage,
            current_amount: live.map(|p| p.amount).unwrap_or_default(),
            unrealized_pnl: live.map(|p| p.unrealized_pnl).unwrap_or_default(),
        }
    }

    async fn view_for(&self, order: ArbitrageOrder) -> PositionView {
        let (lighter_live, binance_live) = tokio::join!(
            self.live_position(Venue::Lighter, &order.symbol),
            self.live_position(Venue::Binance, &order.symbol),
        );
        let current_price = self
            .retry
            .call_or("price", None, || self.lighter.price(&order.symbol))
            .await;

        let lighter = Self::leg_view(&order, Venue::Lighter, lighter_live);
        let binance = Self::leg_view(&order, Venue::Binance, binance_live);
        let total_unrealized_pnl = lighter.unrealized_pnl + binance.unrealized_pnl;
        let holding_hours = order.holding_hours(Utc::now());

        PositionView {
            order_id: order.order_id,
            symbol: order.symbol,
            strategy_type: order.strategy_type,
            status: order.status,
            lighter,
            binance,
            current_price,
            imbalance_amount: order.imbalance_amount,
            total_unrealized_pnl,
            stop_loss_price: order.stop_loss_price,
            take_profit_price: order.take_profit_price,
            entry_rate_diff: order.entry_rate_diff,
            created_at: order.created_at,
            holding_hours,
        }
    }

    /// Detail view for one order; `NotFound` surfaces from the store.
    pub async fn position_view(&self, order_id: &str) -> Result<PositionView, LedgerError> {
        let order = self.store.get_order(order_id).await?;
        Ok(self.view_for(order).await)
    }

    /// Detail views for every live (open or opening) position.
    pub async fn all_positions(&self) -> Result<Vec<PositionView>, LedgerError> {
        let orders = self
            .store
            .orders_by_status(&[OrderStatus::Open, OrderStatus::Opening])
            .await?;
        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            views.push(self.view_for(order).await);
        }
        Ok(views)
    }

    /// Compact snapshots for the presentation boundary.
    pub async fn snapshots(&self) -> Result<Vec<PositionSnapshot>, LedgerError> {
        Ok(self
            .all_positions()
            .await?
            .into_iter()
            .map(|view| PositionSnapshot {
                order_id: view.order_id,
                symbol: view.symbol,
                status: view.status,
                imbalance_amount: view.imbalance_amount,
                total_unrealized_pnl: view.total_unrealized_pnl,
            })
            .collect())
    }

    /// Status counts plus committed exposure of open orders.
    pub async fn summary(&self) -> Result<PositionSummary, LedgerError> {
        let orders = self
            .store
            .orders_by_status(&[
                OrderStatus::Opening,
                OrderStatus::Open,
                OrderStatus::Closing,
                OrderStatus::Closed,
                OrderStatus::Failed,
            ])
            .await?;

        let mut status_counts: HashMap<OrderStatus, usize> = HashMap::new();
        let mut total_lighter_amount = Decimal::ZERO;
        let mut total_binance_amount = Decimal::ZERO;
        let mut open_positions = 0usize;
        for order in &orders {
            *status_counts.entry(order.status).or_default() += 1;
            if order.status == OrderStatus::Open {
                open_positions += 1;
                total_lighter_amount += order.lighter.target_amount;
                total_binance_amount += order.binance.target_amount;
            }
        }

        Ok(PositionSummary {
            status_counts,
            open_positions,
            total_lighter_amount,
            total_binance_amount,
            total_amount: total_lighter_amount + total_binance_amount,
        })
    }

    /// Closed positions, most recently updated first.
    pub async fn history(&self, limit: usize) -> Result<Vec<ArbitrageOrder>, LedgerError> {
        let mut orders = self.store.orders_by_status(&[OrderStatus::Closed]).await?;
        orders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        orders.truncate(limit);
        Ok(orders)
    }

    /// All fills for one order, oldest first.
    pub async fn trades(&self, order_id: &str) -> Result<Vec<TradeFill>, LedgerError> {
        Ok(self.store.trades_for_order(order_id).await?)
    }

    /// Refreshes every live order's imbalance checkpoint from the venues.
    /// Per-order failures are logged and skipped.
    pub async fn sync_imbalance(&self) -> Result<usize, LedgerError> {
        let orders = self
            .store
            .orders_by_status(&[OrderStatus::Opening, OrderStatus::Open, OrderStatus::Closing])
            .await?;

        let mut synced = 0usize;
        for order in orders {
            let (lighter_live, binance_live) = tokio::join!(
                self.live_position(Venue::Lighter, &order.symbol),
                self.live_position(Venue::Binance, &order.symbol),
            );
            let lighter_amount = lighter_live.map(|p| p.amount).unwrap_or_default();
            let binance_amount = binance_live.map(|p| p.amount).unwrap_or_default();
            let imbalance = (lighter_amount - binance_amount).abs();

            if let Err(e) = self.store.set_imbalance(&order.order_id, imbalance).await {
                warn!(order_id = %order.order_id, error = %e, "imbalance sync failed");
                continue;
            }
            synced += 1;
        }
        Ok(synced)
    }

    /// The periodic sync loop.
    pub async fn run_sync(&self, interval: Duration, token: CancellationToken) {
        info!(interval = ?interval, "imbalance sync started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("imbalance sync stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_imbalance().await {
                        warn!(error = %e, "imbalance sync pass failed");
                    }
                }
            }
        }
    }
}
