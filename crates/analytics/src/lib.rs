//! Realized P&L reconciliation for closed orders.
//!
//! The reconciler replays an order's recorded fills and the funding-rate
//! samples observed over its holding window, decomposing the result into
//! price P&L, per-venue funding P&L and fees. The derived [`PnlRecord`] is
//! cached in the store but is always recomputable from the raw history, so
//! reconciling twice is harmless.

use std::sync::Arc;

use chrono::{Duration, Utc};
use core_types::{
    ArbitrageOrder, FundingRateSample, OrderStatus, PnlRecord, PositionSide, TradeAction,
    TradeFill, Venue,
};
use database::{ArbStore, DbError};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Store error: {0}")]
    Store(#[from] DbError),
    #[error("Order {order_id} is {status}, only closed orders can be reconciled")]
    NotClosed {
        order_id: String,
        status: OrderStatus,
    },
}

/// Net cash flow across a set of fills. Opens spend on longs and collect on
/// shorts; closes invert. A round trip at a better exit price nets positive.
pub fn price_pnl(trades: &[TradeFill]) -> Decimal {
    let mut pnl = Decimal::ZERO;
    for trade in trades {
        let value = trade.price * trade.amount;
        let signed = match (trade.action, trade.side) {
            (TradeAction::Open, PositionSide::Long) => -value,
            (TradeAction::Open, PositionSide::Short) => value,
            (TradeAction::Close, PositionSide::Long) => value,
            (TradeAction::Close, PositionSide::Short) => -value,
        };
        pnl += signed;
    }
    pnl
}

/// Funding accrued by one leg over a series of observed rates. Longs pay a
/// positive rate, shorts receive it; position value is the leveraged entry.
pub fn funding_pnl(
    entry_amount: Decimal,
    leverage: u32,
    side: PositionSide,
    rates: &[FundingRateSample],
) -> Decimal {
    let position_value = entry_amount * Decimal::from(leverage);
    let mut pnl = Decimal::ZERO;
    for sample in rates {
        let payment = position_value * sample.rate;
        pnl += match side {
            PositionSide::Long => -payment,
            PositionSide::Short => payment,
        };
    }
    pnl
}

fn fees_for(trades: &[TradeFill], venue: Venue) -> Decimal {
    trades
        .iter()
        .filter(|t| t.venue == venue)
        .map(|t| t.fee)
        .sum()
}

/// Aggregate statistics over a trailing window of reconciled orders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PnlSummary {
    pub days: i64,
    pub total_pnl: Decimal,
    pub total_orders: usize,
    pub win_orders: usize,
    pub loss_orders: usize,
    /// Fraction of winning orders, in percent.
    pub win_rate: Decimal,
    pub avg_pnl: Decimal,
    pub avg_roi: Decimal,
}

impl PnlSummary {
    fn empty(days: i64) -> Self {
        Self {
            days,
            total_pnl: Decimal::ZERO,
            total_orders: 0,
            win_orders: 0,
            loss_orders: 0,
            win_rate: Decimal::ZERO,
            avg_pnl: Decimal::ZERO,
            avg_roi: Decimal::ZERO,
        }
    }
}

/// Computes and caches realized P&L for closed orders.
pub struct PnlReconciler {
    store: Arc<dyn ArbStore>,
}

impl PnlReconciler {
    pub fn new(store: Arc<dyn ArbStore>) -> Self {
        Self { store }
    }

    /// Recomputes the full P&L decomposition of one closed order and upserts
    /// the resulting record.
    pub async fn reconcile(&self, order_id: &str) -> Result<PnlRecord, AnalyticsError> {
        let order = self.store.get_order(order_id).await?;
        if order.status != OrderStatus::Closed {
            return Err(AnalyticsError::NotClosed {
                order_id: order_id.to_string(),
                status: order.status,
            });
        }

        let trades = self.store.trades_for_order(order_id).await?;
        let record = self.build_record(&order, &trades).await?;
        self.store.upsert_pnl(&record).await?;
        info!(
            order_id,
            net_pnl = %record.net_pnl,
            roi = %record.roi,
            "order reconciled"
        );
        Ok(record)
    }

    async fn build_record(
        &self,
        order: &ArbitrageOrder,
        trades: &[TradeFill],
    ) -> Result<PnlRecord, AnalyticsError> {
        let from_ms = order.created_at.timestamp_millis();
        let to_ms = order.updated_at.timestamp_millis();

        let lighter_rates = self
            .store
            .funding_samples(Venue::Lighter, &order.symbol, from_ms, to_ms)
            .await?;
        let binance_rates = self
            .store
            .funding_samples(Venue::Binance, &order.symbol, from_ms, to_ms)
            .await?;

        let price_pnl = price_pnl(trades);
        let lighter_funding = funding_pnl(
            order.lighter.target_amount,
            order.lighter.leverage,
            order.lighter.side,
            &lighter_rates,
        );
        let binance_funding = funding_pnl(
            order.binance.target_amount,
            order.binance.leverage,
            order.binance.side,
            &binance_rates,
        );
        let total_funding = lighter_funding + binance_funding;

        let lighter_fees = fees_for(trades, Venue::Lighter);
        let binance_fees = fees_for(trades, Venue::Binance);
        let total_fees = lighter_fees + binance_fees;

        let net_pnl = price_pnl + total_funding - total_fees;
        let total_entry = order.total_entry_amount();
        let roi = if total_entry > Decimal::ZERO {
            net_pnl / total_entry * Decimal::from(100)
        } else {
            Decimal::ZERO
        };

        let holding_ms = (order.updated_at - order.created_at).num_milliseconds();
        let holding_hours = Decimal::from(holding_ms) / Decimal::from(3_600_000);

        Ok(PnlRecord {
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            price_pnl,
            lighter_funding_pnl: lighter_funding,
            binance_funding_pnl: binance_funding,
            total_funding_pnl: total_funding,
            lighter_fees,
            binance_fees,
            total_fees,
            net_pnl,
            roi,
            open_time: order.created_at,
            closed_at: order.updated_at,
            holding_hours,
        })
    }

    /// Statistics over orders closed within the trailing `days` window.
    pub async fn total_pnl(&self, days: i64) -> Result<PnlSummary, AnalyticsError> {
        let since = Utc::now() - Duration::days(days);
        let records = self.store.pnl_since(since).await?;
        if records.is_empty() {
            return Ok(PnlSummary::empty(days));
        }

        let total_orders = records.len();
        let total_pnl: Decimal = records.iter().map(|r| r.net_pnl).sum();
        let win_orders = records
            .iter()
            .filter(|r| r.net_pnl > Decimal::ZERO)
            .count();
        let count = Decimal::from(total_orders as i64);
        let win_rate = Decimal::from(win_orders as i64) / count * Decimal::from(100);
        let avg_pnl = total_pnl / count;
        let avg_roi = records.iter().map(|r| r.roi).sum::<Decimal>() / count;

        Ok(PnlSummary {
            days,
            total_pnl,
            total_orders,
            win_orders,
            loss_orders: total_orders - win_orders,
            win_rate,
            avg_pnl,
            avg_roi,
        })
    }

    /// The most recently closed reconciled orders, newest first.
    pub async fn history(&self, limit: i64) -> Result<Vec<PnlRecord>, AnalyticsError> {
        Ok(self.store.pnl_history(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{generate_order_id, StrategyType, VenueLeg};
    use database::MemoryRepository;
    use rust_decimal_macros::dec;

    fn fill(
        order_id: &str,
        venue: Venue,
        side: PositionSide,
        action: TradeAction,
        price: Decimal,
        amount: Decimal,
    ) -> TradeFill {
        TradeFill {
            order_id: order_id.to_string(),
            venue,
            symbol: "BTCUSDT".to_string(),
            side,
            action,
            price,
            amount,
            fee: Decimal::ZERO,
            venue_order_ref: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    fn closed_order() -> ArbitrageOrder {
        let now = Utc::now();
        ArbitrageOrder {
            order_id: generate_order_id("BTCUSDT"),
            symbol: "BTCUSDT".to_string(),
            strategy_type: StrategyType::LighterShortBinanceLong,
            lighter: VenueLeg::new(PositionSide::Short, dec!(100), 3),
            binance: VenueLeg::new(PositionSide::Long, dec!(100), 3),
            status: OrderStatus::Closed,
            imbalance_amount: Decimal::ZERO,
            stop_loss_price: None,
            take_profit_price: None,
            entry_rate_diff: Some(dec!(0.0003)),
            created_at: now - Duration::hours(2),
            updated_at: now,
        }
    }

    #[test]
    fn long_round_trip_nets_the_price_move() {
        let fills = vec![
            fill("o", Venue::Binance, PositionSide::Long, TradeAction::Open, dec!(100), dec!(2)),
            fill("o", Venue::Binance, PositionSide::Long, TradeAction::Close, dec!(110), dec!(2)),
        ];
        assert_eq!(price_pnl(&fills), dec!(20));
    }

    #[test]
    fn short_round_trip_profits_from_a_drop() {
        let fills = vec![
            fill("o", Venue::Lighter, PositionSide::Short, TradeAction::Open, dec!(100), dec!(2)),
            fill("o", Venue::Lighter, PositionSide::Short, TradeAction::Close, dec!(90), dec!(2)),
        ];
        assert_eq!(price_pnl(&fills), dec!(20));
    }

    #[test]
    fn open_legs_alone_net_the_entry_spread() {
        // Short 100 @ 10 collects 1000, long 100 @ 9.5 spends 950.
        let fills = vec![
            fill("o", Venue::Lighter, PositionSide::Short, TradeAction::Open, dec!(10), dec!(100)),
            fill("o", Venue::Binance, PositionSide::Long, TradeAction::Open, dec!(9.5), dec!(100)),
        ];
        assert_eq!(price_pnl(&fills), dec!(50));
    }

    #[test]
    fn funding_signs_follow_the_side() {
        let rates = vec![
            FundingRateSample {
                venue: Venue::Lighter,
                symbol: "BTCUSDT".to_string(),
                rate: dec!(0.0001),
                observed_at: 1,
            },
            FundingRateSample {
                venue: Venue::Lighter,
                symbol: "BTCUSDT".to_string(),
                rate: dec!(0.0002),
                observed_at: 2,
            },
        ];
        // 100 entry at 3x over a summed 0.0003 rate moves 0.09.
        assert_eq!(
            funding_pnl(dec!(100), 3, PositionSide::Short, &rates),
            dec!(0.09)
        );
        assert_eq!(
            funding_pnl(dec!(100), 3, PositionSide::Long, &rates),
            dec!(-0.09)
        );
    }

    #[tokio::test]
    async fn reconcile_decomposes_and_caches() {
        let store = Arc::new(MemoryRepository::new());
        let order = closed_order();
        store.insert_order(&order).await.unwrap();

        for trade in [
            fill(&order.order_id, Venue::Lighter, PositionSide::Short, TradeAction::Open, dec!(100), dec!(1)),
            fill(&order.order_id, Venue::Lighter, PositionSide::Short, TradeAction::Close, dec!(95), dec!(1)),
            fill(&order.order_id, Venue::Binance, PositionSide::Long, TradeAction::Open, dec!(100), dec!(1)),
            fill(&order.order_id, Venue::Binance, PositionSide::Long, TradeAction::Close, dec!(95), dec!(1)),
        ] {
            store.append_trade(&trade).await.unwrap();
        }
        store
            .append_funding_sample(&FundingRateSample {
                venue: Venue::Lighter,
                symbol: "BTCUSDT".to_string(),
                rate: dec!(0.0001),
                observed_at: order.created_at.timestamp_millis() + 1,
            })
            .await
            .unwrap();

        let reconciler = PnlReconciler::new(store.clone());
        let record = reconciler.reconcile(&order.order_id).await.unwrap();

        // Short gains 5, long loses 5; the short leg collects 0.03 funding.
        assert_eq!(record.price_pnl, Decimal::ZERO);
        assert_eq!(record.lighter_funding_pnl, dec!(0.03));
        assert_eq!(record.binance_funding_pnl, Decimal::ZERO);
        assert_eq!(record.net_pnl, dec!(0.03));
        assert_eq!(record.holding_hours, dec!(2));
        assert_eq!(record.roi, dec!(0.015));

        // Reconciling again overwrites the same cache row.
        let again = reconciler.reconcile(&order.order_id).await.unwrap();
        assert_eq!(again.net_pnl, record.net_pnl);
        let cached = store.get_pnl(&order.order_id).await.unwrap().unwrap();
        assert_eq!(cached.net_pnl, record.net_pnl);
    }

    #[tokio::test]
    async fn zero_entry_reports_zero_roi() {
        let store = Arc::new(MemoryRepository::new());
        let mut order = closed_order();
        order.lighter.target_amount = Decimal::ZERO;
        order.binance.target_amount = Decimal::ZERO;
        store.insert_order(&order).await.unwrap();

        let reconciler = PnlReconciler::new(store);
        let record = reconciler.reconcile(&order.order_id).await.unwrap();
        assert_eq!(record.roi, Decimal::ZERO);
    }

    #[tokio::test]
    async fn only_closed_orders_reconcile() {
        let store = Arc::new(MemoryRepository::new());
        let mut order = closed_order();
        order.status = OrderStatus::Open;
        store.insert_order(&order).await.unwrap();

        let reconciler = PnlReconciler::new(store);
        let err = reconciler.reconcile(&order.order_id).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::NotClosed { .. }));
    }

    #[tokio::test]
    async fn summary_counts_wins_and_losses() {
        let store = Arc::new(MemoryRepository::new());
        let reconciler = PnlReconciler::new(store.clone());

        for (net, roi) in [(dec!(10), dec!(5)), (dec!(-5), dec!(-2.5))] {
            let order = closed_order();
            let record = PnlRecord {
                order_id: order.order_id.clone(),
                symbol: order.symbol.clone(),
                price_pnl: net,
                lighter_funding_pnl: Decimal::ZERO,
                binance_funding_pnl: Decimal::ZERO,
                total_funding_pnl: Decimal::ZERO,
                lighter_fees: Decimal::ZERO,
                binance_fees: Decimal::ZERO,
                total_fees: Decimal::ZERO,
                net_pnl: net,
                roi,
                open_time: order.created_at,
                closed_at: order.updated_at,
                holding_hours: dec!(2),
            };
            store.upsert_pnl(&record).await.unwrap();
        }

        let summary = reconciler.total_pnl(30).await.unwrap();
        assert_eq!(summary.total_orders, 2);
        assert_eq!(summary.win_orders, 1);
        assert_eq!(summary.loss_orders, 1);
        assert_eq!(summary.total_pnl, dec!(5));
        assert_eq!(summary.win_rate, dec!(50));
        assert_eq!(summary.avg_pnl, dec!(2.5));
        assert_eq!(summary.avg_roi, dec!(1.25));
    }
}
