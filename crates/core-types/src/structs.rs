use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{OrderStatus, PositionSide, StrategyType, TradeAction, Venue};

/// One observation of a venue's funding rate. Immutable once recorded;
/// the P&L engine integrates over the samples inside a holding window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRateSample {
    pub venue: Venue,
    pub symbol: String,
    /// Signed fractional rate (0.0001 = 0.01%).
    pub rate: Decimal,
    /// Millisecond epoch at which the rate was observed.
    pub observed_at: i64,
}

/// One venue's half of an arbitrage order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueLeg {
    pub side: PositionSide,
    /// Volume-weighted average entry price, set once the order is fully open.
    pub entry_price: Option<Decimal>,
    /// The amount this leg is meant to reach.
    pub target_amount: Decimal,
    /// Monotonically non-decreasing while the order is `opening`.
    pub filled_amount: Decimal,
    pub leverage: u32,
    /// Venue order references accumulated across execution cycles.
    pub order_refs: Vec<String>,
}

impl VenueLeg {
    pub fn new(side: PositionSide, target_amount: Decimal, leverage: u32) -> Self {
        Self {
            side,
            entry_price: None,
            target_amount,
            filled_amount: Decimal::ZERO,
            leverage,
            order_refs: Vec::new(),
        }
    }

    pub fn remaining(&self) -> Decimal {
        (self.target_amount - self.filled_amount).max(Decimal::ZERO)
    }
}

/// The unit of a matched dual-venue position. Never deleted; retained in
/// terminal states for P&L and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOrder {
    pub order_id: String,
    pub symbol: String,
    pub strategy_type: StrategyType,
    pub lighter: VenueLeg,
    pub binance: VenueLeg,
    pub status: OrderStatus,
    /// `|lighter.filled_amount - binance.filled_amount|` at the last persisted checkpoint.
    pub imbalance_amount: Decimal,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    /// The funding-rate differential observed when the position was opened.
    pub entry_rate_diff: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArbitrageOrder {
    pub fn leg(&self, venue: Venue) -> &VenueLeg {
        match venue {
            Venue::Lighter => &self.lighter,
            Venue::Binance => &self.binance,
        }
    }

    pub fn leg_mut(&mut self, venue: Venue) -> &mut VenueLeg {
        match venue {
            Venue::Lighter => &mut self.lighter,
            Venue::Binance => &mut self.binance,
        }
    }

    /// Absolute fill skew between the two venues.
    pub fn imbalance(&self) -> Decimal {
        (self.lighter.filled_amount - self.binance.filled_amount).abs()
    }

    /// Combined committed capital across both legs.
    pub fn total_entry_amount(&self) -> Decimal {
        self.lighter.target_amount + self.binance.target_amount
    }

    pub fn holding_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 3_600_000.0
    }
}

/// A single fill on one venue. Append-only; the reconciler replays these
/// to derive price P&L and fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub order_id: String,
    pub venue: Venue,
    pub symbol: String,
    pub side: PositionSide,
    pub action: TradeAction,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Decimal,
    pub venue_order_ref: Option<String>,
    /// Millisecond epoch of the fill.
    pub timestamp: i64,
}

/// The decomposed realized P&L of one closed order. A derived cache,
/// recomputable at any time from the trade and funding-rate history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlRecord {
    pub order_id: String,
    pub symbol: String,
    pub price_pnl: Decimal,
    pub lighter_funding_pnl: Decimal,
    pub binance_funding_pnl: Decimal,
    pub total_funding_pnl: Decimal,
    pub lighter_fees: Decimal,
    pub binance_fees: Decimal,
    pub total_fees: Decimal,
    pub net_pnl: Decimal,
    /// Net P&L over combined entry amounts, in percent.
    pub roi: Decimal,
    pub open_time: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub holding_hours: Decimal,
}

/// A tradable symbol and its per-venue naming/limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub symbol: String,
    pub lighter_symbol: Option<String>,
    pub binance_symbol: Option<String>,
    pub enabled: bool,
    pub max_leverage_lighter: Option<u32>,
    pub max_leverage_binance: Option<u32>,
    pub min_order_size: Option<Decimal>,
}

/// Generates a globally unique order id, e.g. `ARB_BTCUSDT_1717000000_1a2b3c4d`.
pub fn generate_order_id(symbol: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "ARB_{}_{}_{}",
        symbol,
        Utc::now().timestamp(),
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> ArbitrageOrder {
        ArbitrageOrder {
            order_id: generate_order_id("BTCUSDT"),
            symbol: "BTCUSDT".to_string(),
            strategy_type: StrategyType::LighterShortBinanceLong,
            lighter: VenueLeg::new(PositionSide::Short, dec!(300), 3),
            binance: VenueLeg::new(PositionSide::Long, dec!(300), 3),
            status: OrderStatus::Opening,
            imbalance_amount: Decimal::ZERO,
            stop_loss_price: None,
            take_profit_price: None,
            entry_rate_diff: Some(dec!(0.0003)),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn imbalance_is_absolute_skew() {
        let mut o = order();
        o.lighter.filled_amount = dec!(100);
        o.binance.filled_amount = dec!(50);
        assert_eq!(o.imbalance(), dec!(50));

        o.binance.filled_amount = dec!(150);
        assert_eq!(o.imbalance(), dec!(50));
    }

    #[test]
    fn leg_remaining_never_negative() {
        let mut leg = VenueLeg::new(PositionSide::Long, dec!(100), 1);
        leg.filled_amount = dec!(120);
        assert_eq!(leg.remaining(), Decimal::ZERO);
    }

    #[test]
    fn order_ids_are_unique() {
        let a = generate_order_id("ETHUSDT");
        let b = generate_order_id("ETHUSDT");
        assert_ne!(a, b);
        assert!(a.starts_with("ARB_ETHUSDT_"));
    }
}
