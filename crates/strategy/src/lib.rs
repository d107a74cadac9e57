//! The opportunity detector: turns funding-rate differentials into
//! directional signals, sizes entries against the exposure cap, derives
//! protective price levels and advises on closing.
//!
//! The direction rule is fixed by the sign of the differential
//! (`lighter_rate - binance_rate`): a positive differential shorts Lighter
//! and longs Binance, collecting the richer funding leg; a negative one is
//! the mirror image.

use configuration::TradingConfig;
use core_types::{PositionSide, StrategyType};
use events::RateDiffSnapshot;
use feed::RateFeed;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Trading parameters the detector evaluates against.
#[derive(Debug, Clone)]
pub struct StrategyParams {
    /// Minimum absolute differential worth entering, as a fraction.
    pub funding_rate_threshold: Decimal,
    /// Quote amount placed per execution cycle.
    pub position_size_per_order: Decimal,
    /// Cap on combined committed quote exposure per leg.
    pub max_total_position: Decimal,
    pub leverage: u32,
    /// Stop-loss distance from entry, as a fraction (0.2 = 20%).
    pub stop_loss_pct: Decimal,
    /// Take-profit distance from entry, as a fraction.
    pub take_profit_pct: Decimal,
    /// Positions older than this are advised closed.
    pub max_holding_hours: f64,
}

impl From<&TradingConfig> for StrategyParams {
    fn from(config: &TradingConfig) -> Self {
        Self {
            funding_rate_threshold: config.funding_rate_threshold,
            position_size_per_order: config.position_size_per_order,
            max_total_position: config.max_total_position,
            leverage: config.leverage,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            max_holding_hours: config.max_holding_hours,
        }
    }
}

/// A directional entry signal for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub strategy_type: StrategyType,
    pub rate_diff: Decimal,
    pub lighter_rate: Decimal,
    pub binance_rate: Decimal,
}

/// Why an open position should be unwound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The differential flipped sign since entry.
    DiffReversed,
    /// The differential shrank below half the entry threshold.
    DiffCollapsed,
    /// The position exceeded the maximum holding period.
    MaxHoldingExceeded,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::DiffReversed => "rate differential reversed",
            CloseReason::DiffCollapsed => "rate differential collapsed",
            CloseReason::MaxHoldingExceeded => "maximum holding period exceeded",
        };
        f.write_str(s)
    }
}

pub struct OpportunityDetector {
    feed: Arc<RateFeed>,
    params: StrategyParams,
}

impl OpportunityDetector {
    pub fn new(feed: Arc<RateFeed>, params: StrategyParams) -> Self {
        Self { feed, params }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Evaluates one symbol's current differential.
    pub async fn detect(&self, symbol: &str) -> Option<Signal> {
        let snapshot = self.feed.rate_diff(symbol).await?;
        self.evaluate(&snapshot)
    }

    /// Evaluates every symbol both venues currently cover.
    pub async fn detect_all(&self) -> Vec<Signal> {
        self.feed
            .all_rate_diffs()
            .await
            .iter()
            .filter_map(|snapshot| self.evaluate(snapshot))
            .collect()
    }

    /// The pure threshold-and-direction rule.
    pub fn evaluate(&self, snapshot: &RateDiffSnapshot) -> Option<Signal> {
        let diff = snapshot.current_diff;
        if diff.is_zero() || diff.abs() < self.params.funding_rate_threshold {
            return None;
        }

        let strategy_type = if diff > Decimal::ZERO {
            StrategyType::LighterShortBinanceLong
        } else {
            StrategyType::LighterLongBinanceShort
        };
        debug!(symbol = %snapshot.symbol, %diff, ?strategy_type, "opportunity detected");

        Some(Signal {
            symbol: snapshot.symbol.clone(),
            strategy_type,
            rate_diff: diff,
            lighter_rate: snapshot.lighter_rate,
            binance_rate: snapshot.binance_rate,
        })
    }

    /// Per-leg entry size given the exposure already committed. Zero when
    /// the cap is reached.
    pub fn position_size(&self, current_total: Decimal) -> Decimal {
        let available = self.params.max_total_position - current_total;
        if available <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.params.position_size_per_order.min(available)
    }

    /// Protective price levels for a leg entered at `entry_price`.
    pub fn stop_take_prices(&self, entry_price: Decimal, side: PositionSide) -> (Decimal, Decimal) {
        let one = Decimal::ONE;
        match side {
            PositionSide::Long => (
                entry_price * (one - self.params.stop_loss_pct),
                entry_price * (one + self.params.take_profit_pct),
            ),
            PositionSide::Short => (
                entry_price * (one + self.params.stop_loss_pct),
                entry_price * (one - self.params.take_profit_pct),
            ),
        }
    }

    /// Whether an open position should be unwound, and why. Reversal takes
    /// precedence over collapse; the holding-period cap applies even with
    /// no current differential.
    pub fn should_close(
        &self,
        current_diff: Option<Decimal>,
        entry_diff: Decimal,
        holding_hours: f64,
    ) -> Option<CloseReason> {
        if let Some(diff) = current_diff {
            let reversed = (entry_diff > Decimal::ZERO && diff < Decimal::ZERO)
                || (entry_diff < Decimal::ZERO && diff > Decimal::ZERO);
            if reversed {
                return Some(CloseReason::DiffReversed);
            }
            if diff.abs() < self.params.funding_rate_threshold / Decimal::TWO {
                return Some(CloseReason::DiffCollapsed);
            }
        }
        if holding_hours >= self.params.max_holding_hours {
            return Some(CloseReason::MaxHoldingExceeded);
        }
        None
    }
}
