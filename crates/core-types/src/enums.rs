use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// The two derivatives venues a paired position straddles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Lighter,
    Binance,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Lighter => "lighter",
            Venue::Binance => "binance",
        }
    }

    /// The venue on the other side of a paired position.
    pub fn other(&self) -> Self {
        match self {
            Venue::Lighter => Venue::Binance,
            Venue::Binance => Venue::Lighter,
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lighter" => Ok(Venue::Lighter),
            "binance" => Ok(Venue::Binance),
            other => Err(CoreError::UnknownVenue(other.to_string())),
        }
    }
}

/// Direction of one leg of a paired position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Returns the opposite side, used when unwinding a leg.
    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(PositionSide::Long),
            "short" => Ok(PositionSide::Short),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// Whether a fill opened or unwound exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Open,
    Close,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Open => "open",
            TradeAction::Close => "close",
        }
    }
}

impl FromStr for TradeAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TradeAction::Open),
            "close" => Ok(TradeAction::Close),
            other => Err(CoreError::InvalidAction(other.to_string())),
        }
    }
}

/// Lifecycle of an arbitrage order.
///
/// Transitions are one-directional: `Opening -> Open -> Closing -> Closed`,
/// with `Opening -> Failed` as the only escape. No state is ever revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Opening,
    Open,
    Closing,
    Closed,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Opening, OrderStatus::Open)
                | (OrderStatus::Opening, OrderStatus::Failed)
                | (OrderStatus::Open, OrderStatus::Closing)
                | (OrderStatus::Closing, OrderStatus::Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Opening => "opening",
            OrderStatus::Open => "open",
            OrderStatus::Closing => "closing",
            OrderStatus::Closed => "closed",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opening" => Ok(OrderStatus::Opening),
            "open" => Ok(OrderStatus::Open),
            "closing" => Ok(OrderStatus::Closing),
            "closed" => Ok(OrderStatus::Closed),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Which way the paired position points; fully determined by the sign of
/// the funding-rate differential at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    LighterShortBinanceLong,
    LighterLongBinanceShort,
}

impl StrategyType {
    /// The side each venue takes under this strategy.
    pub fn sides(&self) -> (PositionSide, PositionSide) {
        match self {
            StrategyType::LighterShortBinanceLong => (PositionSide::Short, PositionSide::Long),
            StrategyType::LighterLongBinanceShort => (PositionSide::Long, PositionSide::Short),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyType::LighterShortBinanceLong => "lighter_short_binance_long",
            StrategyType::LighterLongBinanceShort => "lighter_long_binance_short",
        }
    }
}

impl FromStr for StrategyType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lighter_short_binance_long" => Ok(StrategyType::LighterShortBinanceLong),
            "lighter_long_binance_short" => Ok(StrategyType::LighterLongBinanceShort),
            other => Err(CoreError::InvalidStrategy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_one_way() {
        assert!(OrderStatus::Opening.can_transition_to(OrderStatus::Open));
        assert!(OrderStatus::Opening.can_transition_to(OrderStatus::Failed));
        assert!(OrderStatus::Open.can_transition_to(OrderStatus::Closing));
        assert!(OrderStatus::Closing.can_transition_to(OrderStatus::Closed));

        // No state is revisited and terminal states have no exits.
        assert!(!OrderStatus::Open.can_transition_to(OrderStatus::Opening));
        assert!(!OrderStatus::Open.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Closing.can_transition_to(OrderStatus::Open));
        assert!(!OrderStatus::Closed.can_transition_to(OrderStatus::Opening));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Open));
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Closed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Opening.is_terminal());
        assert!(!OrderStatus::Closing.is_terminal());
    }

    #[test]
    fn side_opposite_round_trips() {
        assert_eq!(PositionSide::Long.opposite(), PositionSide::Short);
        assert_eq!(PositionSide::Short.opposite().opposite(), PositionSide::Short);
    }

    #[test]
    fn string_round_trips() {
        for status in [
            OrderStatus::Opening,
            OrderStatus::Open,
            OrderStatus::Closing,
            OrderStatus::Closed,
            OrderStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!("lighter".parse::<Venue>().unwrap(), Venue::Lighter);
        assert!("kraken".parse::<Venue>().is_err());
    }
}
