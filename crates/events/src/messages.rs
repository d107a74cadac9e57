use chrono::{DateTime, Utc};
use core_types::OrderStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The category of a risk alert. Alerts are advisory records, never errors:
/// the monitors raise them and carry on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighImbalance,
    HighLoss,
    StopLossTriggered,
    TakeProfitTriggered,
    LiquidationRisk,
    LowBalance,
    EmergencyClose,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::HighImbalance => "high_imbalance",
            AlertKind::HighLoss => "high_loss",
            AlertKind::StopLossTriggered => "stop_loss_triggered",
            AlertKind::TakeProfitTriggered => "take_profit_triggered",
            AlertKind::LiquidationRisk => "liquidation_risk",
            AlertKind::LowBalance => "low_balance",
            AlertKind::EmergencyClose => "emergency_close",
        }
    }
}

/// A risk alert with machine-readable details. The same payload is persisted
/// as a system-log row, making it the system's side channel for human
/// intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub kind: AlertKind,
    pub module: String,
    pub message: String,
    pub details: serde_json::Value,
}

/// The latest funding-rate differential for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateDiffSnapshot {
    pub symbol: String,
    pub lighter_rate: Decimal,
    pub binance_rate: Decimal,
    pub current_diff: Decimal,
    pub observed_at: i64,
}

/// A compact view of one live paired position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub order_id: String,
    pub symbol: String,
    pub status: OrderStatus,
    pub imbalance_amount: Decimal,
    pub total_unrealized_pnl: Decimal,
}

/// The top-level message enum for the presentation boundary.
///
/// `#[serde(tag = "type", content = "payload")]` serializes each variant as
/// `{ "type": ..., "payload": ... }`, which is easy for a frontend to handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsMessage {
    /// A risk alert.
    Alert(Alert),
    /// A periodic snapshot of all tracked funding-rate differentials.
    Rates(Vec<RateDiffSnapshot>),
    /// A periodic snapshot of all live paired positions.
    Positions(Vec<PositionSnapshot>),
}

/// Convenience constructor used by the monitors.
pub fn alert(kind: AlertKind, module: &str, message: impl Into<String>, details: serde_json::Value) -> Alert {
    Alert {
        timestamp: Utc::now(),
        kind,
        module: module.to_string(),
        message: message.into(),
        details,
    }
}
