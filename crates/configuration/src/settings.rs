use rust_decimal::Decimal;
use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub trading: TradingConfig,
    pub execution: ExecutionConfig,
    pub risk: RiskConfig,
    pub venues: VenuesConfig,
}

/// Parameters for the funding-rate polling loop.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Seconds between funding-rate refresh cycles.
    pub poll_interval_secs: u64,
}

/// Parameters governing opportunity detection and position shape.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Minimum absolute rate differential to act on (0.0001 = 0.01%).
    pub funding_rate_threshold: Decimal,
    /// Quote-currency size of one execution-cycle order.
    pub position_size_per_order: Decimal,
    /// Ceiling on the total committed amount across all open orders.
    pub max_total_position: Decimal,
    /// Maximum tolerated fill skew between the two venues.
    pub max_imbalance: Decimal,
    pub leverage: u32,
    /// Stop-loss distance as a fraction of entry price (0.20 = 20%).
    pub stop_loss_pct: Decimal,
    /// Take-profit distance as a fraction of entry price.
    pub take_profit_pct: Decimal,
    /// Advisory ceiling on holding duration, in hours.
    pub max_holding_hours: f64,
}

/// Parameters for the dual-venue execution loop.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Delay between execution cycles, in milliseconds.
    pub cycle_delay_ms: u64,
    /// Pause before re-checking when the imbalance throttle trips, in milliseconds.
    pub imbalance_pause_ms: u64,
    /// Oversized per-cycle amount used by the emergency unwind path.
    pub emergency_close_amount: Decimal,
}

/// Thresholds and cadences for the risk monitoring loops.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Alert when live imbalance / total size exceeds this fraction.
    pub max_imbalance_ratio: Decimal,
    /// Alert when combined unrealized P&L is worse than minus this fraction
    /// of the initial investment.
    pub loss_alert_ratio: Decimal,
    /// Fractional buffer applied to a venue's liquidation price.
    pub liquidation_buffer_pct: Decimal,
    /// Alert when a venue's available balance drops below this floor.
    pub min_balance: Decimal,
    /// Whether stop/take and liquidation triggers invoke the close path
    /// automatically. The monitors only alert when this is false.
    pub auto_close: bool,
    pub position_check_secs: u64,
    pub stop_check_secs: u64,
    pub liquidation_check_secs: u64,
    pub balance_check_secs: u64,
    /// Seconds between ledger imbalance reconciliation passes.
    pub imbalance_sync_secs: u64,
}

/// Connection settings for both venue adapters.
#[derive(Debug, Clone, Deserialize)]
pub struct VenuesConfig {
    pub lighter: LighterConfig,
    pub binance: BinanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LighterConfig {
    pub base_url: String,
    /// Account index on the venue; zero when unauthenticated.
    #[serde(default)]
    pub account_index: u32,
    /// API key private key; read-only access when empty.
    #[serde(default)]
    pub api_key_private_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Use the futures testnet base URL instead of production.
    #[serde(default)]
    pub testnet: bool,
}
