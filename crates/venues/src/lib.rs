//! Venue adapters: the capability interface every exchange client must
//! implement, plus concrete clients for Lighter and Binance futures.
//!
//! Every adapter method may fail or report "unknown"; callers treat absence
//! as degrade-gracefully, never as fatal. Transient I/O errors are retried
//! at this boundary through the [`retry::Retry`] combinator.

use async_trait::async_trait;
use core_types::{PositionSide, Venue};
use rust_decimal::Decimal;
use std::collections::HashMap;

mod auth;
pub mod binance;
pub mod error;
pub mod lighter;
pub mod retry;

pub use binance::BinanceAdapter;
pub use error::AdapterError;
pub use lighter::LighterAdapter;
pub use retry::Retry;

/// How the venue reported a freshly placed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueOrderStatus {
    /// Fully filled; `filled_amount` and `price` are authoritative.
    Filled,
    /// Accepted but resting; treated as no fill this cycle.
    Open,
    /// Rejected outright.
    Rejected,
}

/// The normalized result of `create_order` on either venue.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueOrder {
    pub order_ref: String,
    pub status: VenueOrderStatus,
    pub price: Decimal,
    pub filled_amount: Decimal,
}

/// A venue's live view of one symbol's position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VenuePosition {
    /// Absolute position amount in quote terms; zero when flat.
    pub amount: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Order type requested on the venue. Execution cycles always use market
/// orders; limit support exists for completeness of the capability surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueOrderType {
    Market,
    Limit,
}

/// The uniform capability interface both venue clients implement.
///
/// A venue with no public endpoint for an operation returns an explicit
/// `Ok(None)` ("unknown") rather than an error, so core logic never probes
/// for optional capabilities.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    async fn connect(&self) -> Result<(), AdapterError>;
    async fn disconnect(&self) -> Result<(), AdapterError>;

    /// Latest funding rate for one symbol; `None` when the venue has no data.
    async fn funding_rate(&self, symbol: &str) -> Result<Option<Decimal>, AdapterError>;

    /// Latest funding rate for every tracked symbol.
    async fn all_funding_rates(&self) -> Result<HashMap<String, Decimal>, AdapterError>;

    /// Current mark/last price; `None` when unavailable.
    async fn price(&self, symbol: &str) -> Result<Option<Decimal>, AdapterError>;

    /// Available account balance in quote currency; `None` when unknown
    /// (e.g. unauthenticated).
    async fn balance(&self) -> Result<Option<Decimal>, AdapterError>;

    /// Live position for one symbol; `None` when flat or unknown.
    async fn position(&self, symbol: &str) -> Result<Option<VenuePosition>, AdapterError>;

    async fn create_order(
        &self,
        symbol: &str,
        side: PositionSide,
        amount: Decimal,
        order_type: VenueOrderType,
        leverage: u32,
    ) -> Result<VenueOrder, AdapterError>;

    /// Estimated liquidation price; `None` when the venue does not expose one.
    async fn liquidation_price(&self, symbol: &str) -> Result<Option<Decimal>, AdapterError>;

    /// Best-effort venue-side protective orders.
    async fn set_stop_loss_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        stop_loss_price: Decimal,
        take_profit_price: Decimal,
    ) -> Result<(), AdapterError>;
}
