pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{OrderStatus, PositionSide, StrategyType, TradeAction, Venue};
pub use error::CoreError;
pub use structs::{
    generate_order_id, ArbitrageOrder, FundingRateSample, PnlRecord, SymbolEntry, TradeFill,
    VenueLeg,
};
