//! Real-time event structures pushed across the presentation boundary.
//!
//! The core components publish these on a `tokio::sync::broadcast` channel;
//! whatever presentation layer exists subscribes and renders them. This crate
//! deliberately depends only on `core-types` so every other crate can emit
//! events without cycles.

pub mod messages;

pub use messages::{
    alert, Alert, AlertKind, PositionSnapshot, RateDiffSnapshot, WsMessage,
};
