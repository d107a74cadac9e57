use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown venue: {0}")]
    UnknownVenue(String),

    #[error("Invalid position side: {0}")]
    InvalidSide(String),

    #[error("Invalid trade action: {0}")]
    InvalidAction(String),

    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    #[error("Invalid strategy type: {0}")]
    InvalidStrategy(String),
}
