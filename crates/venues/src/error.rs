use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to deserialize venue response: {0}")]
    Deserialization(String),

    #[error("Venue rejected the request ({code}): {message}")]
    VenueRejection { code: i64, message: String },

    #[error("Rate limited by venue")]
    RateLimited,

    #[error("Operation requires credentials that are not configured")]
    NotAuthenticated,

    #[error("Unknown symbol on this venue: {0}")]
    UnknownSymbol(String),

    #[error("Invalid order parameters: {0}")]
    InvalidOrder(String),

    #[error("Operation not supported by this venue: {0}")]
    Unsupported(&'static str),
}

impl AdapterError {
    /// Whether a retry is worthwhile. Transport hiccups and rate limits are
    /// transient; rejections and configuration problems are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transport(_) | AdapterError::RateLimited)
    }
}
