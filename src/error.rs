// =============================================================================
// Error types for the market-data plane
// =============================================================================
//
// None of these ever reach a stream subscriber. The REST client folds them
// into an empty history, the multiplexer logs and drops bad frames, and
// connection failures feed the reconnect loop.
// =============================================================================

use thiserror::Error;

/// Failure while talking to the exchange (REST or WebSocket).
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("exchange returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("stream connection error: {0}")]
    Connection(String),
}

/// Reason a single kline payload or REST row was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KlineParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {field} is not numeric: {raw}")]
    NotNumeric { field: &'static str, raw: String },

    #[error("field {0} is not finite")]
    NotFinite(&'static str),

    #[error("field {field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("field {field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}
