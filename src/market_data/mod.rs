// =============================================================================
// Market Data Module
// =============================================================================
//
// Kline decoding, the per-key live stream multiplexer and the bar series a
// chart merges into.

pub mod connector;
pub mod kline;
pub mod multiplexer;
pub mod registry;
pub mod series;

pub use connector::{BinanceConnector, FrameStream, StreamConnector, DEFAULT_WS_BASE_URL};
pub use kline::{parse_rest_row, parse_stream_message, Kline, StreamKline};
pub use multiplexer::{ConnectionState, StreamMultiplexer, Subscription};
pub use registry::{SubscriberRegistry, SubscriberToken};
pub use series::{MergeOutcome, Series};
