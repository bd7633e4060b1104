// =============================================================================
// Scalp Engine: real-time kline charts with an advisory scalping signal
// =============================================================================
//
// Data flow:
//   MarketDataClient (REST history) ─┐
//                                    ├─▶ ChartSession ─▶ IndicatorSet ─▶ ScalpSignal
//   StreamMultiplexer (live klines) ─┘        │
//                                             └─▶ watch::Receiver<ChartSnapshot>
// =============================================================================

pub mod binance;
pub mod chart;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod runtime_config;
pub mod signals;
pub mod types;

pub use chart::{ChartSession, ChartSnapshot, HistorySource, SessionSettings};
pub use error::{FeedError, KlineParseError};
pub use runtime_config::EngineConfig;
pub use types::{Interval, StreamKey};
