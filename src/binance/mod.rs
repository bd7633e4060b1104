// =============================================================================
// Binance Module
// =============================================================================
//
// Public REST market data. The live kline stream lives in
// `market_data::connector`.

pub mod client;

pub use client::{MarketDataClient, DEFAULT_REST_BASE_URL, DEFAULT_SYMBOL_LIMIT};
