// =============================================================================
// Signals Module
// =============================================================================
//
// Scalping signal pipeline for one series:
// - Candlestick pattern detection on the last two bars
// - Trend / RSI / pattern rules producing an advisory BUY / SELL / NEUTRAL

pub mod patterns;
pub mod scalping;

pub use patterns::CandlePatterns;
pub use scalping::{
    evaluate_signal, ProjectedReturns, ScalpSignal, SignalStrength, SignalType, DEFAULT_LEVERAGE,
};
