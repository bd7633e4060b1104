// =============================================================================
// Candlestick Patterns: previous bar P, current bar C
// =============================================================================
//
//   Bullish engulfing : P bearish, C bullish, C.open < P.close, C.close > P.open
//   Bearish engulfing : P bullish, C bearish, C.open > P.close, C.close < P.open
//   Hammer            : C bullish, body <= 0.3 * range,
//                       lower wick (open - low) > 2 * upper wick (high - close)
//   Shooting star     : C bearish, body <= 0.3 * range,
//                       upper wick (high - open) > 2 * lower wick (close - low)
// =============================================================================

use serde::Serialize;

use crate::market_data::Kline;

/// Maximum body size, as a fraction of the bar's range, for hammer and
/// shooting-star bars.
const SMALL_BODY_RATIO: f64 = 0.3;
/// Long wick must exceed the opposite wick by this factor.
const WICK_RATIO: f64 = 2.0;

/// Patterns found on the last two bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CandlePatterns {
    pub bullish_engulfing: bool,
    pub bearish_engulfing: bool,
    pub hammer: bool,
    pub shooting_star: bool,
}

impl CandlePatterns {
    pub fn detect(prev: &Kline, curr: &Kline) -> Self {
        Self {
            bullish_engulfing: is_bullish_engulfing(prev, curr),
            bearish_engulfing: is_bearish_engulfing(prev, curr),
            hammer: is_hammer(curr),
            shooting_star: is_shooting_star(curr),
        }
    }
}

pub fn is_bullish_engulfing(prev: &Kline, curr: &Kline) -> bool {
    prev.is_bearish() && curr.is_bullish() && curr.open < prev.close && curr.close > prev.open
}

pub fn is_bearish_engulfing(prev: &Kline, curr: &Kline) -> bool {
    prev.is_bullish() && curr.is_bearish() && curr.open > prev.close && curr.close < prev.open
}

pub fn is_hammer(c: &Kline) -> bool {
    let body = c.close - c.open;
    let lower_wick = c.open - c.low;
    let upper_wick = c.high - c.close;
    c.is_bullish() && body <= (c.high - c.low) * SMALL_BODY_RATIO && lower_wick > upper_wick * WICK_RATIO
}

pub fn is_shooting_star(c: &Kline) -> bool {
    let body = c.open - c.close;
    let upper_wick = c.high - c.open;
    let lower_wick = c.close - c.low;
    c.is_bearish() && body <= (c.high - c.low) * SMALL_BODY_RATIO && upper_wick > lower_wick * WICK_RATIO
}
