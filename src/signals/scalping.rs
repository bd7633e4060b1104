// =============================================================================
// Scalping Signal: advisory direction, strength and price levels
// =============================================================================
//
// Pipeline (pure, stateless):
//   1. Precondition: >= 3 bars and EMA20 / EMA50 / RSI14 all defined.
//   2. Trend: up iff price > EMA20 > EMA50, down iff price < EMA20 < EMA50.
//   3. Candle patterns on the last two bars.
//   4. Uptrend rule block, then downtrend rule block. Both always run; the
//      trend conditions exclude each other, so the second block never
//      overrides the first in practice, but the order fixes the reason trail.
//   5. Fixed-percentage stop / targets around the current close.
//
// The signal is advisory only. Nothing here places orders.
// =============================================================================

use serde::Serialize;
use tracing::debug;

use super::patterns::CandlePatterns;
use crate::market_data::Kline;
use crate::types::Interval;

pub const MIN_BARS: usize = 3;

const BUY_RSI_RANGE: std::ops::RangeInclusive<f64> = 30.0..=45.0;
const SELL_RSI_RANGE: std::ops::RangeInclusive<f64> = 55.0..=70.0;
/// Price within this fraction of EMA20 counts as touching it.
const EMA_PROXIMITY: f64 = 0.01;

const STOP_LOSS_PCT: f64 = 0.01;
const TP1_PCT: f64 = 0.008;
const TP2_PCT: f64 = 0.012;
const TP3_PCT: f64 = 0.018;

pub const DEFAULT_LEVERAGE: f64 = 10.0;

pub const REASON_INSUFFICIENT_DATA: &str = "insufficient data";
pub const REASON_NO_SETUP: &str = "no clear setup - wait for confirmation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Neutral,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Ordered `Weak < Moderate < Strong`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
}

impl std::fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weak => write!(f, "WEAK"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Strong => write!(f, "STRONG"),
        }
    }
}

/// Verdict plus the full ordered trail of reasons that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalpSignal {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub strength: SignalStrength,
    pub reasons: Vec<String>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub take_profit_3: f64,
}

/// Leveraged percentage move from entry to each level, signed so that a
/// take-profit is a gain for both BUY and SELL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedReturns {
    pub take_profit_1_pct: f64,
    pub take_profit_2_pct: f64,
    pub take_profit_3_pct: f64,
    pub stop_loss_pct: f64,
}

impl ScalpSignal {
    /// Verdict for a series too short to evaluate; every level is zero.
    pub fn insufficient_data() -> Self {
        Self {
            signal_type: SignalType::Neutral,
            strength: SignalStrength::Weak,
            reasons: vec![REASON_INSUFFICIENT_DATA.to_string()],
            entry_price: 0.0,
            stop_loss: 0.0,
            take_profit_1: 0.0,
            take_profit_2: 0.0,
            take_profit_3: 0.0,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.signal_type != SignalType::Neutral
    }

    pub fn projected_returns(&self, leverage: f64) -> ProjectedReturns {
        let direction = match self.signal_type {
            SignalType::Buy => 1.0,
            SignalType::Sell => -1.0,
            SignalType::Neutral => 0.0,
        };
        let entry = self.entry_price;
        let pct = |exit: f64| {
            if entry > 0.0 && direction != 0.0 {
                (exit - entry) / entry * 100.0 * leverage * direction
            } else {
                0.0
            }
        };

        ProjectedReturns {
            take_profit_1_pct: pct(self.take_profit_1),
            take_profit_2_pct: pct(self.take_profit_2),
            take_profit_3_pct: pct(self.take_profit_3),
            stop_loss_pct: pct(self.stop_loss),
        }
    }
}

/// Evaluate the scalping setup on the latest bar.
pub fn evaluate_signal(
    bars: &[Kline],
    ema20: Option<f64>,
    ema50: Option<f64>,
    rsi: Option<f64>,
    interval: Interval,
) -> ScalpSignal {
    let (ema20, ema50, rsi) = match (ema20, ema50, rsi) {
        (Some(a), Some(b), Some(r)) if bars.len() >= MIN_BARS => (a, b, r),
        _ => {
            debug!(interval = %interval, bars = bars.len(), "signal: insufficient data");
            return ScalpSignal::insufficient_data();
        }
    };

    let curr = &bars[bars.len() - 1];
    let prev = &bars[bars.len() - 2];
    let price = curr.close;

    let is_uptrend = price > ema20 && ema20 > ema50;
    let is_downtrend = price < ema20 && ema20 < ema50;
    let patterns = CandlePatterns::detect(prev, curr);
    let near_ema20 = (price - ema20).abs() / price < EMA_PROXIMITY;

    let mut reasons: Vec<String> = Vec::new();
    let mut signal = SignalType::Neutral;
    let mut strength = SignalStrength::Weak;

    // ── Uptrend block ────────────────────────────────────────────────────
    if is_uptrend {
        reasons.push("Uptrend: price > EMA20 > EMA50".to_string());

        if BUY_RSI_RANGE.contains(&rsi) {
            reasons.push(format!("RSI pullback: {rsi:.1}"));
            signal = SignalType::Buy;
            strength = SignalStrength::Moderate;
        }
        if patterns.bullish_engulfing {
            reasons.push("Bullish engulfing pattern".to_string());
            signal = SignalType::Buy;
            strength = SignalStrength::Strong;
        }
        if patterns.hammer {
            reasons.push("Hammer candle".to_string());
            signal = SignalType::Buy;
            if strength != SignalStrength::Strong {
                strength = SignalStrength::Moderate;
            }
        }
        if near_ema20 {
            reasons.push("Price near EMA20 support".to_string());
            if signal == SignalType::Buy {
                strength = SignalStrength::Strong;
            }
        }
    }

    // ── Downtrend block ──────────────────────────────────────────────────
    if is_downtrend {
        reasons.push("Downtrend: price < EMA20 < EMA50".to_string());

        if SELL_RSI_RANGE.contains(&rsi) {
            reasons.push(format!("RSI rejection: {rsi:.1}"));
            signal = SignalType::Sell;
            strength = SignalStrength::Moderate;
        }
        if patterns.bearish_engulfing {
            reasons.push("Bearish engulfing pattern".to_string());
            signal = SignalType::Sell;
            strength = SignalStrength::Strong;
        }
        if patterns.shooting_star {
            reasons.push("Shooting star candle".to_string());
            signal = SignalType::Sell;
            if strength != SignalStrength::Strong {
                strength = SignalStrength::Moderate;
            }
        }
        if near_ema20 {
            reasons.push("Price near EMA20 resistance".to_string());
            if signal == SignalType::Sell {
                strength = SignalStrength::Strong;
            }
        }
    }

    // ── Levels ───────────────────────────────────────────────────────────
    let (stop_loss, tp1, tp2, tp3) = match signal {
        SignalType::Buy => (
            price * (1.0 - STOP_LOSS_PCT),
            price * (1.0 + TP1_PCT),
            price * (1.0 + TP2_PCT),
            price * (1.0 + TP3_PCT),
        ),
        SignalType::Sell => (
            price * (1.0 + STOP_LOSS_PCT),
            price * (1.0 - TP1_PCT),
            price * (1.0 - TP2_PCT),
            price * (1.0 - TP3_PCT),
        ),
        SignalType::Neutral => {
            reasons.push(REASON_NO_SETUP.to_string());
            (0.0, 0.0, 0.0, 0.0)
        }
    };

    debug!(
        interval = %interval,
        signal = %signal,
        strength = %strength,
        price,
        rsi,
        "signal evaluated"
    );

    ScalpSignal {
        signal_type: signal,
        strength,
        reasons,
        entry_price: price,
        stop_loss,
        take_profit_1: tp1,
        take_profit_2: tp2,
        take_profit_3: tp3,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn k(time: i64, open: f64, high: f64, low: f64, close: f64) -> Kline {
        Kline {
            time,
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    /// Three plain bars ending at `close` with no pattern on the last two.
    fn plain_bars(close: f64) -> Vec<Kline> {
        vec![
            k(0, close - 0.5, close + 0.5, close - 1.0, close - 0.2),
            k(60, close - 0.2, close + 0.4, close - 0.6, close - 0.1),
            k(120, close - 0.1, close + 0.3, close - 0.3, close),
        ]
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn insufficient_bars() {
        let bars = plain_bars(100.0)[..2].to_vec();
        let s = evaluate_signal(&bars, Some(95.0), Some(90.0), Some(35.0), Interval::M5);
        assert_eq!(s.signal_type, SignalType::Neutral);
        assert_eq!(s.strength, SignalStrength::Weak);
        assert_eq!(s.reasons, vec![REASON_INSUFFICIENT_DATA.to_string()]);
        assert_eq!(s.entry_price, 0.0);
        assert_eq!(s.stop_loss, 0.0);
        assert_eq!(s.take_profit_3, 0.0);
    }

    #[test]
    fn undefined_indicator_is_insufficient() {
        let bars = plain_bars(100.0);
        for (a, b, r) in [
            (None, Some(90.0), Some(35.0)),
            (Some(95.0), None, Some(35.0)),
            (Some(95.0), Some(90.0), None),
        ] {
            let s = evaluate_signal(&bars, a, b, r, Interval::M5);
            assert_eq!(s.reasons, vec![REASON_INSUFFICIENT_DATA.to_string()]);
            assert_eq!(s.signal_type, SignalType::Neutral);
            assert!(!s.is_actionable());
        }
    }

    #[test]
    fn uptrend_rsi_pullback_is_moderate_buy() {
        let bars = plain_bars(100.0);
        let s = evaluate_signal(&bars, Some(95.0), Some(90.0), Some(35.0), Interval::M5);
        assert_eq!(s.signal_type, SignalType::Buy);
        assert!(s.is_actionable());
        assert!(s.strength >= SignalStrength::Moderate);
        assert_eq!(s.strength, SignalStrength::Moderate);
        assert!(approx(s.entry_price, 100.0));
        assert!(approx(s.stop_loss, 99.0));
        assert!(approx(s.take_profit_1, 100.8));
        assert!(approx(s.take_profit_2, 101.2));
        assert!(approx(s.take_profit_3, 101.8));
        assert_eq!(s.reasons[0], "Uptrend: price > EMA20 > EMA50");
        assert_eq!(s.reasons[1], "RSI pullback: 35.0");
    }

    #[test]
    fn bullish_engulfing_upgrades_to_strong() {
        let mut bars = plain_bars(100.0);
        bars[1] = k(60, 99.8, 100.0, 98.0, 98.5);
        bars[2] = k(120, 98.0, 100.5, 97.9, 100.0);
        let s = evaluate_signal(&bars, Some(95.0), Some(90.0), Some(35.0), Interval::M5);
        assert_eq!(s.signal_type, SignalType::Buy);
        assert_eq!(s.strength, SignalStrength::Strong);
        assert!(s.reasons.iter().any(|r| r == "Bullish engulfing pattern"));
    }

    #[test]
    fn hammer_alone_is_moderate_buy() {
        let mut bars = plain_bars(100.0);
        // body 0.5, range 5, lower wick 4.5, upper wick 0
        bars[2] = k(120, 99.5, 100.0, 95.0, 100.0);
        let s = evaluate_signal(&bars, Some(95.0), Some(90.0), Some(60.0), Interval::M1);
        assert_eq!(s.signal_type, SignalType::Buy);
        assert_eq!(s.strength, SignalStrength::Moderate);
        assert_eq!(
            s.reasons,
            vec!["Uptrend: price > EMA20 > EMA50".to_string(), "Hammer candle".to_string()]
        );
    }

    #[test]
    fn near_ema20_upgrades_existing_buy() {
        let bars = plain_bars(100.0);
        let s = evaluate_signal(&bars, Some(99.5), Some(90.0), Some(40.0), Interval::M5);
        assert_eq!(s.signal_type, SignalType::Buy);
        assert_eq!(s.strength, SignalStrength::Strong);
        assert_eq!(s.reasons.last().map(String::as_str), Some("Price near EMA20 support"));
    }

    #[test]
    fn near_ema20_alone_is_not_a_signal() {
        let bars = plain_bars(100.0);
        let s = evaluate_signal(&bars, Some(99.5), Some(90.0), Some(60.0), Interval::M5);
        assert_eq!(s.signal_type, SignalType::Neutral);
        assert_eq!(s.strength, SignalStrength::Weak);
        assert_eq!(
            s.reasons,
            vec![
                "Uptrend: price > EMA20 > EMA50".to_string(),
                "Price near EMA20 support".to_string(),
                REASON_NO_SETUP.to_string(),
            ]
        );
        assert!(approx(s.entry_price, 100.0));
        assert_eq!(s.stop_loss, 0.0);
    }

    #[test]
    fn downtrend_rsi_rejection_is_moderate_sell() {
        let bars = plain_bars(100.0);
        let s = evaluate_signal(&bars, Some(105.0), Some(110.0), Some(60.0), Interval::M5);
        assert_eq!(s.signal_type, SignalType::Sell);
        assert_eq!(s.strength, SignalStrength::Moderate);
        assert!(approx(s.stop_loss, 101.0));
        assert!(approx(s.take_profit_1, 99.2));
        assert!(approx(s.take_profit_2, 98.8));
        assert!(approx(s.take_profit_3, 98.2));
        assert_eq!(s.reasons[0], "Downtrend: price < EMA20 < EMA50");
    }

    #[test]
    fn bearish_engulfing_and_shooting_star_stay_strong() {
        let bars = vec![
            k(0, 99.0, 100.0, 98.0, 99.5),
            k(60, 99.0, 100.2, 98.9, 100.0),
            // bearish engulfing; body 2 of range 9.1 => also a shooting star
            k(120, 100.5, 107.5, 98.4, 98.5),
        ];
        let s = evaluate_signal(&bars, Some(103.0), Some(106.0), Some(60.0), Interval::M5);
        assert_eq!(s.signal_type, SignalType::Sell);
        assert_eq!(s.strength, SignalStrength::Strong);
        assert_eq!(
            s.reasons,
            vec![
                "Downtrend: price < EMA20 < EMA50".to_string(),
                "RSI rejection: 60.0".to_string(),
                "Bearish engulfing pattern".to_string(),
                "Shooting star candle".to_string(),
            ]
        );
    }

    #[test]
    fn no_trend_is_neutral() {
        let bars = plain_bars(100.0);
        // price between the EMAs
        let s = evaluate_signal(&bars, Some(101.0), Some(99.0), Some(35.0), Interval::H1);
        assert_eq!(s.signal_type, SignalType::Neutral);
        assert_eq!(s.strength, SignalStrength::Weak);
        assert_eq!(s.reasons, vec![REASON_NO_SETUP.to_string()]);
    }

    #[test]
    fn trend_requires_strict_ordering() {
        let bars = plain_bars(100.0);
        let s = evaluate_signal(&bars, Some(100.0), Some(90.0), Some(35.0), Interval::H1);
        assert_eq!(s.signal_type, SignalType::Neutral);
        let s = evaluate_signal(&bars, Some(95.0), Some(95.0), Some(35.0), Interval::H1);
        assert_eq!(s.signal_type, SignalType::Neutral);
    }

    #[test]
    fn rsi_bounds_are_inclusive() {
        let bars = plain_bars(100.0);
        for rsi in [30.0, 45.0] {
            let s = evaluate_signal(&bars, Some(95.0), Some(90.0), Some(rsi), Interval::M5);
            assert_eq!(s.signal_type, SignalType::Buy, "rsi {rsi}");
        }
        let s = evaluate_signal(&bars, Some(95.0), Some(90.0), Some(45.1), Interval::M5);
        assert_eq!(s.signal_type, SignalType::Neutral);
    }

    #[test]
    fn projected_returns_are_leveraged_and_side_aware() {
        let bars = plain_bars(100.0);
        let buy = evaluate_signal(&bars, Some(95.0), Some(90.0), Some(35.0), Interval::M5);
        let r = buy.projected_returns(DEFAULT_LEVERAGE);
        assert!(approx(r.take_profit_1_pct, 8.0));
        assert!(approx(r.take_profit_3_pct, 18.0));
        assert!(approx(r.stop_loss_pct, -10.0));

        let sell = evaluate_signal(&bars, Some(105.0), Some(110.0), Some(60.0), Interval::M5);
        let r = sell.projected_returns(DEFAULT_LEVERAGE);
        assert!(approx(r.take_profit_2_pct, 12.0));
        assert!(approx(r.stop_loss_pct, -10.0));

        let none = ScalpSignal::insufficient_data().projected_returns(DEFAULT_LEVERAGE);
        assert_eq!(none.take_profit_1_pct, 0.0);
    }

    #[test]
    fn serialises_with_uppercase_labels() {
        let bars = plain_bars(100.0);
        let s = evaluate_signal(&bars, Some(95.0), Some(90.0), Some(35.0), Interval::M5);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["type"], "BUY");
        assert_eq!(json["strength"], "MODERATE");
    }
}
