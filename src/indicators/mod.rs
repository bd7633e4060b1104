// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions. Every series is recomputed from
// the full set of bars on each call; nothing is carried between calls, so the
// same bars always produce bit-identical output.
//
// The `calculate_*` functions work on raw closes and return values aligned
// 1:1 with the input (`None` = not enough history). The `compute_*` wrappers
// attach each bar's time.

pub mod ema;
pub mod rsi;
pub mod sma;

use serde::Serialize;

use crate::market_data::Kline;

pub use ema::calculate_ema;
pub use rsi::{calculate_rsi, rsi_zone};
pub use sma::calculate_sma;

/// Periods the signal engine reads.
pub const EMA_FAST_PERIOD: usize = 20;
pub const EMA_SLOW_PERIOD: usize = 50;
pub const RSI_PERIOD: usize = 14;

/// One indicator value, aligned with the bar at `time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorPoint {
    pub time: i64,
    pub value: Option<f64>,
}

fn closes(bars: &[Kline]) -> Vec<f64> {
    bars.iter().map(|k| k.close).collect()
}

fn align(bars: &[Kline], values: Vec<Option<f64>>) -> Vec<IndicatorPoint> {
    bars.iter()
        .zip(values)
        .map(|(k, value)| IndicatorPoint {
            time: k.time,
            value,
        })
        .collect()
}

pub fn compute_sma(bars: &[Kline], period: usize) -> Vec<IndicatorPoint> {
    align(bars, calculate_sma(&closes(bars), period))
}

pub fn compute_ema(bars: &[Kline], period: usize) -> Vec<IndicatorPoint> {
    align(bars, calculate_ema(&closes(bars), period))
}

pub fn compute_rsi(bars: &[Kline], period: usize) -> Vec<IndicatorPoint> {
    align(bars, calculate_rsi(&closes(bars), period))
}

/// Value at the last bar, if defined.
pub fn latest(points: &[IndicatorPoint]) -> Option<f64> {
    points.last().and_then(|p| p.value)
}

/// Everything a chart shows and the signal engine reads, for one series.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndicatorSet {
    pub ema_fast: Vec<IndicatorPoint>,
    pub ema_slow: Vec<IndicatorPoint>,
    pub rsi: Vec<IndicatorPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma: Option<Vec<IndicatorPoint>>,
}

impl IndicatorSet {
    /// Recompute EMA20, EMA50, RSI14 and, when `sma_period` is set, an SMA.
    pub fn compute(bars: &[Kline], sma_period: Option<usize>) -> Self {
        let closes = closes(bars);
        Self {
            ema_fast: align(bars, calculate_ema(&closes, EMA_FAST_PERIOD)),
            ema_slow: align(bars, calculate_ema(&closes, EMA_SLOW_PERIOD)),
            rsi: align(bars, calculate_rsi(&closes, RSI_PERIOD)),
            sma: sma_period.map(|p| align(bars, calculate_sma(&closes, p))),
        }
    }

    pub fn latest_ema_fast(&self) -> Option<f64> {
        latest(&self.ema_fast)
    }

    pub fn latest_ema_slow(&self) -> Option<f64> {
        latest(&self.ema_slow)
    }

    pub fn latest_rsi(&self) -> Option<f64> {
        latest(&self.rsi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<Kline> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Kline {
                time: i as i64,
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn compute_sma_attaches_times() {
        let points = compute_sma(&bars(&[10.0, 11.0, 9.0, 12.0]), 2);
        let times: Vec<i64> = points.iter().map(|p| p.time).collect();
        let values: Vec<Option<f64>> = points.iter().map(|p| p.value).collect();
        assert_eq!(times, vec![0, 1, 2, 3]);
        assert_eq!(values, vec![None, Some(10.5), Some(10.0), Some(10.5)]);
    }

    #[test]
    fn set_is_aligned_with_series() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let b = bars(&closes);
        let set = IndicatorSet::compute(&b, Some(9));
        assert_eq!(set.ema_fast.len(), b.len());
        assert_eq!(set.ema_slow.len(), b.len());
        assert_eq!(set.rsi.len(), b.len());
        assert_eq!(set.sma.as_ref().map(Vec::len), Some(b.len()));
        assert!(set.latest_ema_fast().is_some());
        assert!(set.latest_ema_slow().is_some());
        assert!(set.latest_rsi().is_some());
    }

    #[test]
    fn short_series_has_no_latest_values() {
        let set = IndicatorSet::compute(&bars(&[1.0; 30]), None);
        assert!(set.latest_ema_fast().is_some());
        assert!(set.latest_ema_slow().is_none());
        assert!(set.sma.is_none());
    }

    #[test]
    fn recompute_is_deterministic() {
        let closes: Vec<f64> = (0..300).map(|i| 50.0 + (i as f64 * 0.17).cos() * 3.0).collect();
        let b = bars(&closes);
        let a = IndicatorSet::compute(&b, Some(20));
        let c = IndicatorSet::compute(&b, Some(20));
        assert_eq!(a.ema_fast, c.ema_fast);
        assert_eq!(a.ema_slow, c.ema_slow);
        assert_eq!(a.rsi, c.rsi);
        assert_eq!(a.sma, c.sma);
    }
}
