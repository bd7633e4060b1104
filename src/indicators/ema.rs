// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (close_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//
// The first EMA value, at index `period - 1`, is the SMA of the first
// `period` closes.
// =============================================================================

use super::sma::window_mean;

/// Compute the EMA series aligned 1:1 with `closes`.
///
/// # Edge cases
/// - `period == 0` => every entry `None`
/// - `closes.len() < period` => every entry `None`
/// - From index `period - 1` onward every entry is `Some`.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let seed_idx = period - 1;
    let mut ema = window_mean(closes, seed_idx, period);
    result[seed_idx] = Some(ema);

    for i in period..closes.len() {
        ema = (closes[i] - ema) * multiplier + ema;
        result[i] = Some(ema);
    }

    result
}
