// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
//   SMA_i = (close_{i-period+1} + … + close_i) / period      for i >= period-1
//
// Each window is summed from scratch, oldest close first, so every defined
// value is the plain float mean of its window and does not depend on earlier
// windows.
// =============================================================================

/// Mean of `closes[end + 1 - period ..= end]`.
///
/// Shared with the EMA seed so both produce bit-identical values.
pub(crate) fn window_mean(closes: &[f64], end: usize, period: usize) -> f64 {
    let window = &closes[end + 1 - period..=end];
    window.iter().sum::<f64>() / period as f64
}

/// SMA aligned 1:1 with `closes`; `None` where fewer than `period` closes are
/// available and everywhere when `period == 0`.
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; closes.len()];
    }

    (0..closes.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                Some(window_mean(closes, i, period))
            }
        })
        .collect()
}
