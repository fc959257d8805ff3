// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period` closes
// and placed at index `period - 1`.
// =============================================================================

/// Compute the EMA series for `closes` aligned with the input.
///
/// The output always has `closes.len()` elements; every index before the
/// seed (`period - 1`) is `None`. When the input is shorter than `period`
/// (or `period == 0`) every element is `None`.
///
/// A non-finite intermediate value stops the series: it and every later
/// element stay `None`.
pub fn compute_ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return result;
    }
    result[period - 1] = Some(sma);

    let mut prev_ema = sma;
    for (i, &close) in closes.iter().enumerate().skip(period) {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result[i] = Some(ema);
        prev_ema = ema;
    }

    result
}

/// Most recent EMA value, if the series reached the last input.
pub fn last_ema(closes: &[f64], period: usize) -> Option<f64> {
    compute_ema(closes, period).last().copied().flatten()
}
