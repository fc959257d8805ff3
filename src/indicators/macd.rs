// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   MACD line   = EMA(12) - EMA(26)
//   Signal line = EMA(9) of the MACD line
//   Histogram   = MACD line - Signal line
//
// The full MACD line starts at the first bar after the EMA(26) seed, so a
// series of n closes yields n - 26 MACD samples and n - 34 signal samples.
// 35 closes is the minimum that produces one histogram value.
// =============================================================================

use super::ema::{compute_ema, last_ema};

pub const FAST_PERIOD: usize = 12;
pub const SLOW_PERIOD: usize = 26;
pub const SIGNAL_PERIOD: usize = 9;

/// Minimum closes for the scalar MACD value.
pub const MIN_MACD_POINTS: usize = SLOW_PERIOD;
/// Minimum closes for MACD + signal + histogram.
pub const MIN_FULL_MACD_POINTS: usize = SLOW_PERIOD + SIGNAL_PERIOD;

/// Default look-back used by [`detect_bullish_crossover`].
pub const DEFAULT_CROSSOVER_LOOKBACK: usize = 5;

/// Margin (as a fraction of |signal|) above which MACD counts as a bullish
/// cross even without a discrete crossing point in the look-back.
const STRENGTH_OVERRIDE: f64 = 0.05;

/// MACD, signal and histogram series for one close series.
#[derive(Debug, Clone, PartialEq)]
pub struct FullMacd {
    /// Every MACD sample (`n - 26` values, oldest first).
    pub macd_line: Vec<f64>,
    /// Signal samples, aligned with the tail of `macd_line`.
    pub signal_line: Vec<f64>,
    /// `macd - signal` over the aligned tail.
    pub histogram: Vec<f64>,
}

impl FullMacd {
    /// The MACD samples that have a matching signal sample.
    pub fn paired_macd(&self) -> &[f64] {
        &self.macd_line[self.macd_line.len() - self.signal_line.len()..]
    }

    /// Last two MACD samples, `[previous, latest]`.
    #[cfg(test)]
    pub fn last_two_macd(&self) -> Option<[f64; 2]> {
        last_two(&self.macd_line)
    }

    /// Last two signal samples, `[previous, latest]`.
    #[cfg(test)]
    pub fn last_two_signal(&self) -> Option<[f64; 2]> {
        last_two(&self.signal_line)
    }

    /// Last two histogram samples, `[previous, latest]`.
    #[cfg(test)]
    pub fn last_two_histogram(&self) -> Option<[f64; 2]> {
        last_two(&self.histogram)
    }

    /// Run [`detect_bullish_crossover`] over the aligned pairs.
    pub fn bullish_crossover(&self, lookback: usize) -> bool {
        detect_bullish_crossover(self.paired_macd(), &self.signal_line, lookback)
    }
}

/// Latest `EMA(12) - EMA(26)`. Needs at least 26 closes.
pub fn compute_macd(closes: &[f64]) -> Option<f64> {
    if closes.len() < MIN_MACD_POINTS {
        return None;
    }
    let fast = last_ema(closes, FAST_PERIOD)?;
    let slow = last_ema(closes, SLOW_PERIOD)?;
    let macd = fast - slow;
    macd.is_finite().then_some(macd)
}

/// MACD line, signal line and histogram. Needs at least 35 closes.
pub fn compute_full_macd(closes: &[f64]) -> Option<FullMacd> {
    if closes.len() < MIN_FULL_MACD_POINTS {
        return None;
    }

    let fast = compute_ema(closes, FAST_PERIOD);
    let slow = compute_ema(closes, SLOW_PERIOD);

    let macd_line = (SLOW_PERIOD..closes.len())
        .map(|i| Some(fast[i]? - slow[i]?))
        .collect::<Option<Vec<f64>>>()?;

    let signal_line = compute_ema(&macd_line, SIGNAL_PERIOD)
        .into_iter()
        .skip(SIGNAL_PERIOD - 1)
        .collect::<Option<Vec<f64>>>()?;

    let offset = macd_line.len() - signal_line.len();
    let histogram = macd_line[offset..]
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    Some(FullMacd {
        macd_line,
        signal_line,
        histogram,
    })
}

/// Heuristic bullish-crossover check over tail-aligned MACD / signal samples.
///
/// This is not a strict crossover detector. It returns `true` only when the
/// latest MACD is above the latest signal and either
///
/// - some adjacent pair inside the last `lookback` samples goes from
///   `macd <= signal` to `macd > signal`, or
/// - the latest MACD exceeds the signal by more than 5% of `|signal|`.
///
/// Ambiguous cases resolve towards `true`: a false positive is preferred over
/// a missed entry.
pub fn detect_bullish_crossover(macd: &[f64], signal: &[f64], lookback: usize) -> bool {
    let n = macd.len().min(signal.len());
    if n == 0 {
        return false;
    }
    let macd = &macd[macd.len() - n..];
    let signal = &signal[signal.len() - n..];

    let (m_last, s_last) = (macd[n - 1], signal[n - 1]);
    if !(m_last > s_last) {
        return false;
    }

    let start = n.saturating_sub(lookback);
    let crossed = (start..n - 1).any(|i| macd[i] <= signal[i] && macd[i + 1] > signal[i + 1]);

    crossed || m_last - s_last > STRENGTH_OVERRIDE * s_last.abs()
}

#[cfg(test)]
fn last_two(series: &[f64]) -> Option<[f64; 2]> {
    match series {
        [.., prev, last] => Some([*prev, *last]),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| 100.0 + i as f64).collect()
    }

    // ---- compute_macd ----------------------------------------------------

    #[test]
    fn macd_needs_26_points() {
        assert!(compute_macd(&ascending(25)).is_none());
        assert!(compute_macd(&ascending(26)).is_some());
    }

    #[test]
    fn macd_positive_in_uptrend() {
        assert!(compute_macd(&ascending(60)).unwrap() > 0.0);
    }

    #[test]
    fn macd_negative_in_downtrend() {
        let closes: Vec<f64> = ascending(60).into_iter().rev().collect();
        assert!(compute_macd(&closes).unwrap() < 0.0);
    }

    #[test]
    fn macd_matches_ema_difference() {
        let closes = ascending(40);
        let expected = last_ema(&closes, 12).unwrap() - last_ema(&closes, 26).unwrap();
        assert!((compute_macd(&closes).unwrap() - expected).abs() < 1e-12);
    }

    // ---- compute_full_macd -----------------------------------------------

    #[test]
    fn full_macd_needs_35_points() {
        assert!(compute_full_macd(&ascending(34)).is_none());
        assert!(compute_full_macd(&ascending(35)).is_some());
    }

    #[test]
    fn full_macd_with_35_points_has_one_histogram_value() {
        let full = compute_full_macd(&ascending(35)).unwrap();
        assert_eq!(full.macd_line.len(), 9);
        assert_eq!(full.signal_line.len(), 1);
        assert_eq!(full.histogram.len(), 1);
        assert!(full.last_two_signal().is_none());
        assert_eq!(full.last_two_macd().unwrap()[1], *full.macd_line.last().unwrap());
    }

    #[test]
    fn full_macd_lengths_scale_with_input() {
        let full = compute_full_macd(&ascending(100)).unwrap();
        assert_eq!(full.macd_line.len(), 74);
        assert_eq!(full.signal_line.len(), 66);
        assert_eq!(full.histogram.len(), 66);
        assert_eq!(full.paired_macd().len(), 66);
    }

    #[test]
    fn full_macd_histogram_is_macd_minus_signal() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let full = compute_full_macd(&closes).unwrap();
        let [_, h] = full.last_two_histogram().unwrap();
        let [_, m] = full.last_two_macd().unwrap();
        let [_, s] = full.last_two_signal().unwrap();
        assert!((h - (m - s)).abs() < 1e-12);
    }

    #[test]
    fn full_macd_signal_seed_is_average_of_first_nine() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.7).cos() * 3.0).collect();
        let full = compute_full_macd(&closes).unwrap();
        let seed: f64 = full.macd_line[..9].iter().sum::<f64>() / 9.0;
        assert!((full.signal_line[0] - seed).abs() < 1e-12);
    }

    // ---- detect_bullish_crossover ----------------------------------------

    #[test]
    fn crossover_inside_lookback_is_detected() {
        let macd = [1.0, 1.0, 1.0, 0.9, 1.02];
        let signal = [1.0, 1.0, 1.0, 1.0, 1.0];
        assert!(detect_bullish_crossover(&macd, &signal, 5));
    }

    #[test]
    fn crossover_at_start_of_window_is_detected() {
        // Cross between index 2 and 3 with lookback 4 over 6 samples.
        let macd = [0.5, 0.5, 0.9, 1.01, 1.02, 1.03];
        let signal = [1.0; 6];
        assert!(detect_bullish_crossover(&macd, &signal, 4));
    }

    #[test]
    fn macd_strictly_below_is_false() {
        let macd = [0.1, 0.2, 0.3, 0.4, 0.5];
        let signal = [1.0, 1.0, 1.0, 1.0, 1.0];
        assert!(!detect_bullish_crossover(&macd, &signal, 5));
    }

    #[test]
    fn crossing_then_falling_back_is_false() {
        let macd = [0.9, 1.1, 1.2, 1.1, 0.95];
        let signal = [1.0; 5];
        assert!(!detect_bullish_crossover(&macd, &signal, 5));
    }

    #[test]
    fn stale_cross_with_small_margin_is_false() {
        // Crossed long before the window, now only 1% above.
        let macd = [0.5, 1.01, 1.01, 1.01, 1.01, 1.01, 1.01, 1.01];
        let signal = [1.0; 8];
        assert!(!detect_bullish_crossover(&macd, &signal, 5));
    }

    #[test]
    fn strength_override_without_crossing() {
        let macd = [1.2, 1.2, 1.2, 1.2, 1.2, 1.2, 1.2];
        let signal = [1.0; 7];
        assert!(detect_bullish_crossover(&macd, &signal, 5));
    }

    #[test]
    fn strength_override_with_negative_signal() {
        // -0.9 vs -1.0 is 10% of |signal| above.
        let macd = [-0.9; 6];
        let signal = [-1.0; 6];
        assert!(detect_bullish_crossover(&macd, &signal, 5));
    }

    #[test]
    fn equal_values_are_not_above() {
        let macd = [0.9, 1.0];
        let signal = [1.0, 1.0];
        assert!(!detect_bullish_crossover(&macd, &signal, 5));
    }

    #[test]
    fn empty_input_is_false() {
        assert!(!detect_bullish_crossover(&[], &[], 5));
    }

    #[test]
    fn full_macd_on_v_shape_turns_bullish() {
        // Long decline then a sharp rally pushes MACD above its signal.
        let mut closes: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        closes.extend((1..=8).map(|i| 140.0 + 4.0 * i as f64));
        let full = compute_full_macd(&closes).unwrap();
        assert!(full.bullish_crossover(DEFAULT_CROSSOVER_LOOKBACK));
    }
}
