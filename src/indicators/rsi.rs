// =============================================================================
// Relative Strength Index (RSI)
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1 — Take the last `period` deltas of consecutive closes.
// Step 2 — Average gain / average loss over exactly those deltas (losses are
//          taken as absolute values, the divisor is always `period`).
// Step 3 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// An average loss of zero yields RSI = 100, including a perfectly flat window.
// =============================================================================

/// Compute the RSI of the most recent `period` deltas in `closes`.
///
/// Returns `None` (insufficient data) when `period == 0` or when there are
/// fewer than `period + 1` closes.
pub fn compute_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let window = &closes[closes.len() - (period + 1)..];

    let (sum_gain, sum_loss) = window.windows(2).map(|w| w[1] - w[0]).fold(
        (0.0_f64, 0.0_f64),
        |(g, l), d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l + d.abs())
            }
        },
    );

    let period_f = period as f64;
    rsi_from_averages(sum_gain / period_f, sum_loss / period_f)
}

/// Human-readable zone for an RSI value.
pub fn rsi_zone(value: f64) -> &'static str {
    if value >= 70.0 {
        "OVERBOUGHT"
    } else if value <= 30.0 {
        "OVERSOLD"
    } else {
        "NEUTRAL"
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// Returns `None` when the result is non-finite (NaN closes).
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    if rsi.is_finite() {
        Some(rsi.clamp(0.0, 100.0))
    } else {
        None
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_input() {
        assert!(compute_rsi(&[], 14).is_none());
    }

    #[test]
    fn rsi_period_zero() {
        assert!(compute_rsi(&[1.0, 2.0, 3.0], 0).is_none());
    }

    #[test]
    fn rsi_insufficient_data() {
        // 14 closes => 13 deltas < 14.
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert!(compute_rsi(&closes, 14).is_none());
        // 15 closes is exactly enough.
        let closes: Vec<f64> = (1..=15).map(|x| x as f64).collect();
        assert!(compute_rsi(&closes, 14).is_some());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let v = compute_rsi(&closes, 14).unwrap();
        assert!((v - 100.0).abs() < 1e-10, "expected 100.0, got {v}");
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let v = compute_rsi(&closes, 14).unwrap();
        assert!(v.abs() < 1e-10, "expected 0.0, got {v}");
    }

    #[test]
    fn rsi_flat_window_has_zero_loss() {
        let closes = vec![100.0; 30];
        assert_eq!(compute_rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn rsi_only_uses_last_period_deltas() {
        // An early crash outside the window must not influence the value.
        let mut closes = vec![100.0, 10.0];
        closes.extend((1..=15).map(|x| 10.0 + x as f64));
        assert_eq!(compute_rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn rsi_known_value() {
        // Two gains of 2 and two losses of 1 over 4 deltas:
        // avg_gain = 1.0, avg_loss = 0.5, RS = 2, RSI = 66.67
        let closes = [10.0, 12.0, 11.0, 13.0, 12.0];
        let v = compute_rsi(&closes, 4).unwrap();
        assert!((v - 200.0 / 3.0).abs() < 1e-9, "got {v}");
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        for period in 1..closes.len() {
            let v = compute_rsi(&closes, period).unwrap();
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }

    #[test]
    fn rsi_nan_input_is_none() {
        let closes = [1.0, 2.0, f64::NAN, 3.0];
        assert!(compute_rsi(&closes, 3).is_none());
    }

    #[test]
    fn zone_labels() {
        assert_eq!(rsi_zone(75.0), "OVERBOUGHT");
        assert_eq!(rsi_zone(25.0), "OVERSOLD");
        assert_eq!(rsi_zone(50.0), "NEUTRAL");
    }
}
