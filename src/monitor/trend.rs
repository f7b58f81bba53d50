//! Heap growth-trend analysis over a rolling sample window.
//!
//! A least-squares line is fitted through (elapsed seconds, heap bytes)
//! samples. Sustained positive slope with a good fit is reported as a leak
//! signal, independent of the tracker's handle-based leak detection.

use serde::{Deserialize, Serialize};

/// Result of a least-squares fit over memory samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryTrend {
    /// Fitted heap growth rate in bytes per second
    pub slope_bytes_per_sec: f64,
    /// Fitted heap size at the window origin
    pub intercept_bytes: f64,
    /// Goodness of fit in [0, 1]
    pub r_squared: f64,
    /// Number of samples behind the fit
    pub samples: usize,
}

impl MemoryTrend {
    /// Whether this trend is a leak signal: growth above `rate_threshold`
    /// bytes/second with at least `min_confidence` fit.
    pub fn is_leak_signal(&self, rate_threshold: f64, min_confidence: f64) -> bool {
        self.slope_bytes_per_sec > rate_threshold && self.r_squared >= min_confidence
    }
}

/// Fit a line through `(seconds, bytes)` points.
///
/// Returns `None` with fewer than two points or when all points share one
/// x value (no time elapsed to fit against).
pub fn analyze(points: &[(f64, f64)]) -> Option<MemoryTrend> {
    let n = points.len();
    if n < 2 {
        return None;
    }

    let nf = n as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / nf;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / nf;

    let mut ss_xx = 0.0;
    let mut ss_xy = 0.0;
    let mut ss_yy = 0.0;
    for (x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        ss_xx += dx * dx;
        ss_xy += dx * dy;
        ss_yy += dy * dy;
    }

    if ss_xx == 0.0 {
        return None;
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;

    // A flat series fits perfectly but carries no growth information
    let r_squared = if ss_yy == 0.0 {
        0.0
    } else {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    };

    Some(MemoryTrend {
        slope_bytes_per_sec: slope,
        intercept_bytes: intercept,
        r_squared,
        samples: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_few_points() {
        assert!(analyze(&[]).is_none());
        assert!(analyze(&[(0.0, 100.0)]).is_none());
    }

    #[test]
    fn test_degenerate_x() {
        assert!(analyze(&[(1.0, 10.0), (1.0, 20.0)]).is_none());
    }

    #[test]
    fn test_perfect_linear_growth() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 1000.0 * i as f64)).collect();
        let trend = analyze(&points).unwrap();

        assert!((trend.slope_bytes_per_sec - 1000.0).abs() < 1e-6);
        assert!((trend.r_squared - 1.0).abs() < 1e-9);
        assert!(trend.is_leak_signal(500.0, 0.9));
    }

    #[test]
    fn test_flat_series_is_not_a_signal() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 4096.0)).collect();
        let trend = analyze(&points).unwrap();

        assert_eq!(trend.slope_bytes_per_sec, 0.0);
        assert_eq!(trend.r_squared, 0.0);
        assert!(!trend.is_leak_signal(1.0, 0.5));
    }

    #[test]
    fn test_shrinking_heap_is_not_a_signal() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 10_000.0 - 500.0 * i as f64)).collect();
        let trend = analyze(&points).unwrap();

        assert!(trend.slope_bytes_per_sec < 0.0);
        assert!(!trend.is_leak_signal(1.0, 0.5));
    }

    #[test]
    fn test_noisy_growth_confidence() {
        // Strong growth with small noise keeps a high fit
        let points: Vec<(f64, f64)> = (0..20)
            .map(|i| {
                let noise = if i % 2 == 0 { 50.0 } else { -50.0 };
                (i as f64, 10_000.0 * i as f64 + noise)
            })
            .collect();
        let trend = analyze(&points).unwrap();

        assert!(trend.slope_bytes_per_sec > 9_000.0);
        assert!(trend.r_squared > 0.99);
    }
}
