//! Trend factors from a metric's recent time series.

/// Fewer points than this yield a zero trend.
pub const MIN_TREND_SAMPLES: usize = 3;

/// Least-squares slope per minute divided by the series mean.
///
/// Points are `(timestamp_secs, value)`. The result is the fractional
/// change per minute (`0.1` means rising 10% of the mean each minute),
/// clamped to `[-1, 1]`. Returns 0 with too few points, a zero time span,
/// or a mean of zero.
pub fn trend_factor(points: &[(u64, f64)]) -> f64 {
    if points.len() < MIN_TREND_SAMPLES {
        return 0.0;
    }

    let n = points.len() as f64;
    let base = points[0].0 as f64;
    let xs = points.iter().map(|(t, _)| (*t as f64 - base) / 60.0);

    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for (x, (_, y)) in xs.zip(points) {
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denom = n * sum_xx - sum_x * sum_x;
    let mean = sum_y / n;
    if denom.abs() < f64::EPSILON || mean.abs() < f64::EPSILON {
        return 0.0;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    (slope / mean).clamp(-1.0, 1.0)
}
