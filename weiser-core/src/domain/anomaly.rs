// weiser-core/src/domain/anomaly.rs

// Median Absolute Deviation (MAD) anomaly analysis.
// M_i = 0.6745 * (x_i - Median(X)) / MAD — the robust z-score.
// 0.6745 is the 75th percentile of the standard normal distribution,
// to which the MAD converges. A pure function over a history slice
// fetched from the metric store; no I/O here.

/// Minimum number of observations before a z-score is meaningful.
pub const MIN_HISTORY: usize = 5;

/// 75th percentile of the standard normal distribution.
const MAD_SCALE: f64 = 0.6745;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assessment {
    /// Fewer than `MIN_HISTORY` points: not an anomaly, recorded as a
    /// success with z = 0 and a structured warning.
    InsufficientHistory { observations: usize },
    /// Modified z-score of the most recent value in the series.
    Scored { z_score: f64, observations: usize },
}

/// Assess the most recent value of a run_time-ascending series.
pub fn assess(series: &[f64]) -> Assessment {
    let n = series.len();
    if n < MIN_HISTORY {
        return Assessment::InsufficientHistory { observations: n };
    }

    let m = median(series);
    let deviations: Vec<f64> = series.iter().map(|x| (x - m).abs()).collect();
    let mad = median(&deviations);
    let last = series[n - 1];

    // MAD == 0 means a constant series: z is defined as 0 there
    // (last value equals the median, no dispersion to scale by).
    let z_score = if mad > 0.0 {
        MAD_SCALE * (last - m) / mad
    } else {
        0.0
    };

    Assessment::Scored {
        z_score,
        observations: n,
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
