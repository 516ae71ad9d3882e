//! Latency smoothing ("peak cut") for ping charts.
//!
//! Each output point past the warm-up is estimated from the trailing window
//! of raw values: median, robust spread (MAD x 1.4826), outlier rejection,
//! then an EMA over the survivors. That estimate is blended into an EMA
//! carried across the whole series, one carried state per series key.
//!
//! The first smoothed point (index `window_size - 1`) seeds the carried
//! state and is emitted smoothed.

use crate::latency::ChartPoint;
use std::collections::HashMap;

/// Normal-consistent scale factor for the median absolute deviation
pub const MAD_SCALE: f64 = 1.4826;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    pub window_size: usize,
    pub alpha: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self { window_size: 11, alpha: 0.3 }
    }
}

/// Median of `values`; mean of the two middle values for even lengths
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Point estimate for one window of raw values
pub fn robust_estimate(values: &[f64], alpha: f64) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    let spread = median(&deviations)? * MAD_SCALE;

    // a value is dropped only when it fails both tests
    let kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| !((v - center).abs() > 3.0 * spread && *v > 3.0 * center))
        .collect();

    let Some((first, rest)) = kept.split_first() else {
        return Some(center);
    };
    Some(rest.iter().fold(*first, |ema, v| alpha * v + (1.0 - alpha) * ema))
}

/// Smooth the given keys of a time-ordered chart series.
///
/// Points before the warm-up pass through unchanged, as does every field
/// other than the smoothed keys. Missing and non-finite values are skipped.
pub fn smooth(points: &[ChartPoint], keys: &[String], params: SmoothingParams) -> Vec<ChartPoint> {
    let window = params.window_size.max(1);
    if points.len() < window {
        return points.to_vec();
    }

    let alpha = params.alpha;
    let mut carried: HashMap<&str, f64> = HashMap::new();

    points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            if index + 1 < window {
                return point.clone();
            }
            let frame = &points[index + 1 - window..=index];
            let mut smoothed = point.clone();

            for key in keys {
                let values: Vec<f64> = frame
                    .iter()
                    .filter_map(|p| p.values.get(key).copied())
                    .filter(|v| v.is_finite())
                    .collect();
                let Some(estimate) = robust_estimate(&values, alpha) else {
                    continue;
                };
                let next = match carried.get(key.as_str()) {
                    Some(prev) => alpha * estimate + (1.0 - alpha) * prev,
                    None => estimate,
                };
                carried.insert(key.as_str(), next);
                smoothed.values.insert(key.clone(), next);
            }
            smoothed
        })
        .collect()
}

/// `smooth` over a bare value sequence, one series
pub fn smooth_values(values: &[f64], params: SmoothingParams) -> Vec<f64> {
    const KEY: &str = "v";
    let points: Vec<ChartPoint> = values
        .iter()
        .enumerate()
        .map(|(i, v)| ChartPoint::single(i as i64, KEY, *v))
        .collect();
    smooth(&points, &[KEY.to_string()], params)
        .iter()
        .map(|p| p.values.get(KEY).copied().unwrap_or_default())
        .collect()
}
