//! Exponential smoothing of raw histories.
//!
//! The recurrence is strictly sequential: each output depends on the previous
//! output, so the series is folded left to right.

use crate::{ForecastError, Result};

/// Exponentially smooth a series.
///
/// `output[0] = history[0]` and
/// `output[n] = alpha * history[n] + (1 - alpha) * output[n - 1]`.
///
/// # Arguments
/// * `history` - Raw values, ordered from oldest to newest
/// * `alpha` - Weight of the newest value, within `[0, 1]`
///
/// # Returns
/// Smoothed series with the same length as `history`
pub fn smooth(history: &[f64], alpha: f64) -> Result<Vec<f64>> {
    validate_alpha(alpha)?;

    let (&first, rest) = history.split_first().ok_or(ForecastError::EmptyHistory)?;

    let mut result = Vec::with_capacity(history.len());
    result.push(first);

    let mut prev = first;
    for &value in rest {
        prev = alpha * value + (1.0 - alpha) * prev;
        result.push(prev);
    }

    Ok(result)
}

/// Check that `alpha` is a usable smoothing factor.
pub fn validate_alpha(alpha: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(ForecastError::Config(format!(
            "smoothing alpha must be within [0, 1], got {}",
            alpha
        )));
    }
    Ok(())
}
