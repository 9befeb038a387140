//! Feature computation for model inputs.
//!
//! Turns a timestamp and a smoothed history into the fixed-width vector the
//! target models consume: multi-scale windowed sums first, calendar
//! encodings after.
//!
//! **Critical for correctness**: positions are the model's input schema.
//! The shift/window enumeration order and every formula here must match what
//! the models were trained on, otherwise predictions are silently wrong.

use crate::{ForecastError, Result};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const HOUR_IN_MINUTES: usize = 60;
const DAY_IN_MINUTES: usize = 24 * HOUR_IN_MINUTES;
const WEEK_IN_MINUTES: usize = 7 * DAY_IN_MINUTES;

/// Default aggregation scales, in minutes.
pub const DEFAULT_SCALES: [usize; 13] = [
    3,
    5,
    7,
    10,
    15,
    20,
    HOUR_IN_MINUTES / 2,
    HOUR_IN_MINUTES,
    HOUR_IN_MINUTES * 2,
    DAY_IN_MINUTES,
    DAY_IN_MINUTES * 2,
    WEEK_IN_MINUTES,
    WEEK_IN_MINUTES * 2,
];

/// How the minute-cyclical pair is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinuteEncoding {
    /// `sin/cos(2π·minute / (24·60))`.
    #[default]
    DayPeriod,
    /// `sin/cos(2π·minute / 24 · 60)`, evaluated left to right.
    Legacy,
    /// `sin/cos(2π·(hour·60 + minute) / (24·60))`.
    MinuteOfDay,
}

impl MinuteEncoding {
    /// Angle in radians fed to sin/cos.
    pub fn angle(&self, hour: u32, minute: u32) -> f64 {
        let minute = minute as f64;
        match self {
            MinuteEncoding::DayPeriod => 2.0 * PI * minute / (24.0 * 60.0),
            MinuteEncoding::Legacy => 2.0 * PI * minute / 24.0 * 60.0,
            MinuteEncoding::MinuteOfDay => {
                2.0 * PI * (hour as f64 * 60.0 + minute) / (24.0 * 60.0)
            }
        }
    }
}

/// Configuration for feature extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Offsets (minutes) from the newest value to the end of each window
    pub shifts: Vec<usize>,

    /// Window widths (minutes)
    pub windows: Vec<usize>,

    /// Minute-cyclical encoding variant
    pub minute_encoding: MinuteEncoding,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            shifts: DEFAULT_SCALES.to_vec(),
            windows: DEFAULT_SCALES.to_vec(),
            minute_encoding: MinuteEncoding::default(),
        }
    }
}

/// One retained (shift, window) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSpec {
    pub shift: usize,
    pub window: usize,
}

impl WindowSpec {
    /// Slice bounds within a history of length `len`.
    ///
    /// Returns `None` when the history is shorter than `shift`.
    pub fn bounds(&self, len: usize) -> Option<(usize, usize)> {
        let start = len.checked_sub(self.shift)?;
        Some((start, start + self.window))
    }
}

/// Position-to-feature mapping derived from a [`FeatureConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
    pairs: Vec<WindowSpec>,
    max_shift: usize,
}

impl FeatureLayout {
    /// Weekday one-hot (7), hour sin/cos (2), minute of day (1), minute sin/cos (2).
    pub const CALENDAR_DIM: usize = 12;

    /// Build the layout, validating the scale lists.
    pub fn new(config: &FeatureConfig) -> Result<Self> {
        if config.shifts.is_empty() {
            return Err(ForecastError::Config(
                "at least one shift is required".to_string(),
            ));
        }
        if config.shifts.contains(&0) || config.windows.contains(&0) {
            return Err(ForecastError::Config(
                "shifts and windows must be positive".to_string(),
            ));
        }

        // Enumeration order is part of the model contract: never sort.
        let mut pairs = Vec::new();
        for &shift in &config.shifts {
            for &window in &config.windows {
                if window > shift {
                    continue;
                }
                pairs.push(WindowSpec { shift, window });
            }
        }

        let max_shift = config.shifts.iter().copied().max().unwrap_or(0);

        Ok(Self { pairs, max_shift })
    }

    /// Total feature vector length.
    pub fn len(&self) -> usize {
        self.pairs.len() + Self::CALENDAR_DIM
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minimum history length every record must have.
    pub fn max_shift(&self) -> usize {
        self.max_shift
    }

    /// Retained windowed-sum pairs, in output order.
    pub fn pairs(&self) -> &[WindowSpec] {
        &self.pairs
    }

    /// Name of every position, in output order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pairs
            .iter()
            .map(|p| format!("sum_s{}_w{}", p.shift, p.window))
            .collect();
        names.extend((0..7).map(|d| format!("weekday_{}", d)));
        names.extend(
            [
                "hour_sin",
                "hour_cos",
                "minute_of_day",
                "minute_sin",
                "minute_cos",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        names
    }
}

/// Sum of one shift/window span of a smoothed history.
///
/// # Arguments
/// * `history` - Smoothed values, ordered from oldest to newest
/// * `spec` - Shift and window; `window <= shift`
///
/// # Returns
/// Sum of `history[len - shift .. len - shift + window]`
pub fn compute_windowed_sum(history: &[f64], spec: WindowSpec) -> Result<f64> {
    let (start, end) = spec
        .bounds(history.len())
        .ok_or(ForecastError::InsufficientHistory {
            len: history.len(),
            required: spec.shift,
        })?;

    if spec.window > spec.shift {
        return Err(ForecastError::Config(format!(
            "window {} is wider than shift {}",
            spec.window, spec.shift
        )));
    }

    // Left-to-right; prefix sums would change rounding.
    Ok(history[start..end].iter().sum())
}

/// Compute calendar features for a timestamp.
///
/// Layout: weekday one-hot (Monday = 0), hour sin, hour cos, minute of day,
/// minute sin, minute cos.
pub fn compute_calendar_features(
    timestamp: &NaiveDateTime,
    encoding: MinuteEncoding,
) -> [f64; FeatureLayout::CALENDAR_DIM] {
    let mut features = [0.0; FeatureLayout::CALENDAR_DIM];

    features[timestamp.weekday().num_days_from_monday() as usize] = 1.0;

    let hour = timestamp.hour();
    let minute = timestamp.minute();

    let hour_angle = 2.0 * PI * hour as f64 / 24.0;
    features[7] = hour_angle.sin();
    features[8] = hour_angle.cos();
    features[9] = (hour * 60 + minute) as f64;

    let minute_angle = encoding.angle(hour, minute);
    features[10] = minute_angle.sin();
    features[11] = minute_angle.cos();

    features
}

/// Builds feature vectors with a fixed layout.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    layout: FeatureLayout,
    minute_encoding: MinuteEncoding,
}

impl FeatureExtractor {
    pub fn new(config: &FeatureConfig) -> Result<Self> {
        Ok(Self {
            layout: FeatureLayout::new(config)?,
            minute_encoding: config.minute_encoding,
        })
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// Extract the feature vector for one observation.
    pub fn extract(&self, timestamp: &NaiveDateTime, smoothed: &[f64]) -> Result<Vec<f64>> {
        let mut features = Vec::with_capacity(self.layout.len());
        self.extract_into(timestamp, smoothed, &mut features)?;
        Ok(features)
    }

    /// Append the feature vector for one observation to `out`.
    ///
    /// Nothing is appended when the history is too short.
    pub fn extract_into(
        &self,
        timestamp: &NaiveDateTime,
        smoothed: &[f64],
        out: &mut Vec<f64>,
    ) -> Result<()> {
        if smoothed.len() < self.layout.max_shift() {
            return Err(ForecastError::InsufficientHistory {
                len: smoothed.len(),
                required: self.layout.max_shift(),
            });
        }

        let start_len = out.len();
        out.reserve(self.layout.len());

        for &spec in self.layout.pairs() {
            out.push(compute_windowed_sum(smoothed, spec)?);
        }
        out.extend_from_slice(&compute_calendar_features(timestamp, self.minute_encoding));

        debug_assert_eq!(out.len() - start_len, self.layout.len());
        Ok(())
    }
}
