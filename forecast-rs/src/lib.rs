//! Batch multi-target forecasting over smoothed minute histories.
//!
//! Each input record carries a timestamp and a raw history. The history is
//! exponentially smoothed, turned into a fixed-width feature vector, and the
//! whole batch is scored once per target model.
//!
//! **Critical for correctness**: the feature layout is the input contract of
//! the pretrained models. Positions and formulas must not drift from what the
//! models were trained on.

pub mod batch;
pub mod config;
pub mod features;
pub mod predictor;
pub mod record;
pub mod smoothing;

pub use batch::{BatchForecaster, FeatureBatch, Forecast, RunSummary};
pub use config::{ForecastConfig, RecordPolicy, SmoothingConfig};
pub use features::{FeatureConfig, FeatureExtractor, FeatureLayout, MinuteEncoding, WindowSpec};
pub use predictor::{ModelBundle, OnnxPredictor, Predictor};
pub use record::Observation;
pub use smoothing::smooth;

use std::path::PathBuf;
use thiserror::Error;

/// Library-wide error type.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("failed to load model bundle {}: {message}", .path.display())]
    ModelLoad { path: PathBuf, message: String },

    #[error("malformed record at line {line}: {message} (record: {record:?})")]
    Parse {
        line: usize,
        record: String,
        message: String,
    },

    #[error("history is empty")]
    EmptyHistory,

    #[error("insufficient history: has {len} values, need at least {required}")]
    InsufficientHistory { len: usize, required: usize },

    #[error("record at line {line}: {cause}")]
    Record {
        line: usize,
        cause: Box<ForecastError>,
    },

    #[error("prediction failed for target {target}: {cause:#}")]
    Prediction { target: String, cause: anyhow::Error },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("feature matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl ForecastError {
    /// True for errors scoped to a single input record.
    ///
    /// These are the errors the skip policy may drop; everything else aborts.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            ForecastError::Parse { .. }
                | ForecastError::EmptyHistory
                | ForecastError::InsufficientHistory { .. }
                | ForecastError::Record { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
