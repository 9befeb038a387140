//! Accumulate-then-predict batch orchestration.
//!
//! Records are read in arrival order and turned into feature vectors held in
//! one flat buffer. Once input is exhausted every target model scores the
//! whole matrix in a single call and rows are written in input order.

use crate::config::{ForecastConfig, RecordPolicy};
use crate::features::FeatureExtractor;
use crate::predictor::ModelBundle;
use crate::record::parse_record;
use crate::smoothing::{smooth, validate_alpha};
use crate::{ForecastError, Result};
use ndarray::ArrayView2;
use rayon::prelude::*;
use std::io::{BufRead, Write};
use tracing::{debug, info, warn};

/// Feature vectors and their timestamps, in arrival order.
///
/// The matrix is stored row-major in one buffer so the whole batch can be
/// handed to a predictor as a view without copying.
#[derive(Debug, Clone)]
pub struct FeatureBatch {
    /// Timestamp text of each row, echoed verbatim
    timestamps: Vec<String>,

    /// Row-major feature values
    values: Vec<f64>,

    /// Width of every row
    num_features: usize,
}

impl FeatureBatch {
    pub fn new(num_features: usize) -> Self {
        Self {
            timestamps: Vec::new(),
            values: Vec::new(),
            num_features,
        }
    }

    /// Append one row.
    pub fn push(&mut self, timestamp: String, features: &[f64]) -> Result<()> {
        if features.len() != self.num_features {
            return Err(ForecastError::Config(format!(
                "feature vector has {} values, layout expects {}",
                features.len(),
                self.num_features
            )));
        }
        self.timestamps.push(timestamp);
        self.values.extend_from_slice(features);
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn timestamps(&self) -> &[String] {
        &self.timestamps
    }

    /// View the batch as an N x L matrix.
    pub fn matrix(&self) -> Result<ArrayView2<'_, f64>> {
        Ok(ArrayView2::from_shape(
            (self.len(), self.num_features),
            &self.values,
        )?)
    }
}

/// Predictions for every row and target.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// Target names, ascending
    pub targets: Vec<String>,

    /// Row timestamps, in input order
    pub timestamps: Vec<String>,

    /// One column per target, index-aligned with `timestamps`
    pub columns: Vec<Vec<f64>>,
}

impl Forecast {
    pub fn header(&self) -> String {
        std::iter::once("datetime".to_string())
            .chain(self.targets.iter().map(|t| format!("target_{}", t)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Write the header and one line per row.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{}", self.header())?;
        for (i, timestamp) in self.timestamps.iter().enumerate() {
            write!(writer, "{}", timestamp)?;
            for column in &self.columns {
                write!(writer, ",{}", format_value(column[i]))?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Shortest round-trip text that always shows a fraction or exponent.
pub fn format_value(value: f64) -> String {
    format!("{:?}", value)
}

/// Outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows written, excluding the header
    pub rows: usize,

    /// Records dropped by the skip policy
    pub skipped: usize,

    /// Number of target columns
    pub targets: usize,
}

/// Turns a record stream into a forecast table using a fixed model bundle.
#[derive(Debug)]
pub struct BatchForecaster<'a> {
    bundle: &'a ModelBundle,
    extractor: FeatureExtractor,
    alpha: f64,
    policy: RecordPolicy,
}

impl<'a> BatchForecaster<'a> {
    /// Validate the configuration against the bundle.
    ///
    /// Fails before any input is read if the bundle is empty or a model
    /// declares a feature width different from the configured layout.
    pub fn new(bundle: &'a ModelBundle, config: &ForecastConfig) -> Result<Self> {
        validate_alpha(config.smoothing.alpha)?;
        let extractor = FeatureExtractor::new(&config.features)?;

        if bundle.is_empty() {
            return Err(ForecastError::Config(
                "model bundle has no targets".to_string(),
            ));
        }

        let width = extractor.layout().len();
        for (target, model) in bundle.iter() {
            if let Some(expected) = model.num_features() {
                if expected != width {
                    return Err(ForecastError::Config(format!(
                        "model for target {} expects {} features, layout produces {}",
                        target, expected, width
                    )));
                }
            }
        }

        Ok(Self {
            bundle,
            extractor,
            alpha: config.smoothing.alpha,
            policy: config.records.policy,
        })
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Read all records, returning the batch and the number skipped.
    ///
    /// The first line is discarded unconditionally.
    pub fn accumulate<R: BufRead>(&self, reader: R) -> Result<(FeatureBatch, usize)> {
        let mut batch = FeatureBatch::new(self.extractor.layout().len());
        let mut skipped = 0;
        let mut scratch = Vec::with_capacity(batch.num_features());

        for (idx, line) in reader.lines().enumerate().skip(1) {
            let line = line?;
            let line_no = idx + 1;
            let raw = line.strip_suffix('\r').unwrap_or(&line);

            scratch.clear();
            match self.featurize(line_no, raw, &mut scratch) {
                Ok(timestamp) => batch.push(timestamp, &scratch)?,
                Err(e) if self.policy == RecordPolicy::Skip && e.is_record_error() => {
                    warn!(line = line_no, error = %e, "skipping record");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        debug!(rows = batch.len(), skipped, "accumulated feature batch");
        Ok((batch, skipped))
    }

    /// Parse, smooth and extract one record into `out`.
    fn featurize(&self, line_no: usize, raw: &str, out: &mut Vec<f64>) -> Result<String> {
        let obs = parse_record(line_no, raw)?;

        let record_err = |cause: ForecastError| ForecastError::Record {
            line: line_no,
            cause: Box::new(cause),
        };

        let smoothed = smooth(&obs.history_f64(), self.alpha).map_err(record_err)?;
        self.extractor
            .extract_into(&obs.timestamp, &smoothed, out)
            .map_err(record_err)?;

        Ok(obs.raw_timestamp)
    }

    /// Score the whole batch with every target model.
    ///
    /// Each predictor is called exactly once with the full matrix. Targets
    /// run in parallel; columns come back in ascending target order.
    pub fn predict(&self, batch: &FeatureBatch) -> Result<Forecast> {
        let targets: Vec<String> = self.bundle.targets().map(str::to_string).collect();

        if batch.is_empty() {
            warn!("no records to predict");
            return Ok(Forecast {
                targets,
                timestamps: Vec::new(),
                columns: vec![Vec::new(); self.bundle.len()],
            });
        }

        let matrix = batch.matrix()?;
        let models: Vec<_> = self.bundle.iter().collect();

        let columns = models
            .par_iter()
            .map(|&(target, model)| {
                debug!(target_name = target, rows = batch.len(), "predicting");
                let prediction_err = |cause: anyhow::Error| ForecastError::Prediction {
                    target: target.to_string(),
                    cause,
                };

                let column = model.predict(matrix).map_err(prediction_err)?;
                if column.len() != batch.len() {
                    return Err(prediction_err(anyhow::anyhow!(
                        "returned {} predictions for {} rows",
                        column.len(),
                        batch.len()
                    )));
                }
                Ok(column)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Forecast {
            targets,
            timestamps: batch.timestamps().to_vec(),
            columns,
        })
    }

    /// Read every record, predict, and write the table.
    pub fn run<R: BufRead, W: Write>(&self, reader: R, writer: W) -> Result<RunSummary> {
        let (batch, skipped) = self.accumulate(reader)?;
        let forecast = self.predict(&batch)?;
        forecast.write_csv(writer)?;

        let summary = RunSummary {
            rows: forecast.timestamps.len(),
            skipped,
            targets: forecast.targets.len(),
        };
        info!(
            rows = summary.rows,
            skipped = summary.skipped,
            targets = summary.targets,
            "forecast complete"
        );
        Ok(summary)
    }
}
