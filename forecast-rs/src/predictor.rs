//! Target predictors and the model bundle.
//!
//! A [`Predictor`] scores a whole feature matrix at once. The
//! [`ModelBundle`] maps target names to predictors and is read-only once
//! built. On disk the bundle is a TOML manifest naming one ONNX model per
//! target.

use crate::{ForecastError, Result};
use anyhow::{anyhow, Context};
use ndarray::ArrayView2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Batched regression model for one target.
pub trait Predictor: Send + Sync {
    /// Predict one value per row of `features`, in row order.
    fn predict(&self, features: ArrayView2<'_, f64>) -> anyhow::Result<Vec<f64>>;

    /// Feature width the model was trained on, if known.
    fn num_features(&self) -> Option<usize> {
        None
    }
}

/// Immutable mapping from target name to predictor, ordered by name.
pub struct ModelBundle {
    models: BTreeMap<String, Box<dyn Predictor>>,
}

impl ModelBundle {
    /// Build a bundle from in-memory predictors.
    ///
    /// Fails if a target name appears twice.
    pub fn new<I>(models: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Box<dyn Predictor>)>,
    {
        let mut map = BTreeMap::new();
        for (name, model) in models {
            if map.contains_key(&name) {
                return Err(ForecastError::Config(format!(
                    "duplicate target name: {}",
                    name
                )));
            }
            map.insert(name, model);
        }
        Ok(Self { models: map })
    }

    /// Load every model named in a bundle manifest.
    ///
    /// # Example
    /// ```no_run
    /// use ash_forecast::ModelBundle;
    ///
    /// let bundle = ModelBundle::load("models/bundle.toml").unwrap();
    /// println!("{} targets", bundle.len());
    /// ```
    pub fn load(manifest_path: impl AsRef<Path>) -> Result<Self> {
        let manifest_path = manifest_path.as_ref();
        let load_err = |message: String| ForecastError::ModelLoad {
            path: manifest_path.to_path_buf(),
            message,
        };

        let manifest = BundleManifest::read(manifest_path).map_err(|e| load_err(format!("{:#}", e)))?;
        if manifest.models.is_empty() {
            return Err(load_err("manifest declares no models".to_string()));
        }

        let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let mut models: BTreeMap<String, Box<dyn Predictor>> = BTreeMap::new();

        for (target, entry) in &manifest.models {
            let model_path = base_dir.join(&entry.path);
            if !model_path.is_file() {
                return Err(load_err(format!(
                    "model file for target {} not found: {}",
                    target,
                    model_path.display()
                )));
            }

            let predictor = OnnxPredictor::load(&model_path, entry, manifest.intra_threads)
                .map_err(|e| load_err(format!("target {}: {:#}", target, e)))?;

            tracing::debug!(target_name = %target, path = %model_path.display(), "loaded model");
            models.insert(target.clone(), Box::new(predictor));
        }

        Ok(Self { models })
    }

    /// Target names in ascending order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Predictors in ascending target order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Predictor)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn get(&self, target: &str) -> Option<&dyn Predictor> {
        self.models.get(target).map(|m| m.as_ref())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("targets", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// On-disk description of a model bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Intra-op threads per ONNX session
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// One entry per target
    pub models: BTreeMap<String, ModelEntry>,
}

fn default_intra_threads() -> usize {
    1
}

/// Manifest entry for one target model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// ONNX file, relative to the manifest's directory
    pub path: PathBuf,

    /// Output to read; the first output when absent
    #[serde(default)]
    pub output: Option<String>,

    /// Expected input width
    #[serde(default)]
    pub features: Option<usize>,
}

impl BundleManifest {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).context("failed to parse bundle manifest")
    }
}

/// Predictor backed by an ONNX Runtime session.
pub struct OnnxPredictor {
    /// Running a session needs exclusive access
    session: Mutex<Session>,

    output: Option<String>,

    num_features: Option<usize>,
}

impl OnnxPredictor {
    /// Load an ONNX model.
    ///
    /// # Arguments
    /// * `model_path` - Path to ONNX model file
    /// * `entry` - Output name and expected width from the manifest
    /// * `intra_threads` - Intra-op thread count for the session
    pub fn load(model_path: &Path, entry: &ModelEntry, intra_threads: usize) -> anyhow::Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model_path)?;

        Ok(Self {
            session: Mutex::new(session),
            output: entry.output.clone(),
            num_features: entry.features,
        })
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, features: ArrayView2<'_, f64>) -> anyhow::Result<Vec<f64>> {
        let rows = features.nrows();
        let input = Tensor::from_array(features.mapv(|v| v as f32))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("session lock poisoned"))?;
        let outputs = session.run(ort::inputs![input])?;

        let output = match &self.output {
            Some(name) => outputs
                .get(name.as_str())
                .ok_or_else(|| anyhow!("model has no output named {}", name))?,
            None => &outputs[0],
        };

        let (_, data) = output.try_extract_tensor::<f32>()?;
        if data.len() != rows {
            anyhow::bail!(
                "model produced {} values for {} rows",
                data.len(),
                rows
            );
        }

        Ok(data.iter().map(|&v| v as f64).collect())
    }

    fn num_features(&self) -> Option<usize> {
        self.num_features
    }
}
