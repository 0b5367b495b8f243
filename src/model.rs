//! The scoring collaborator and the read-only handle that shares it across requests.

use crate::error::{ForecastError, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A trained regression function from feature rows to a scalar.
///
/// Tabular models implement [`score_batch`](ScoringModel::score_batch); sequence
/// models implement [`score_window`](ScoringModel::score_window) and report their
/// fixed input length through [`window_length`](ScoringModel::window_length).
pub trait ScoringModel: Send + Sync {
    fn name(&self) -> &str;

    /// Ordered column names the model was trained on, if it records them.
    fn feature_names(&self) -> Option<Vec<String>> {
        None
    }

    fn window_length(&self) -> Option<usize> {
        None
    }

    /// Scores a `(num_rows, num_features)` matrix, one prediction per row.
    fn score_batch(&self, _rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        Err(ForecastError::ScoringFailure(format!(
            "model '{}' does not accept tabular input",
            self.name()
        )))
    }

    /// Scores one `(window_length, num_features)` window.
    fn score_window(&self, _window: &[Vec<f64>]) -> Result<f64> {
        Err(ForecastError::ScoringFailure(format!(
            "model '{}' does not accept sequence input",
            self.name()
        )))
    }
}

/// Per-column standardization: `(x - mean) / scale`. A zero scale is treated as 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        if mean.len() != scale.len() {
            return Err(ForecastError::InvalidConfig(format!(
                "scaler has {} means but {} scales",
                mean.len(),
                scale.len()
            )));
        }
        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform_value(&self, column: usize, value: f64) -> f64 {
        let mean = self.mean.get(column).copied().unwrap_or(0.0);
        let scale = effective_scale(self.scale.get(column).copied().unwrap_or(1.0));
        (value - mean) / scale
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(ForecastError::ScoringFailure(format!(
                "feature scaler expects {} columns, got {}",
                self.n_features(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .enumerate()
            .map(|(col, v)| self.transform_value(col, *v))
            .collect())
    }
}

/// Maps model outputs back to currency units: `y * scale + mean`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetScaler {
    pub mean: f64,
    pub scale: f64,
}

impl TargetScaler {
    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * effective_scale(self.scale) + self.mean
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / effective_scale(self.scale)
    }
}

fn effective_scale(scale: f64) -> f64 {
    if scale == 0.0 || !scale.is_finite() {
        1.0
    } else {
        scale
    }
}

/// A model paired with the scalers it was trained with.
pub struct ModelBundle {
    model: Box<dyn ScoringModel>,
    feature_scaler: Option<StandardScaler>,
    target_scaler: Option<TargetScaler>,
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("model", &self.model.name())
            .field("feature_scaler", &self.feature_scaler.is_some())
            .field("target_scaler", &self.target_scaler)
            .finish()
    }
}

impl ModelBundle {
    pub fn new(model: impl ScoringModel + 'static) -> Self {
        Self {
            model: Box::new(model),
            feature_scaler: None,
            target_scaler: None,
        }
    }

    pub fn with_feature_scaler(mut self, scaler: StandardScaler) -> Self {
        self.feature_scaler = Some(scaler);
        self
    }

    pub fn with_target_scaler(mut self, scaler: TargetScaler) -> Self {
        self.target_scaler = Some(scaler);
        self
    }

    pub fn model(&self) -> &dyn ScoringModel {
        self.model.as_ref()
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    /// Rows in the space the model was trained in.
    pub fn to_model_space(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        match &self.feature_scaler {
            Some(scaler) => rows.iter().map(|r| scaler.transform_row(r)).collect(),
            None => Ok(rows.to_vec()),
        }
    }

    pub fn value_to_model_space(&self, column: usize, value: f64) -> f64 {
        match &self.feature_scaler {
            Some(scaler) => scaler.transform_value(column, value),
            None => value,
        }
    }

    fn to_currency(&self, raw: f64) -> f64 {
        match &self.target_scaler {
            Some(scaler) => scaler.inverse(raw),
            None => raw,
        }
    }

    /// Scales `rows`, scores them in one call and returns predictions in currency units.
    pub fn score_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let prepared = self.to_model_space(rows)?;
        let raw = self.model.score_batch(&prepared)?;

        if raw.len() != rows.len() {
            return Err(ForecastError::ScoringFailure(format!(
                "model '{}' returned {} predictions for {} rows",
                self.name(),
                raw.len(),
                rows.len()
            )));
        }

        raw.into_iter()
            .enumerate()
            .map(|(idx, value)| {
                let value = self.to_currency(value);
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(ForecastError::ScoringFailure(format!(
                        "model '{}' produced a non-finite prediction for row {}",
                        self.name(),
                        idx
                    )))
                }
            })
            .collect()
    }

    /// Scores a window that is already in model space; returns currency units.
    pub fn score_window(&self, window: &[Vec<f64>]) -> Result<f64> {
        let value = self.to_currency(self.model.score_window(window)?);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ForecastError::ScoringFailure(format!(
                "model '{}' produced a non-finite prediction",
                self.name()
            )))
        }
    }
}

/// Load-once, read-only handle to the process-wide model bundle. Cloning is
/// cheap and every clone shares the same bundle.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    inner: Arc<std::result::Result<ModelBundle, String>>,
}

impl ModelHandle {
    /// Runs `loader` once. A failure is remembered and reported to every request.
    pub fn load<F>(loader: F) -> Self
    where
        F: FnOnce() -> Result<ModelBundle>,
    {
        match loader() {
            Ok(bundle) => {
                info!("Scoring model '{}' loaded", bundle.name());
                Self::ready(bundle)
            }
            Err(e) => {
                error!("Scoring model failed to load: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn ready(bundle: ModelBundle) -> Self {
        Self {
            inner: Arc::new(Ok(bundle)),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Err(reason.into())),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.is_ok()
    }

    pub fn get(&self) -> Result<&ModelBundle> {
        match self.inner.as_ref() {
            Ok(bundle) => Ok(bundle),
            Err(reason) => Err(ForecastError::ModelUnavailable(reason.clone())),
        }
    }
}

/// Weighted sum of features plus an intercept. Serves both input shapes: a
/// window is scored by its most recent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub window_length: Option<usize>,
}

impl LinearModel {
    pub fn new(feature_names: Vec<String>, weights: Vec<f64>, intercept: f64) -> Result<Self> {
        if feature_names.len() != weights.len() {
            return Err(ForecastError::InvalidConfig(format!(
                "linear model has {} feature names but {} weights",
                feature_names.len(),
                weights.len()
            )));
        }
        Ok(Self {
            feature_names,
            weights,
            intercept,
            window_length: None,
        })
    }

    pub fn with_window_length(mut self, window_length: usize) -> Self {
        self.window_length = Some(window_length);
        self
    }

    fn score_row(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.weights.len() {
            return Err(ForecastError::ScoringFailure(format!(
                "linear model expects {} features, got {}",
                self.weights.len(),
                row.len()
            )));
        }
        Ok(self.intercept + row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>())
    }
}

impl ScoringModel for LinearModel {
    fn name(&self) -> &str {
        "linear"
    }

    fn feature_names(&self) -> Option<Vec<String>> {
        Some(self.feature_names.clone())
    }

    fn window_length(&self) -> Option<usize> {
        self.window_length
    }

    fn score_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|r| self.score_row(r)).collect()
    }

    fn score_window(&self, window: &[Vec<f64>]) -> Result<f64> {
        match window.last() {
            Some(row) => self.score_row(row),
            None => Err(ForecastError::ScoringFailure(
                "empty input window".to_string(),
            )),
        }
    }
}
