use crate::error::{ForecastError, Result};
use crate::features::FeatureSetVariant;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How future values are produced from the scoring model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStrategy {
    #[default]
    #[schemars(
        description = "Score one synthesized feature row per future point in a single batch. Lag and rolling features are carried forward from the last observed day."
    )]
    Direct,

    #[schemars(
        description = "Score a fixed-length window of feature rows one step at a time, feeding each prediction back into the window."
    )]
    Recursive,
}

impl ForecastStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastStrategy::Direct => "direct",
            ForecastStrategy::Recursive => "recursive",
        }
    }
}

/// Cold-start guard for recursive forecasting. When a prediction collapses
/// below `prediction_threshold` while the historical mean is above
/// `mean_threshold`, the prediction is replaced by
/// `historical_mean * (1 + u)` with `u ~ Uniform[jitter_low, jitter_high]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct SafetyNetConfig {
    pub prediction_threshold: f64,
    pub mean_threshold: f64,
    pub jitter_low: f64,
    pub jitter_high: f64,
    #[schemars(description = "Fixed RNG seed. Leave empty to seed from OS entropy per request.")]
    pub seed: Option<u64>,
}

impl Default for SafetyNetConfig {
    fn default() -> Self {
        Self {
            prediction_threshold: 1_000.0,
            mean_threshold: 5_000.0,
            jitter_low: -0.05,
            jitter_high: 0.10,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ForecastConfig {
    pub strategy: ForecastStrategy,

    #[schemars(description = "Minimum realistic daily expense. Every prediction is clamped to at least this value.")]
    pub floor: f64,

    pub confidence_low: f64,
    pub confidence_high: f64,

    #[schemars(description = "Input window length for recursive mode when the model does not declare one.")]
    pub window_length: usize,

    #[schemars(description = "Feature column that receives the predicted value in recursive mode. Column 0 is used when the model does not list it.")]
    pub target_feature: String,

    pub safety_net: SafetyNetConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            strategy: ForecastStrategy::Direct,
            floor: 10_000.0,
            confidence_low: 0.8,
            confidence_high: 1.2,
            window_length: 365,
            target_feature: "Amount".to_string(),
            safety_net: SafetyNetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct EvaluationConfig {
    #[schemars(description = "Share of the history (0, 1] held out as the trailing evaluation window.")]
    pub fraction: f64,

    #[schemars(description = "Lower bound on the evaluation window, in days.")]
    pub min_days: usize,

    #[schemars(description = "Non-finite error metrics are replaced by this fraction of the historical mean.")]
    pub fallback_fraction: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            fraction: 0.2,
            min_days: 7,
            fallback_fraction: 0.2,
        }
    }
}

/// Deployment-wide settings, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    #[schemars(description = "Only transactions with this category are aggregated. Null keeps every transaction.")]
    pub type_filter: Option<String>,

    #[schemars(description = "First day of the all-zero series used when no transaction is eligible.")]
    pub fallback_start: NaiveDate,
    pub fallback_end: NaiveDate,

    pub min_transactions: usize,
    pub min_history_days: usize,

    pub feature_set: FeatureSetVariant,
    pub forecast: ForecastConfig,
    pub evaluation: EvaluationConfig,

    pub model_version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            type_filter: Some("EXPENSE".to_string()),
            fallback_start: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap_or_default(),
            fallback_end: NaiveDate::from_ymd_opt(2025, 12, 30).unwrap_or_default(),
            min_transactions: 7,
            min_history_days: 7,
            feature_set: FeatureSetVariant::default(),
            forecast: ForecastConfig::default(),
            evaluation: EvaluationConfig::default(),
            model_version: "XGBoost v2.2 (Expense-Only Mode)".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn validate(&self) -> Result<()> {
        let eval = &self.evaluation;
        if !(eval.fraction > 0.0 && eval.fraction <= 1.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "evaluation.fraction {} must be in (0, 1]",
                eval.fraction
            )));
        }
        if !(eval.fallback_fraction >= 0.0 && eval.fallback_fraction.is_finite()) {
            return Err(ForecastError::InvalidConfig(format!(
                "evaluation.fallback_fraction {} must be a non-negative number",
                eval.fallback_fraction
            )));
        }

        let forecast = &self.forecast;
        if !(forecast.floor >= 0.0 && forecast.floor.is_finite()) {
            return Err(ForecastError::InvalidConfig(format!(
                "forecast.floor {} must be a non-negative number",
                forecast.floor
            )));
        }
        if !(0.0..=1.0).contains(&forecast.confidence_low) || forecast.confidence_high < 1.0 {
            return Err(ForecastError::InvalidConfig(format!(
                "confidence band [{}, {}] must satisfy 0 <= low <= 1 <= high",
                forecast.confidence_low, forecast.confidence_high
            )));
        }
        if forecast.window_length == 0 {
            return Err(ForecastError::InvalidConfig(
                "forecast.window_length must be positive".to_string(),
            ));
        }

        let net = &forecast.safety_net;
        if net.jitter_low > net.jitter_high {
            return Err(ForecastError::InvalidConfig(format!(
                "safety_net jitter bounds [{}, {}] are out of order",
                net.jitter_low, net.jitter_high
            )));
        }

        if self.fallback_end < self.fallback_start {
            return Err(ForecastError::InvalidConfig(format!(
                "fallback window ends ({}) before it starts ({})",
                self.fallback_end, self.fallback_start
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::TrendDefinition;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_transactions, 7);
        assert_eq!(config.forecast.floor, 10_000.0);
        assert_eq!(
            config.feature_set.trend_definition(),
            TrendDefinition::SequentialIndex
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "feature_set": "tabular_residual",
                "forecast": { "strategy": "recursive", "window_length": 30 },
                "evaluation": { "fraction": 0.7, "min_days": 30 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.forecast.strategy, ForecastStrategy::Recursive);
        assert_eq!(config.forecast.window_length, 30);
        assert_eq!(config.forecast.floor, 10_000.0);
        assert_eq!(config.evaluation.min_days, 30);
        assert_eq!(
            config.feature_set.trend_definition(),
            TrendDefinition::DetrendedResidual
        );
        assert_eq!(config.type_filter.as_deref(), Some("EXPENSE"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = PipelineConfig::default();
        config.evaluation.fraction = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ForecastError::InvalidConfig(_))
        ));

        let mut config = PipelineConfig::default();
        config.forecast.safety_net.jitter_low = 0.2;
        config.forecast.safety_net.jitter_high = 0.1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.forecast.confidence_high = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed = PipelineConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = PipelineConfig::from_path("/nonexistent/forecast-config.json");
        assert!(matches!(result, Err(ForecastError::IoError(_))));
    }
}
