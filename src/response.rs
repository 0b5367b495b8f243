use crate::forecast::{Backtest, ForecastPoint};
use crate::metrics::MetricSet;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub total_forecast: f64,
    pub average_forecast: f64,
    pub min_forecast: f64,
    pub max_forecast: f64,
    pub historical_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub period: String,
    pub y_pred: f64,
    pub confidence_range: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionVsActual {
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub model_version: String,
    pub timestamp: DateTime<Utc>,
    pub data_points_used: usize,
    pub features_used: usize,
    pub forecast_periods: usize,
    pub forecast_mode: String,
    pub strategy: String,
    pub trend_definition: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub forecast: Vec<ForecastPoint>,
    pub metrics: MetricSet,
    pub summary: ForecastSummary,
    pub audit_table: Vec<AuditEntry>,
    pub prediction_vs_actual: PredictionVsActual,
    pub metadata: ResponseMetadata,
}

impl ForecastResponse {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub fn summarize(forecast: &[ForecastPoint], historical_average: f64) -> ForecastSummary {
    let amounts: Vec<f64> = forecast.iter().map(|p| p.predicted_amount).collect();
    let total: f64 = amounts.iter().sum();
    let average = if amounts.is_empty() {
        0.0
    } else {
        total / amounts.len() as f64
    };

    ForecastSummary {
        total_forecast: total,
        average_forecast: average,
        min_forecast: amounts.iter().copied().reduce(f64::min).unwrap_or(0.0),
        max_forecast: amounts.iter().copied().reduce(f64::max).unwrap_or(0.0),
        historical_average,
    }
}

pub fn audit_table(forecast: &[ForecastPoint]) -> Vec<AuditEntry> {
    forecast
        .iter()
        .enumerate()
        .map(|(i, p)| AuditEntry {
            period: format!("Period {}", i + 1),
            y_pred: p.predicted_amount,
            confidence_range: format!("{:.2} - {:.2}", p.confidence_low, p.confidence_high),
        })
        .collect()
}

/// Packages already-computed results. No modelling happens here.
pub fn assemble(
    forecast: Vec<ForecastPoint>,
    metrics: MetricSet,
    backtest: Backtest,
    metadata: ResponseMetadata,
) -> ForecastResponse {
    let summary = summarize(&forecast, metrics.historical_mean);
    let audit_table = audit_table(&forecast);

    ForecastResponse {
        forecast,
        metrics,
        summary,
        audit_table,
        prediction_vs_actual: PredictionVsActual {
            dates: backtest.dates,
            actual: backtest.actual,
            predicted: backtest.predicted,
        },
        metadata,
    }
}
