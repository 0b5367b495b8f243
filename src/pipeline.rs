use crate::aggregator::DailyAggregator;
use crate::config::PipelineConfig;
use crate::error::{ErrorResponse, ForecastError, Result};
use crate::features::FeatureBuilder;
use crate::forecast::ForecastEngine;
use crate::ingestion::normalize_transactions;
use crate::metrics::{evaluate, evaluation_window};
use crate::model::ModelHandle;
use crate::response::{assemble, ForecastResponse, ResponseMetadata};
use crate::schema::ForecastRequest;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Request-scoped forecasting over a shared, read-only model handle.
///
/// Cheap to clone and safe to share between threads; every request builds its
/// own intermediate state.
#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    handle: ModelHandle,
    config: PipelineConfig,
}

impl ForecastPipeline {
    pub fn new(handle: ModelHandle, config: PipelineConfig) -> Self {
        Self { handle, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn run(&self, request: &ForecastRequest) -> Result<ForecastResponse> {
        let bundle = self.handle.get()?;

        info!(
            "Forecast request: {} transactions, {} mode, model '{}'",
            request.transactions.len(),
            request.mode,
            bundle.name()
        );

        let batch = normalize_transactions(&request.transactions);
        debug!(
            "Normalized {} transactions ({} income, {} expense, {} skipped)",
            batch.transactions.len(),
            batch.income_count,
            batch.expense_count,
            batch.skipped
        );

        if batch.transactions.len() < self.config.min_transactions {
            return Err(ForecastError::InsufficientData {
                required: self.config.min_transactions,
                actual: batch.transactions.len(),
                unit: "transactions",
            });
        }

        let aggregation = DailyAggregator::from_config(&self.config).aggregate(&batch.transactions);
        let series = aggregation.series;
        let mut warnings = aggregation.warnings;
        if batch.skipped > 0 {
            warnings.push(format!("Skipped {} invalid transactions", batch.skipped));
        }

        if series.len() < self.config.min_history_days {
            return Err(ForecastError::InsufficientData {
                required: self.config.min_history_days,
                actual: series.len(),
                unit: "days",
            });
        }

        let features = FeatureBuilder::new(self.config.feature_set)
            .with_expected_names(bundle.model().feature_names())
            .build(&series);

        let trend = self.config.feature_set.trend_definition();
        let engine = ForecastEngine::new(bundle, &self.config.forecast, trend);

        let window = evaluation_window(series.len(), &self.config.evaluation);
        let backtest = engine.backtest(&features, window)?;
        let metrics = evaluate(
            &backtest.actual,
            &backtest.predicted,
            &series.amounts(),
            &self.config.evaluation,
        );

        let forecast = engine.forecast(&features, request.mode)?;
        let substituted = forecast.iter().filter(|p| p.substituted).count();
        if substituted > 0 {
            warnings.push(format!(
                "{} of {} forecast points replaced by the historical mean",
                substituted,
                forecast.len()
            ));
        }

        info!(
            "Forecast complete: {} points over {} days of history (R2={:.3})",
            forecast.len(),
            series.len(),
            metrics.r_squared
        );

        let metadata = ResponseMetadata {
            model_version: self.config.model_version.clone(),
            timestamp: Utc::now(),
            data_points_used: series.len(),
            features_used: features.matrix.n_features(),
            forecast_periods: forecast.len(),
            forecast_mode: request.mode.to_string(),
            strategy: engine.strategy().as_str().to_string(),
            trend_definition: trend.as_str().to_string(),
            warnings,
        };

        Ok(assemble(forecast, metrics, backtest, metadata))
    }

    /// Like [`run`](Self::run), but never unwinds: errors and panics both come
    /// back as one [`ErrorResponse`].
    pub fn respond(
        &self,
        request: &ForecastRequest,
    ) -> std::result::Result<ForecastResponse, ErrorResponse> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run(request))) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                warn!("Forecast request rejected: {}", e);
                Err(e.into())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Forecast pipeline panicked: {}", message);
                Err(ErrorResponse::internal(message))
            }
        }
    }

    /// JSON in, JSON out. The output is either a forecast response or an error object.
    pub fn respond_json(&self, body: &str) -> String {
        let outcome = ForecastRequest::from_json(body)
            .map_err(ErrorResponse::from)
            .and_then(|request| self.respond(&request));

        let encoded = match &outcome {
            Ok(response) => serde_json::to_string(response),
            Err(err) => serde_json::to_string(err),
        };

        encoded.unwrap_or_else(|e| {
            error!("Failed to encode forecast output: {}", e);
            r#"{"error":"INTERNAL_ERROR","message":"failed to encode response"}"#.to_string()
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "forecast pipeline panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::TABULAR_FEATURES;
    use crate::model::{LinearModel, ModelBundle, ScoringModel};
    use crate::schema::{Cadence, RawTransaction};

    fn lag_one_model() -> LinearModel {
        let names: Vec<String> = TABULAR_FEATURES.iter().map(|n| n.to_string()).collect();
        let weights = names
            .iter()
            .map(|n| if n == "lag_1" { 1.0 } else { 0.0 })
            .collect();
        LinearModel::new(names, weights, 0.0).unwrap()
    }

    fn pipeline() -> ForecastPipeline {
        ForecastPipeline::new(
            ModelHandle::ready(ModelBundle::new(lag_one_model())),
            PipelineConfig::default(),
        )
    }

    fn daily_expenses(days: u32, amount: f64) -> Vec<RawTransaction> {
        (1..=days)
            .map(|d| RawTransaction::new(&format!("2025-03-{:02}", d), amount, Some("EXPENSE")))
            .collect()
    }

    struct PanickingModel;

    impl ScoringModel for PanickingModel {
        fn name(&self) -> &str {
            "panicking"
        }

        fn score_batch(&self, _rows: &[Vec<f64>]) -> Result<Vec<f64>> {
            panic!("scorer exploded")
        }
    }

    #[test]
    fn test_run_produces_full_response() {
        let request = ForecastRequest::new(daily_expenses(21, 20_000.0), Cadence::Daily);
        let response = pipeline().run(&request).unwrap();

        assert_eq!(response.forecast.len(), 7);
        assert!(response.forecast.iter().all(|p| p.predicted_amount == 20_000.0));
        assert_eq!(response.metrics.evaluation_window_days, 7);
        assert_eq!(response.prediction_vs_actual.actual.len(), 7);
        assert_eq!(response.prediction_vs_actual.predicted.len(), 7);
        assert_eq!(response.metadata.data_points_used, 21);
        assert_eq!(response.metadata.features_used, 29);
        assert_eq!(response.metadata.forecast_mode, "daily");
        assert_eq!(response.metadata.strategy, "direct");
        assert_eq!(response.summary.total_forecast, 140_000.0);
    }

    #[test]
    fn test_too_few_transactions() {
        let request = ForecastRequest::new(daily_expenses(6, 100.0), Cadence::Weekly);
        let err = pipeline().run(&request).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData {
                required: 7,
                actual: 6,
                unit: "transactions"
            }
        ));
    }

    #[test]
    fn test_too_few_days() {
        let transactions = (0..10)
            .map(|_| RawTransaction::new("2025-03-01", 500.0, Some("EXPENSE")))
            .collect();
        let request = ForecastRequest::new(transactions, Cadence::Weekly);
        let err = pipeline().run(&request).unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_DATA");
    }

    #[test]
    fn test_unloaded_model_is_reported() {
        let pipeline = ForecastPipeline::new(
            ModelHandle::unavailable("model file missing"),
            PipelineConfig::default(),
        );
        let request = ForecastRequest::new(daily_expenses(21, 100.0), Cadence::Weekly);
        let err = pipeline.respond(&request).unwrap_err();
        assert_eq!(err.error, "MODEL_NOT_LOADED");
        assert!(err.message.contains("model file missing"));
    }

    #[test]
    fn test_panics_become_internal_errors() {
        let pipeline = ForecastPipeline::new(
            ModelHandle::ready(ModelBundle::new(PanickingModel)),
            PipelineConfig::default(),
        );
        let request = ForecastRequest::new(daily_expenses(21, 100.0), Cadence::Weekly);
        let err = pipeline.respond(&request).unwrap_err();
        assert_eq!(err.error, "INTERNAL_ERROR");
        assert!(err.message.contains("scorer exploded"));
    }

    #[test]
    fn test_respond_json() {
        let output = pipeline().respond_json("{ not json");
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["error"], "INVALID_REQUEST");

        let body = serde_json::json!({
            "transactions": daily_expenses(14, 15_000.0),
            "mode": "weekly"
        })
        .to_string();
        let output = pipeline().respond_json(&body);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["forecast"].as_array().unwrap().len(), 4);
        assert_eq!(value["audit_table"][0]["period"], "Period 1");
    }

    #[test]
    fn test_malformed_rows_are_skipped_not_fatal() {
        let mut rows: Vec<serde_json::Value> = daily_expenses(10, 15_000.0)
            .into_iter()
            .map(|tx| serde_json::to_value(tx).unwrap())
            .collect();
        rows.push(serde_json::json!({"Date": null, "Amount": 100}));
        rows.push(serde_json::json!({"Date": "2025-03-04"}));

        let body = serde_json::json!({ "transactions": rows, "mode": "daily" }).to_string();
        let output = pipeline().respond_json(&body);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert!(value.get("error").is_none(), "unexpected error: {}", output);
        assert_eq!(value["forecast"].as_array().unwrap().len(), 7);
        assert_eq!(value["metadata"]["data_points_used"], 10);
        let warnings = value["metadata"]["warnings"].as_array().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w == "Skipped 2 invalid transactions"));
    }

    #[test]
    fn test_pipeline_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ForecastPipeline>();
    }
}
