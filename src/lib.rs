//! # Expense Forecast
//!
//! Turns a list of dated transactions into a short-horizon expense forecast
//! with backtest accuracy metrics.
//!
//! ## Core Concepts
//!
//! - **Daily Series**: eligible transactions summed per calendar day, with no gaps
//! - **Feature Contract**: a fixed, ordered column list the scoring model was trained on
//! - **Scoring Model**: an external regression function, reached through [`ScoringModel`]
//! - **Strategy**: one batch of synthesized rows (direct) or a sliding window fed
//!   with its own predictions (recursive)
//! - **Metrics**: MAE, RMSE, MAPE and R² over a trailing evaluation window, always finite
//!
//! ## Example
//!
//! ```rust,ignore
//! use expense_forecast::*;
//!
//! let model: LinearModel = serde_json::from_str(&std::fs::read_to_string("model.json")?)?;
//! let handle = ModelHandle::ready(ModelBundle::new(model));
//! let pipeline = ForecastPipeline::new(handle, PipelineConfig::default());
//!
//! let request = ForecastRequest::new(
//!     vec![
//!         RawTransaction::new("2025-07-01", 15_000.0, Some("EXPENSE")),
//!         // ...
//!     ],
//!     Cadence::Weekly,
//! );
//!
//! match pipeline.respond(&request) {
//!     Ok(response) => println!("{}", response.to_json()?),
//!     Err(err) => eprintln!("{}: {}", err.error, err.message),
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod features;
pub mod forecast;
pub mod ingestion;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod response;
pub mod schema;
pub mod utils;

pub use aggregator::{Aggregation, DailyAggregator, DailyPoint, DailySeries, SeriesOrigin};
pub use config::*;
pub use error::{ErrorResponse, ForecastError, Result};
pub use features::{
    FeatureBuilder, FeatureFrame, FeatureMatrix, FeatureSet, FeatureSetVariant, TrendDefinition,
    SEQUENCE_FEATURES, TABULAR_FEATURES,
};
pub use forecast::{Backtest, ForecastEngine, ForecastPoint, SafetyNet};
pub use ingestion::{normalize_transactions, NormalizedBatch};
pub use metrics::{evaluate, evaluation_window, MetricSet};
pub use model::{LinearModel, ModelBundle, ModelHandle, ScoringModel, StandardScaler, TargetScaler};
pub use pipeline::ForecastPipeline;
pub use response::*;
pub use schema::*;
pub use utils::*;

/// One-off forecast with the default configuration.
pub fn forecast_expenses(handle: &ModelHandle, request: &ForecastRequest) -> Result<ForecastResponse> {
    ForecastPipeline::new(handle.clone(), PipelineConfig::default()).run(request)
}
