use anyhow::{Context, Result};
use expense_forecast::*;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Amount")]
    amount: f64,
    #[serde(rename = "Type")]
    kind: Option<String>,
}

fn load_transactions(path: &str) -> Result<Vec<RawTransaction>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("opening {}", path))?;
    let mut transactions = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        transactions.push(RawTransaction::new(&row.date, row.amount, row.kind.as_deref()));
    }
    Ok(transactions)
}

/// A weekly-average scorer, used when no model file is given.
fn baseline_model() -> Result<LinearModel> {
    let names = FeatureSetVariant::TabularSequential.feature_names();
    let weights = names
        .iter()
        .map(|n| if n == "rolling_mean_7" { 1.0 } else { 0.0 })
        .collect();
    Ok(LinearModel::new(names, weights, 0.0)?)
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let csv_path = args
        .next()
        .unwrap_or_else(|| "tests/fixtures/transactions.csv".to_string());
    let mode: Cadence = args.next().as_deref().unwrap_or("weekly").parse()?;
    let model_path = args.next();

    let handle = ModelHandle::load(|| {
        let model = match &model_path {
            Some(path) => {
                let json = std::fs::read_to_string(path)?;
                serde_json::from_str::<LinearModel>(&json)?
            }
            None => baseline_model().map_err(|e| ForecastError::ModelUnavailable(e.to_string()))?,
        };
        Ok(ModelBundle::new(model))
    });

    let pipeline = ForecastPipeline::new(handle, PipelineConfig::default());
    let transactions = load_transactions(&csv_path)?;
    println!("Loaded {} transactions from {}", transactions.len(), csv_path);

    match pipeline.respond(&ForecastRequest::new(transactions, mode)) {
        Ok(response) => {
            println!("\n{:<12} {:<10} {:>14} {:>28}", "Date", "Day", "Forecast", "Range");
            for (point, audit) in response.forecast.iter().zip(&response.audit_table) {
                println!(
                    "{:<12} {:<10} {:>14.2} {:>28}",
                    point.date, point.day_of_week, point.predicted_amount, audit.confidence_range
                );
            }
            println!(
                "\nTotal {:.2} | MAE {:.2} | RMSE {:.2} | MAPE {:.2}% | R² {:.3}",
                response.summary.total_forecast,
                response.metrics.mae,
                response.metrics.rmse,
                response.metrics.mape,
                response.metrics.r_squared
            );
            for warning in &response.metadata.warnings {
                println!("warning: {}", warning);
            }
        }
        Err(err) => {
            anyhow::bail!("{}: {}", err.error, err.message);
        }
    }

    Ok(())
}
