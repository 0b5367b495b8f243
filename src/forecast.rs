use crate::config::{ForecastConfig, ForecastStrategy, SafetyNetConfig};
use crate::error::{ForecastError, Result};
use crate::features::{
    calendar_features, lag_name, mean, FeatureMatrix, FeatureSet, TrendDefinition, AMOUNT,
    LAG_PERIODS, TRANSACTION_COUNT, TREND,
};
use crate::model::ModelBundle;
use crate::schema::Cadence;
use crate::utils::{add_days, days_between, weekday_label};
use chrono::NaiveDate;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_amount: f64,
    pub confidence_low: f64,
    pub confidence_high: f64,
    pub day_of_week: String,
    /// True when the cold-start safety net replaced the model output
    pub substituted: bool,
}

/// In-sample predictions for the trailing evaluation window, aligned by position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Backtest {
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
}

/// Cold-start guard for recursive forecasts, with its own seedable RNG.
pub struct SafetyNet {
    config: SafetyNetConfig,
    rng: StdRng,
}

impl SafetyNet {
    pub fn new(config: &SafetyNetConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config: config.clone(),
            rng,
        }
    }

    /// Returns a replacement when `prediction` is implausibly small next to the
    /// historical mean, `None` otherwise.
    pub fn check(&mut self, prediction: f64, historical_mean: f64) -> Option<f64> {
        if prediction >= self.config.prediction_threshold
            || historical_mean <= self.config.mean_threshold
        {
            return None;
        }
        Some(historical_mean * (1.0 + self.jitter()))
    }

    fn jitter(&mut self) -> f64 {
        let (low, high) = (self.config.jitter_low, self.config.jitter_high);
        if low >= high {
            return low;
        }
        Uniform::new_inclusive(low, high).sample(&mut self.rng)
    }
}

pub struct ForecastEngine<'a> {
    bundle: &'a ModelBundle,
    config: &'a ForecastConfig,
    trend: TrendDefinition,
}

impl<'a> ForecastEngine<'a> {
    pub fn new(bundle: &'a ModelBundle, config: &'a ForecastConfig, trend: TrendDefinition) -> Self {
        Self {
            bundle,
            config,
            trend,
        }
    }

    pub fn strategy(&self) -> ForecastStrategy {
        self.config.strategy
    }

    /// Window length for recursive scoring: the model's own, else the configured one.
    pub fn window_length(&self) -> usize {
        self.bundle
            .model()
            .window_length()
            .unwrap_or(self.config.window_length)
    }

    pub fn forecast(&self, features: &FeatureSet, cadence: Cadence) -> Result<Vec<ForecastPoint>> {
        match self.config.strategy {
            ForecastStrategy::Direct => self.forecast_direct(features, cadence),
            ForecastStrategy::Recursive => {
                let mut net = SafetyNet::new(&self.config.safety_net);
                self.forecast_recursive(features, cadence, &mut net)
            }
        }
    }

    /// Scores one synthesized row per future date in a single batch.
    pub fn forecast_direct(
        &self,
        features: &FeatureSet,
        cadence: Cadence,
    ) -> Result<Vec<ForecastPoint>> {
        let dates = future_dates(last_date(features)?, cadence)?;
        let rows = self.synthesize_future_rows(features, &dates)?;
        let predictions = self.bundle.score_batch(rows.rows())?;

        debug!(
            "Direct forecast scored {} future rows ({} cadence)",
            rows.n_rows(),
            cadence
        );

        Ok(dates
            .into_iter()
            .zip(predictions)
            .map(|(date, value)| self.point(date, value, false))
            .collect())
    }

    /// Scores a sliding window one step at a time, feeding each prediction back.
    pub fn forecast_recursive(
        &self,
        features: &FeatureSet,
        cadence: Cadence,
        net: &mut SafetyNet,
    ) -> Result<Vec<ForecastPoint>> {
        let dates = future_dates(last_date(features)?, cadence)?;
        let matrix = &features.matrix;
        let width = matrix.n_features();
        if width == 0 {
            return Err(ForecastError::ScoringFailure(
                "feature list is empty".to_string(),
            ));
        }

        let rows = self.bundle.to_model_space(matrix.rows())?;
        let k = self.window_length();
        let mut window: VecDeque<Vec<f64>> = build_window(&rows, rows.len(), k, width).into();
        let target_col = matrix
            .column_index(&self.config.target_feature)
            .unwrap_or(0);
        let historical_mean = mean(&features.series.amounts());

        let mut points = Vec::with_capacity(dates.len());
        for date in dates {
            let prediction = self.bundle.score_window(window.make_contiguous())?;

            let point = match net.check(prediction, historical_mean) {
                Some(replacement) => {
                    warn!(
                        "Prediction {:.2} for {} is implausible next to historical mean {:.2}; using {:.2}",
                        prediction, date, historical_mean, replacement
                    );
                    self.point(date, replacement, true)
                }
                None => self.point(date, prediction, false),
            };
            points.push(point);

            let mut next = vec![0.0; width];
            next[target_col] = self.bundle.value_to_model_space(target_col, prediction);
            window.pop_front();
            window.push_back(next);
        }

        Ok(points)
    }

    /// Predictions for the last `days` observed days.
    ///
    /// Direct mode scores those rows in one batch. Recursive mode predicts each
    /// day from the window of rows strictly before it.
    pub fn backtest(&self, features: &FeatureSet, days: usize) -> Result<Backtest> {
        let total = features.matrix.n_rows();
        let days = days.min(total);
        let start = total - days;

        let predicted = match self.config.strategy {
            ForecastStrategy::Direct => self.bundle.score_batch(&features.matrix.rows()[start..])?,
            ForecastStrategy::Recursive => {
                let rows = self.bundle.to_model_space(features.matrix.rows())?;
                let k = self.window_length();
                let width = features.matrix.n_features();
                (start..total)
                    .map(|t| self.bundle.score_window(&build_window(&rows, t, k, width)))
                    .collect::<Result<Vec<f64>>>()?
            }
        };

        Ok(Backtest {
            dates: features.series.dates()[start..].to_vec(),
            actual: features.series.amounts()[start..].to_vec(),
            predicted,
        })
    }

    /// Feature rows for future dates. Calendar fields come from the real date,
    /// lag/rolling/EMA fields are carried forward from the last observed day,
    /// and a sequential trend keeps counting days from the start of the history.
    pub fn synthesize_future_rows(
        &self,
        features: &FeatureSet,
        dates: &[NaiveDate],
    ) -> Result<FeatureMatrix> {
        let series = &features.series;
        let first = series
            .first_date()
            .ok_or_else(|| ForecastError::InsufficientData {
                required: 1,
                actual: 0,
                unit: "days",
            })?;

        let amounts = series.amounts();
        let counts = series.counts();
        let last_amount = amounts.last().copied().unwrap_or(0.0);
        let recent_count = mean(&counts[counts.len().saturating_sub(7)..]);
        let carried = features.frame.last_row();

        let rows: Vec<_> = dates
            .iter()
            .map(|date| {
                let mut row = carried.clone();
                for (name, value) in calendar_features(*date) {
                    row.insert(name.to_string(), value);
                }
                for n in LAG_PERIODS {
                    let value = amounts
                        .len()
                        .checked_sub(n)
                        .map(|idx| amounts[idx])
                        .unwrap_or(last_amount);
                    row.insert(lag_name(n), value);
                }
                row.insert(AMOUNT.to_string(), last_amount);
                row.insert(TRANSACTION_COUNT.to_string(), recent_count);
                if self.trend == TrendDefinition::SequentialIndex {
                    row.insert(TREND.to_string(), days_between(first, *date) as f64);
                }
                row
            })
            .collect();

        Ok(FeatureMatrix::from_named_rows(
            features.feature_names().to_vec(),
            &rows,
        ))
    }

    fn point(&self, date: NaiveDate, value: f64, substituted: bool) -> ForecastPoint {
        let predicted_amount = value.max(self.config.floor);
        ForecastPoint {
            date,
            predicted_amount,
            confidence_low: predicted_amount * self.config.confidence_low,
            confidence_high: predicted_amount * self.config.confidence_high,
            day_of_week: weekday_label(date),
            substituted,
        }
    }
}

fn last_date(features: &FeatureSet) -> Result<NaiveDate> {
    features
        .series
        .last_date()
        .ok_or(ForecastError::InsufficientData {
            required: 1,
            actual: 0,
            unit: "days",
        })
}

/// `cadence.periods()` dates after `last`, spaced `cadence.step_days()` apart.
pub fn future_dates(last: NaiveDate, cadence: Cadence) -> Result<Vec<NaiveDate>> {
    (1..=cadence.periods() as u64)
        .map(|i| add_days(last, i * cadence.step_days()))
        .collect()
}

/// The `k` rows ending just before `end`, left-padded with zero rows when fewer exist.
pub fn build_window(rows: &[Vec<f64>], end: usize, k: usize, width: usize) -> Vec<Vec<f64>> {
    let end = end.min(rows.len());
    let start = end.saturating_sub(k);
    let available = &rows[start..end];

    let mut window = vec![vec![0.0; width]; k - available.len()];
    window.extend(available.iter().cloned());
    window
}
