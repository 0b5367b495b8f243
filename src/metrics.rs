//! Accuracy metrics over the trailing evaluation window.
//!
//! Every value in a [`MetricSet`] is finite: degenerate inputs (constant
//! actuals, negative R², NaN/Inf) are mapped to fixed conventions instead of
//! being reported as errors.

use crate::config::EvaluationConfig;
use crate::features::{mean, sample_std};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const MAPE_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricSet {
    pub mae: f64,
    pub rmse: f64,
    /// Percent
    pub mape: f64,
    /// Always within [0, 1]
    pub r_squared: f64,
    pub accuracy_percentage: f64,
    pub evaluation_window_days: usize,
    pub historical_mean: f64,
    pub historical_std: f64,
}

/// Number of trailing days to evaluate: `max(floor(n * fraction), min_days)`, capped at `n`.
pub fn evaluation_window(n: usize, config: &EvaluationConfig) -> usize {
    let share = (n as f64 * config.fraction).floor() as usize;
    share.max(config.min_days).min(n)
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    paired_mean(actual, predicted, |a, p| (a - p).abs())
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    paired_mean(actual, predicted, |a, p| (a - p).powi(2)).sqrt()
}

/// Mean absolute percentage error in percent; `|a| + 1e-8` keeps zero actuals finite.
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    paired_mean(actual, predicted, |a, p| (a - p).abs() / (a.abs() + MAPE_EPSILON)) * 100.0
}

/// Coefficient of determination under the forecasting conventions:
/// a constant actual series scores 0, a negative score is replaced by the
/// squared correlation (or 0), and the result is clamped to [0, 1].
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return 0.0;
    }

    let actual_mean = mean(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - actual_mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }

    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let mut r2 = 1.0 - ss_res / ss_tot;

    if r2 < 0.0 {
        r2 = pearson(actual, predicted).map(|r| r * r).unwrap_or(0.0);
    }
    if r2.is_nan() {
        return 0.0;
    }
    r2.clamp(0.0, 1.0)
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let (mx, my) = (mean(x), mean(y));
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    let r = cov / (vx.sqrt() * vy.sqrt());
    r.is_finite().then_some(r)
}

fn paired_mean(actual: &[f64], predicted: &[f64], f: impl Fn(f64, f64) -> f64) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = actual.iter().zip(predicted).map(|(a, p)| f(*a, *p)).sum();
    sum / actual.len() as f64
}

/// Scores `predicted` against `actual` (same trailing window, aligned by
/// position). `history` is the whole daily series and only feeds the
/// historical statistics and the non-finite fallback.
pub fn evaluate(
    actual: &[f64],
    predicted: &[f64],
    history: &[f64],
    config: &EvaluationConfig,
) -> MetricSet {
    let historical_mean = mean(history);
    let historical_std = sample_std(history);
    let fallback = config.fallback_fraction * historical_mean;

    let finite_or_fallback = |name: &str, value: f64| {
        if value.is_finite() {
            value
        } else {
            warn!(
                "{} is not finite; falling back to {:.2}",
                name, fallback
            );
            fallback
        }
    };

    let mae = finite_or_fallback("MAE", mae(actual, predicted)).max(0.0);
    let rmse = finite_or_fallback("RMSE", rmse(actual, predicted));
    let mape = finite_or_fallback("MAPE", mape(actual, predicted));
    let r_squared = r_squared(actual, predicted);

    debug!(
        "Metrics over {} days: MAE={:.2} RMSE={:.2} MAPE={:.2}% R2={:.4}",
        actual.len(),
        mae,
        rmse,
        mape,
        r_squared
    );

    MetricSet {
        mae,
        rmse,
        mape,
        r_squared,
        accuracy_percentage: r_squared * 100.0,
        evaluation_window_days: actual.len(),
        historical_mean,
        historical_std,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_window() {
        let config = EvaluationConfig::default();
        assert_eq!(evaluation_window(100, &config), 20);
        assert_eq!(evaluation_window(20, &config), 7);
        assert_eq!(evaluation_window(5, &config), 5);
        assert_eq!(evaluation_window(0, &config), 0);
    }

    #[test]
    fn test_perfect_prediction() {
        let actual = [10.0, 20.0, 30.0, 40.0];
        let metrics = evaluate(&actual, &actual, &actual, &EvaluationConfig::default());
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.mape, 0.0);
        assert_eq!(metrics.r_squared, 1.0);
        assert_eq!(metrics.accuracy_percentage, 100.0);
        assert_eq!(metrics.evaluation_window_days, 4);
    }

    #[test]
    fn test_constant_actuals_score_zero() {
        let actual = [5.0; 7];
        let predicted = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        assert_eq!(r_squared(&actual, &predicted), 0.0);
    }

    #[test]
    fn test_negative_r2_uses_squared_correlation() {
        // perfectly correlated but badly offset
        let actual = [1.0, 2.0, 3.0, 4.0];
        let predicted = [101.0, 102.0, 103.0, 104.0];
        assert!((r_squared(&actual, &predicted) - 1.0).abs() < 1e-12);

        // negative and uncorrelated (constant predictions)
        let predicted = [100.0; 4];
        assert_eq!(r_squared(&actual, &predicted), 0.0);
    }

    #[test]
    fn test_known_errors() {
        let actual = [100.0, 200.0];
        let predicted = [110.0, 180.0];
        assert_eq!(mae(&actual, &predicted), 15.0);
        assert!((rmse(&actual, &predicted) - 250.0_f64.sqrt()).abs() < 1e-12);
        assert!((mape(&actual, &predicted) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_actuals_keep_mape_finite() {
        let metrics = evaluate(&[0.0, 0.0], &[1.0, 1.0], &[0.0, 0.0], &EvaluationConfig::default());
        assert!(metrics.mape.is_finite());
        assert_eq!(metrics.r_squared, 0.0);
    }

    #[test]
    fn test_non_finite_falls_back_to_historical_share() {
        let history = [1_000.0, 1_000.0, 1_000.0];
        let metrics = evaluate(&[], &[], &history, &EvaluationConfig::default());
        assert_eq!(metrics.mae, 200.0);
        assert_eq!(metrics.rmse, 200.0);
        assert_eq!(metrics.mape, 200.0);
        assert_eq!(metrics.r_squared, 0.0);
        assert_eq!(metrics.historical_std, 0.0);
    }
}
