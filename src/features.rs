//! Daily feature engineering.
//!
//! Every day of a [`DailySeries`] becomes one row of named features. The set of
//! computed columns is a superset of what any supported model consumes; the
//! model-facing [`FeatureMatrix`] is always produced by selecting an explicit,
//! ordered list of names so column positions never depend on the data.

use crate::aggregator::DailySeries;
use crate::utils::{is_month_end, is_month_start};
use chrono::{Datelike, NaiveDate};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const AMOUNT: &str = "Amount";
pub const TRANSACTION_COUNT: &str = "Transaction_Count";
pub const TREND: &str = "trend";
pub const EMA_7: &str = "ema_7";

pub const LAG_PERIODS: [usize; 5] = [1, 2, 3, 7, 14];
pub const ROLLING_WINDOWS: [usize; 3] = [3, 7, 14];
pub const EMA_SPAN: usize = 7;

/// Column order expected by the tabular (gradient-boosted) expense model.
pub const TABULAR_FEATURES: [&str; 29] = [
    "Transaction_Count",
    "day",
    "month",
    "year",
    "dayofweek",
    "dayofyear",
    "weekofyear",
    "is_weekend",
    "is_month_start",
    "is_month_end",
    "lag_1",
    "lag_2",
    "lag_3",
    "lag_7",
    "lag_14",
    "rolling_mean_3",
    "rolling_std_3",
    "rolling_min_3",
    "rolling_max_3",
    "rolling_mean_7",
    "rolling_std_7",
    "rolling_min_7",
    "rolling_max_7",
    "rolling_mean_14",
    "rolling_std_14",
    "rolling_min_14",
    "rolling_max_14",
    "ema_7",
    "trend",
];

/// Leading column order expected by sequence (windowed) models. Wider models
/// list additional names, which are synthesized as zeros.
pub const SEQUENCE_FEATURES: [&str; 11] = [
    "Amount",
    "day",
    "month",
    "year",
    "dayofweek",
    "lag_1",
    "roll_1",
    "lag_7",
    "roll_7",
    "lag_14",
    "roll_14",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrendDefinition {
    /// Zero-based position of the day in the series
    SequentialIndex,
    /// `Amount - rolling_mean_7`
    DetrendedResidual,
}

impl TrendDefinition {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDefinition::SequentialIndex => "sequential_index",
            TrendDefinition::DetrendedResidual => "detrended_residual",
        }
    }
}

/// The feature contract a deployed model was trained against. Chosen once in
/// configuration; never inferred from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSetVariant {
    #[default]
    #[schemars(description = "29 tabular columns, trend is the sequential day index")]
    TabularSequential,

    #[schemars(description = "29 tabular columns, trend is Amount minus rolling_mean_7")]
    TabularResidual,

    #[schemars(description = "Sequence model columns (Amount, calendar, lag/roll 1, 7, 14), trend is the sequential day index")]
    Sequence,
}

impl FeatureSetVariant {
    pub fn trend_definition(&self) -> TrendDefinition {
        match self {
            FeatureSetVariant::TabularResidual => TrendDefinition::DetrendedResidual,
            FeatureSetVariant::TabularSequential | FeatureSetVariant::Sequence => {
                TrendDefinition::SequentialIndex
            }
        }
    }

    pub fn feature_names(&self) -> Vec<String> {
        let names: &[&str] = match self {
            FeatureSetVariant::TabularSequential | FeatureSetVariant::TabularResidual => {
                &TABULAR_FEATURES
            }
            FeatureSetVariant::Sequence => &SEQUENCE_FEATURES,
        };
        names.iter().map(|n| n.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum RollingStat {
    Mean,
    Std,
    Min,
    Max,
}

impl RollingStat {
    fn name(&self) -> &'static str {
        match self {
            RollingStat::Mean => "mean",
            RollingStat::Std => "std",
            RollingStat::Min => "min",
            RollingStat::Max => "max",
        }
    }

    fn apply(&self, window: &[f64]) -> f64 {
        match self {
            RollingStat::Mean => mean(window),
            RollingStat::Std => sample_std(window),
            RollingStat::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
            RollingStat::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

pub fn lag_name(n: usize) -> String {
    format!("lag_{}", n)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Value `n` rows earlier; `None` for the first `n` rows.
pub fn lag(values: &[f64], n: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| i.checked_sub(n).map(|j| values[j]))
        .collect()
}

/// Trailing-window statistic with a minimum period of one row.
fn rolling(values: &[f64], window: usize, stat: RollingStat) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            stat.apply(&values[start..=i])
        })
        .collect()
}

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, RollingStat::Mean)
}

pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, RollingStat::Std)
}

/// Exponential moving average seeded with the first value, alpha = 2 / (span + 1).
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            Some(p) => alpha * v + (1.0 - alpha) * p,
            None => v,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Forward-fill, then backward-fill, then 0.
pub fn fill_missing(values: &[Option<f64>]) -> Vec<f64> {
    let mut filled: Vec<Option<f64>> = values.to_vec();

    let mut last = None;
    for slot in filled.iter_mut() {
        match slot {
            Some(v) => last = Some(*v),
            None => *slot = last,
        }
    }

    let mut next = None;
    for slot in filled.iter_mut().rev() {
        match slot {
            Some(v) => next = Some(*v),
            None => *slot = next,
        }
    }

    filled.into_iter().map(|v| v.unwrap_or(0.0)).collect()
}

/// Calendar columns for a single date, in tabular order.
pub fn calendar_features(date: NaiveDate) -> [(&'static str, f64); 9] {
    let dayofweek = date.weekday().num_days_from_monday();
    [
        ("day", date.day() as f64),
        ("month", date.month() as f64),
        ("year", date.year() as f64),
        ("dayofweek", dayofweek as f64),
        ("dayofyear", date.ordinal() as f64),
        ("weekofyear", date.iso_week().week() as f64),
        ("is_weekend", if dayofweek >= 5 { 1.0 } else { 0.0 }),
        ("is_month_start", if is_month_start(date) { 1.0 } else { 0.0 }),
        ("is_month_end", if is_month_end(date) { 1.0 } else { 0.0 }),
    ]
}

/// Row-major numeric matrix with named, ordered columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(feature_names: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == feature_names.len()));
        Self {
            feature_names,
            rows,
        }
    }

    /// Builds rows from name/value maps; names absent from a map become 0.
    pub fn from_named_rows(feature_names: Vec<String>, rows: &[BTreeMap<String, f64>]) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                feature_names
                    .iter()
                    .map(|name| row.get(name).copied().unwrap_or(0.0))
                    .collect()
            })
            .collect();
        Self::new(feature_names, rows)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&[f64]> {
        self.rows.get(idx).map(|r| r.as_slice())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }
}

/// All computed feature columns of a series, keyed by name.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl FeatureFrame {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        self.columns.get(name).and_then(|c| c.get(row)).copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Name/value map of the last row; empty for an empty frame.
    pub fn last_row(&self) -> BTreeMap<String, f64> {
        let Some(last) = self.dates.len().checked_sub(1) else {
            return BTreeMap::new();
        };
        self.columns
            .iter()
            .map(|(name, values)| (name.clone(), values[last]))
            .collect()
    }

    /// Selects `names` in order. Names not computed become zero columns.
    pub fn select(&self, names: &[String]) -> FeatureMatrix {
        let missing: Vec<&str> = names
            .iter()
            .filter(|n| !self.columns.contains_key(n.as_str()))
            .map(|n| n.as_str())
            .collect();
        if !missing.is_empty() {
            debug!(
                "Synthesizing {} zero-valued feature columns: {:?}",
                missing.len(),
                missing
            );
        }

        let rows = (0..self.len())
            .map(|i| {
                names
                    .iter()
                    .map(|name| self.value(name, i).unwrap_or(0.0))
                    .collect()
            })
            .collect();

        FeatureMatrix::new(names.to_vec(), rows)
    }
}

/// A daily series together with its computed features and the model-facing matrix.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub series: DailySeries,
    pub frame: FeatureFrame,
    pub matrix: FeatureMatrix,
}

impl FeatureSet {
    pub fn feature_names(&self) -> &[String] {
        self.matrix.feature_names()
    }
}

pub struct FeatureBuilder {
    variant: FeatureSetVariant,
    expected_names: Option<Vec<String>>,
}

impl FeatureBuilder {
    pub fn new(variant: FeatureSetVariant) -> Self {
        Self {
            variant,
            expected_names: None,
        }
    }

    /// Uses the column list declared by the consuming model instead of the
    /// variant's default list.
    pub fn with_expected_names(mut self, names: Option<Vec<String>>) -> Self {
        self.expected_names = names;
        self
    }

    pub fn variant(&self) -> FeatureSetVariant {
        self.variant
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.expected_names
            .clone()
            .unwrap_or_else(|| self.variant.feature_names())
    }

    pub fn build(&self, series: &DailySeries) -> FeatureSet {
        let frame = self.compute_frame(series);
        let matrix = frame.select(&self.feature_names());
        debug!(
            "Built feature matrix: {} rows x {} columns ({:?} trend)",
            matrix.n_rows(),
            matrix.n_features(),
            self.variant.trend_definition()
        );

        FeatureSet {
            series: series.clone(),
            frame,
            matrix,
        }
    }

    pub fn compute_frame(&self, series: &DailySeries) -> FeatureFrame {
        let dates = series.dates();
        let amounts = series.amounts();
        let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        columns.insert(AMOUNT.to_string(), amounts.clone());
        columns.insert(TRANSACTION_COUNT.to_string(), series.counts());

        for (idx, date) in dates.iter().enumerate() {
            for (name, value) in calendar_features(*date) {
                columns
                    .entry(name.to_string())
                    .or_insert_with(|| vec![0.0; dates.len()])[idx] = value;
            }
        }

        for n in LAG_PERIODS {
            columns.insert(lag_name(n), fill_missing(&lag(&amounts, n)));
        }

        for window in ROLLING_WINDOWS {
            for stat in [
                RollingStat::Mean,
                RollingStat::Std,
                RollingStat::Min,
                RollingStat::Max,
            ] {
                columns.insert(
                    format!("rolling_{}_{}", stat.name(), window),
                    rolling(&amounts, window, stat),
                );
            }
        }

        for window in [1, 7, 14] {
            columns.insert(format!("roll_{}", window), rolling_mean(&amounts, window));
        }

        columns.insert(EMA_7.to_string(), ema(&amounts, EMA_SPAN));

        let trend = match self.variant.trend_definition() {
            TrendDefinition::SequentialIndex => (0..amounts.len()).map(|i| i as f64).collect(),
            TrendDefinition::DetrendedResidual => amounts
                .iter()
                .zip(rolling_mean(&amounts, 7))
                .map(|(a, m)| a - m)
                .collect(),
        };
        columns.insert(TREND.to_string(), trend);

        FeatureFrame { dates, columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SeriesOrigin;

    fn series_from(amounts: &[f64], start: NaiveDate) -> DailySeries {
        let end = start + chrono::Duration::days(amounts.len() as i64 - 1);
        let totals: BTreeMap<NaiveDate, (f64, u32)> = amounts
            .iter()
            .enumerate()
            .map(|(i, a)| (start + chrono::Duration::days(i as i64), (*a, 1)))
            .collect();
        DailySeries::from_totals(&totals, start, end, SeriesOrigin::Observed)
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_rolling_min_period_semantics() {
        let values = [4.0, 8.0, 6.0, 2.0];
        assert_eq!(rolling_mean(&values, 3), vec![4.0, 6.0, 6.0, 16.0 / 3.0]);

        let std = rolling_std(&values, 3);
        assert_eq!(std[0], 0.0);
        assert!((std[1] - 8.0_f64.sqrt()).abs() < 1e-12);

        assert_eq!(rolling(&values, 3, RollingStat::Min), vec![4.0, 4.0, 4.0, 2.0]);
        assert_eq!(rolling(&values, 3, RollingStat::Max), vec![4.0, 8.0, 8.0, 8.0]);
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        let values = [100.0, 200.0, 200.0];
        let result = ema(&values, 7);
        assert_eq!(result[0], 100.0);
        assert!((result[1] - 125.0).abs() < 1e-12);
        assert!((result[2] - 143.75).abs() < 1e-12);
    }

    #[test]
    fn test_fill_missing_policy() {
        let filled = fill_missing(&[None, Some(2.0), None, Some(5.0), None]);
        assert_eq!(filled, vec![2.0, 2.0, 2.0, 5.0, 5.0]);
        assert_eq!(fill_missing(&[None, None]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_lag_and_leading_fill() {
        let series = series_from(&[10.0, 20.0, 30.0, 40.0], start());
        let frame = FeatureBuilder::new(FeatureSetVariant::TabularSequential).compute_frame(&series);

        assert_eq!(frame.column("lag_1").unwrap(), &[10.0, 10.0, 20.0, 30.0]);
        assert_eq!(frame.column("lag_3").unwrap(), &[10.0, 10.0, 10.0, 10.0]);
        // no value is ever 7 rows back
        assert_eq!(frame.column("lag_7").unwrap(), &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_calendar_features() {
        // 2024-03-31 is a Sunday and a month end
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let features: BTreeMap<&str, f64> = calendar_features(date).into_iter().collect();
        assert_eq!(features["day"], 31.0);
        assert_eq!(features["dayofweek"], 6.0);
        assert_eq!(features["dayofyear"], 91.0);
        assert_eq!(features["weekofyear"], 13.0);
        assert_eq!(features["is_weekend"], 1.0);
        assert_eq!(features["is_month_end"], 1.0);
        assert_eq!(features["is_month_start"], 0.0);
    }

    #[test]
    fn test_matrix_shape_and_order_are_fixed() {
        for len in [1usize, 5, 40] {
            let amounts: Vec<f64> = (0..len).map(|i| i as f64 * 10.0).collect();
            let set = FeatureBuilder::new(FeatureSetVariant::TabularSequential)
                .build(&series_from(&amounts, start()));
            assert_eq!(set.matrix.n_features(), 29);
            assert_eq!(set.matrix.n_rows(), len);
            assert_eq!(set.feature_names()[0], "Transaction_Count");
            assert_eq!(set.feature_names()[28], "trend");
        }
    }

    #[test]
    fn test_expected_names_synthesize_zero_columns() {
        let mut names = FeatureSetVariant::Sequence.feature_names();
        names.push("pad_0".to_string());
        names.insert(2, "unknown_feature".to_string());

        let set = FeatureBuilder::new(FeatureSetVariant::Sequence)
            .with_expected_names(Some(names.clone()))
            .build(&series_from(&[5.0, 6.0, 7.0], start()));

        assert_eq!(set.feature_names(), names.as_slice());
        assert_eq!(set.matrix.column("unknown_feature").unwrap(), vec![0.0; 3]);
        assert_eq!(set.matrix.column("pad_0").unwrap(), vec![0.0; 3]);
        assert_eq!(set.matrix.column("Amount").unwrap(), vec![5.0, 6.0, 7.0]);
        assert_eq!(set.matrix.column("roll_1").unwrap(), vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_trend_definitions() {
        let series = series_from(&[10.0, 20.0, 60.0], start());

        let sequential = FeatureBuilder::new(FeatureSetVariant::TabularSequential).build(&series);
        assert_eq!(sequential.matrix.column("trend").unwrap(), vec![0.0, 1.0, 2.0]);

        let residual = FeatureBuilder::new(FeatureSetVariant::TabularResidual).build(&series);
        assert_eq!(residual.matrix.column("trend").unwrap(), vec![0.0, 5.0, 30.0]);
    }

    #[test]
    fn test_constant_series_features() {
        let series = series_from(&[100_000.0; 10], start());
        let set = FeatureBuilder::new(FeatureSetVariant::TabularSequential).build(&series);

        for name in ["rolling_mean_3", "rolling_mean_7", "rolling_mean_14", "ema_7"] {
            assert!(set
                .matrix
                .column(name)
                .unwrap()
                .iter()
                .all(|v| *v == 100_000.0));
        }
        for name in ["rolling_std_3", "rolling_std_7", "rolling_std_14"] {
            assert!(set.matrix.column(name).unwrap().iter().all(|v| *v == 0.0));
        }
    }
}
