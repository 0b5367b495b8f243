use crate::schema::Transaction;
use crate::utils::daily_range;
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesOrigin {
    /// Built from at least one eligible transaction
    Observed,
    /// Synthetic all-zero window used when nothing was eligible
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub total_amount: f64,
    pub transaction_count: u32,
}

/// One entry per calendar day, strictly ascending with no gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    points: Vec<DailyPoint>,
    origin: SeriesOrigin,
}

impl DailySeries {
    /// Builds a contiguous series over `[start, end]`, filling days absent from
    /// `totals` with zero amount and zero count.
    pub fn from_totals(
        totals: &BTreeMap<NaiveDate, (f64, u32)>,
        start: NaiveDate,
        end: NaiveDate,
        origin: SeriesOrigin,
    ) -> Self {
        let points = daily_range(start, end)
            .into_iter()
            .map(|date| {
                let (total_amount, transaction_count) =
                    totals.get(&date).copied().unwrap_or((0.0, 0));
                DailyPoint {
                    date,
                    total_amount,
                    transaction_count,
                }
            })
            .collect();

        Self { points, origin }
    }

    pub fn points(&self) -> &[DailyPoint] {
        &self.points
    }

    pub fn origin(&self) -> SeriesOrigin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn amounts(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.total_amount).collect()
    }

    pub fn counts(&self) -> Vec<f64> {
        self.points
            .iter()
            .map(|p| p.transaction_count as f64)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub series: DailySeries,
    pub warnings: Vec<String>,
}

/// Turns unordered transactions into a gap-free daily series.
pub struct DailyAggregator {
    type_filter: Option<String>,
    fallback_start: NaiveDate,
    fallback_end: NaiveDate,
}

impl DailyAggregator {
    pub fn new(
        type_filter: Option<String>,
        fallback_start: NaiveDate,
        fallback_end: NaiveDate,
    ) -> Self {
        Self {
            type_filter,
            fallback_start,
            fallback_end,
        }
    }

    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self::new(
            config.type_filter.clone(),
            config.fallback_start,
            config.fallback_end,
        )
    }

    pub fn aggregate(&self, transactions: &[Transaction]) -> Aggregation {
        let mut warnings = Vec::new();
        let eligible = self.filter(transactions, &mut warnings);

        let mut totals: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
        for tx in &eligible {
            let entry = totals.entry(tx.date).or_insert((0.0, 0));
            entry.0 += tx.amount;
            entry.1 += 1;
        }

        let range = totals
            .keys()
            .next()
            .copied()
            .zip(totals.keys().next_back().copied());

        let series = match range {
            Some((start, end)) => {
                debug!(
                    "Aggregated {} transactions into {} active days between {} and {}",
                    eligible.len(),
                    totals.len(),
                    start,
                    end
                );
                DailySeries::from_totals(&totals, start, end, SeriesOrigin::Observed)
            }
            None => {
                let message = format!(
                    "No eligible transactions; using an all-zero series from {} to {}",
                    self.fallback_start, self.fallback_end
                );
                warn!("{}", message);
                warnings.push(message);
                DailySeries::from_totals(
                    &totals,
                    self.fallback_start,
                    self.fallback_end,
                    SeriesOrigin::Fallback,
                )
            }
        };

        Aggregation { series, warnings }
    }

    fn filter<'t>(
        &self,
        transactions: &'t [Transaction],
        warnings: &mut Vec<String>,
    ) -> Vec<&'t Transaction> {
        let Some(wanted) = self.type_filter.as_deref() else {
            return transactions.iter().collect();
        };

        let has_categories = transactions.iter().any(|tx| tx.kind.is_some());
        if !has_categories {
            if !transactions.is_empty() {
                let message = format!(
                    "No transaction carries a category; treating all {} as {}",
                    transactions.len(),
                    wanted
                );
                warn!("{}", message);
                warnings.push(message);
            }
            return transactions.iter().collect();
        }

        transactions
            .iter()
            .filter(|tx| {
                tx.kind
                    .as_deref()
                    .is_some_and(|k| k.trim().eq_ignore_ascii_case(wanted))
            })
            .collect()
    }
}
