use crate::schema::{RawTransaction, Transaction, TransactionType};
use crate::utils::parse_transaction_date;
use log::debug;
use serde_json::Value;

/// Outcome of validating a raw request body.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub transactions: Vec<Transaction>,
    pub skipped: usize,
    pub income_count: usize,
    pub expense_count: usize,
}

/// Validates and normalizes raw transaction rows.
///
/// - the category defaults to EXPENSE and is upper-cased; unknown labels become EXPENSE
/// - dates must be strings that parse (see [`parse_transaction_date`])
/// - amounts must be finite and strictly positive (numbers or numeric strings)
///
/// Invalid rows are skipped and counted, never reported as errors.
pub fn normalize_transactions(raw: &[RawTransaction]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (idx, row) in raw.iter().enumerate() {
        let date = match row.date.as_str().map(parse_transaction_date) {
            Some(Ok(date)) => date,
            Some(Err(e)) => {
                debug!("Skipping transaction #{}: {}", idx, e);
                batch.skipped += 1;
                continue;
            }
            None => {
                debug!("Skipping transaction #{}: date {} is not a string", idx, row.date);
                batch.skipped += 1;
                continue;
            }
        };

        let amount = match parse_amount(&row.amount) {
            Some(amount) if amount > 0.0 => amount,
            _ => {
                debug!(
                    "Skipping transaction #{}: invalid amount {}",
                    idx, row.amount
                );
                batch.skipped += 1;
                continue;
            }
        };

        let kind = normalize_type(row.kind.as_deref());
        match kind {
            TransactionType::Income => batch.income_count += 1,
            TransactionType::Expense => batch.expense_count += 1,
        }

        batch
            .transactions
            .push(Transaction::new(date, amount, Some(kind.as_str())));
    }

    batch
}

fn normalize_type(label: Option<&str>) -> TransactionType {
    match label {
        Some(l) if TransactionType::Income.matches(l) => TransactionType::Income,
        _ => TransactionType::Expense,
    }
}

fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}
