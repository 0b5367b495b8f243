use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    #[schemars(description = "Money leaving the account. The forecast target.")]
    Expense,

    #[schemars(description = "Money entering the account.")]
    Income,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Expense => "EXPENSE",
            TransactionType::Income => "INCOME",
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(label.trim())
    }
}

/// A validated transaction. `kind` is `None` when the source carried no category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub amount: f64,
    pub kind: Option<String>,
}

impl Transaction {
    pub fn new(date: NaiveDate, amount: f64, kind: Option<&str>) -> Self {
        Self {
            date,
            amount,
            kind: kind.map(|k| k.to_string()),
        }
    }

    pub fn expense(date: NaiveDate, amount: f64) -> Self {
        Self::new(date, amount, Some(TransactionType::Expense.as_str()))
    }

    pub fn income(date: NaiveDate, amount: f64) -> Self {
        Self::new(date, amount, Some(TransactionType::Income.as_str()))
    }
}

/// A transaction exactly as it arrives in the request body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawTransaction {
    #[serde(alias = "Date", default)]
    #[schemars(description = "Transaction date as YYYY-MM-DD or an ISO-8601 timestamp")]
    pub date: serde_json::Value,

    #[serde(alias = "Amount", default)]
    #[schemars(description = "Transaction amount. A JSON number or a numeric string; must be positive.")]
    pub amount: serde_json::Value,

    #[serde(alias = "Type", default, rename = "type")]
    #[schemars(description = "Optional category label, EXPENSE or INCOME (case-insensitive)")]
    pub kind: Option<String>,
}

/// Requested forecast cadence. Controls how many points are produced and how
/// far apart they are.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    #[schemars(description = "7 consecutive days")]
    Daily,

    #[default]
    #[schemars(description = "4 points, one week apart")]
    Weekly,

    #[schemars(description = "3 points, 30 days apart")]
    Monthly,
}

impl Cadence {
    pub fn periods(&self) -> usize {
        match self {
            Cadence::Daily => 7,
            Cadence::Weekly => 4,
            Cadence::Monthly => 3,
        }
    }

    pub fn step_days(&self) -> u64 {
        match self {
            Cadence::Daily => 1,
            Cadence::Weekly => 7,
            Cadence::Monthly => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            "monthly" => Ok(Cadence::Monthly),
            other => Err(ForecastError::InvalidRequest(format!(
                "Unknown forecast mode '{}'. Expected daily, weekly or monthly",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForecastRequest {
    #[schemars(description = "Historical transactions. At least 7 valid rows are required.")]
    pub transactions: Vec<RawTransaction>,

    #[serde(default)]
    #[schemars(description = "Forecast cadence: daily, weekly (default) or monthly")]
    pub mode: Cadence,
}

impl ForecastRequest {
    pub fn new(transactions: Vec<RawTransaction>, mode: Cadence) -> Self {
        Self { transactions, mode }
    }

    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ForecastRequest)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

impl RawTransaction {
    pub fn new(date: &str, amount: f64, kind: Option<&str>) -> Self {
        Self {
            date: serde_json::json!(date),
            amount: serde_json::json!(amount),
            kind: kind.map(|k| k.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_periods_and_steps() {
        assert_eq!(Cadence::Daily.periods(), 7);
        assert_eq!(Cadence::Weekly.periods(), 4);
        assert_eq!(Cadence::Monthly.periods(), 3);
        assert_eq!(Cadence::Weekly.step_days(), 7);
        assert_eq!("WEEKLY".parse::<Cadence>().unwrap(), Cadence::Weekly);
        assert!("hourly".parse::<Cadence>().is_err());
    }

    #[test]
    fn test_request_deserializes_both_key_styles() {
        let body = r#"{
            "transactions": [
                {"Date": "2025-07-01", "Amount": 25000, "Type": "expense"},
                {"date": "2025-07-02", "amount": "12000.5"}
            ],
            "mode": "daily"
        }"#;
        let request = ForecastRequest::from_json(body).unwrap();
        assert_eq!(request.mode, Cadence::Daily);
        assert_eq!(request.transactions.len(), 2);
        assert_eq!(request.transactions[0].kind.as_deref(), Some("expense"));
        assert!(request.transactions[1].kind.is_none());
    }

    #[test]
    fn test_malformed_rows_still_decode() {
        let body = r#"{
            "transactions": [
                {"Date": null, "Amount": 100},
                {"Date": "2025-08-03"},
                {"Amount": 250, "Type": "EXPENSE"},
                {"Date": 20250804, "Amount": 300}
            ]
        }"#;
        let request = ForecastRequest::from_json(body).unwrap();
        assert_eq!(request.transactions.len(), 4);
        assert!(request.transactions[0].date.is_null());
        assert!(request.transactions[1].amount.is_null());
        assert!(request.transactions[2].date.is_null());
    }

    #[test]
    fn test_request_mode_defaults_to_weekly() {
        let request = ForecastRequest::from_json(r#"{"transactions": []}"#).unwrap();
        assert_eq!(request.mode, Cadence::Weekly);
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = ForecastRequest::schema_as_json().unwrap();
        assert!(schema_json.contains("transactions"));
        assert!(schema_json.contains("mode"));
    }

    #[test]
    fn test_transaction_type_matching() {
        assert!(TransactionType::Expense.matches(" expense "));
        assert!(!TransactionType::Income.matches("EXPENSE"));
    }
}
