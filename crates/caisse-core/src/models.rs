//! Domain models for Caisse

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fallback category used when automatic classification fails or is unavailable
pub const FALLBACK_CATEGORY: &str = "Autres";

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(format!("Unknown transaction kind: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A financial transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub owner_id: i64,
    pub description: String,
    /// Always positive; direction is carried by `kind`
    pub amount: f64,
    pub kind: TransactionKind,
    pub category: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new transaction to be inserted (category already resolved)
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub description: String,
    pub amount: f64,
    pub kind: TransactionKind,
    pub category: String,
    pub date: NaiveDate,
}

/// Caller-supplied transaction draft; category is optional and resolved
/// by the classifier when absent
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDraft {
    pub description: String,
    pub amount: f64,
    pub kind: TransactionKind,
    pub category: Option<String>,
    pub date: NaiveDate,
}

/// Field-level partial update for a transaction
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionPatch {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub kind: Option<TransactionKind>,
    pub category: Option<String>,
    pub date: Option<NaiveDate>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.amount.is_none()
            && self.kind.is_none()
            && self.category.is_none()
            && self.date.is_none()
    }
}

/// Optional filters for transaction listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    pub kind: Option<TransactionKind>,
    pub category: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// One extracted receipt line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub label: String,
    pub amount: f64,
}

/// Structured payload stored with each ticket.
///
/// Serialized field names match the persisted blob layout
/// (`raw_text` / `processed_items`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketPayload {
    #[serde(rename = "raw_text")]
    pub raw_lines: Vec<String>,
    pub items: Vec<LineItem>,
    pub filename: Option<String>,
    pub processed: bool,
    #[serde(rename = "processed_items")]
    pub consumed: BTreeSet<usize>,
}

impl TicketPayload {
    /// Indices of items not yet turned into transactions, in item order
    pub fn remaining_indices(&self) -> Vec<usize> {
        (0..self.items.len())
            .filter(|i| !self.consumed.contains(i))
            .collect()
    }

    pub fn is_fully_consumed(&self) -> bool {
        self.consumed.len() == self.items.len()
    }

    /// Extend the consumed set, rejecting out-of-range or already
    /// consumed indices. Keeps `consumed ⊆ [0, items.len())`.
    pub fn consume(&mut self, indices: &[usize]) -> Result<()> {
        for &idx in indices {
            if idx >= self.items.len() {
                return Err(Error::Validation(format!(
                    "Item index {} out of range (ticket has {} items)",
                    idx,
                    self.items.len()
                )));
            }
            if self.consumed.contains(&idx) {
                return Err(Error::Validation(format!(
                    "Item index {} already consumed",
                    idx
                )));
            }
        }
        self.consumed.extend(indices.iter().copied());
        Ok(())
    }
}

/// A persisted receipt: raw OCR content, extracted items, and the
/// consumption ledger tracking which items already produced transactions
#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: i64,
    pub owner_id: i64,
    /// At most one transaction; set only through the reconciliation engine
    pub transaction_id: Option<i64>,
    pub mime_type: String,
    pub storage_ref: String,
    pub size_bytes: i64,
    pub payload: TicketPayload,
    pub created_at: DateTime<Utc>,
}

/// A new ticket row to be inserted
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub transaction_id: Option<i64>,
    pub mime_type: String,
    pub storage_ref: String,
    pub size_bytes: i64,
    pub payload: TicketPayload,
}

/// A ticket attachment supplied when creating a transaction
#[derive(Debug, Clone)]
pub enum TicketAttachment {
    /// Link an already ingested ticket (must be unlinked and owned by the caller)
    Existing { ticket_id: i64 },
    /// Create a brand-new ticket row bound to the transaction (no OCR)
    New {
        mime_type: String,
        storage_ref: String,
        size_bytes: i64,
    },
}

/// One item of a ticket with its consumption status
#[derive(Debug, Clone, Serialize)]
pub struct TicketItemStatus {
    pub label: String,
    pub amount: f64,
    pub index: usize,
    pub processed: bool,
}

/// Item listing for a ticket
#[derive(Debug, Clone, Serialize)]
pub struct TicketItems {
    pub ticket_id: i64,
    pub items: Vec<TicketItemStatus>,
    pub total_items: usize,
    pub processed_count: usize,
    pub remaining_count: usize,
}

/// A standing per-category monthly spending policy
#[derive(Debug, Clone, Serialize)]
pub struct Budget {
    pub id: i64,
    pub owner_id: i64,
    pub category: String,
    pub monthly_limit: f64,
    /// Percent in [0, 100] at which a near-limit alert is raised
    pub notification_threshold: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new budget to be created
#[derive(Debug, Clone, Deserialize)]
pub struct NewBudget {
    pub category: String,
    pub monthly_limit: f64,
    pub notification_threshold: f64,
}

/// Field-level partial update for a budget
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BudgetPatch {
    pub category: Option<String>,
    pub monthly_limit: Option<f64>,
    pub notification_threshold: Option<f64>,
}

/// Spending vs. limit for one budget over a period
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub id: i64,
    pub category: String,
    pub monthly_limit: f64,
    pub current_spending: f64,
    pub percentage_used: f64,
    pub notification_threshold: f64,
    pub is_over_budget: bool,
    pub is_near_limit: bool,
}

/// Period-scoped income/expense totals
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub transaction_count: i64,
    pub month: String,
}

/// Per-category expense breakdown for a period
#[derive(Debug, Clone, Serialize)]
pub struct CategoryAnalysis {
    pub category: String,
    pub total_amount: f64,
    pub transaction_count: i64,
    pub percentage_of_expenses: f64,
}

/// A half-open calendar-month date range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// Build the period for a given calendar month
    pub fn for_month(year: i32, month: u32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| Error::Validation(format!("Invalid month: {}-{:02}", year, month)))?;
        // December rolls over to January of the next year
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| Error::Validation(format!("Invalid month: {}-{:02}", year, month)))?;
        Ok(Self { start, end })
    }

    /// Parse a strict `YYYY-MM` month string
    pub fn from_month_str(month: &str) -> Result<Self> {
        let invalid = || Error::Validation("Invalid month format, expected YYYY-MM".to_string());
        let (year_s, month_s) = month.split_once('-').ok_or_else(invalid)?;
        if year_s.len() != 4 || month_s.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year_s.parse().map_err(|_| invalid())?;
        let month: u32 = month_s.parse().map_err(|_| invalid())?;
        Self::for_month(year, month)
    }

    /// The calendar month containing `today`
    pub fn current_month(today: NaiveDate) -> Self {
        // A valid date always yields a valid month period
        Self::for_month(today.year(), today.month()).unwrap_or(Self {
            start: today,
            end: today,
        })
    }

    /// Resolve an optional `YYYY-MM` parameter, defaulting to the current month
    pub fn resolve(month: Option<&str>, today: NaiveDate) -> Result<Self> {
        match month {
            Some(m) => Self::from_month_str(m),
            None => Ok(Self::current_month(today)),
        }
    }

    /// `YYYY-MM` label for this period
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.start.year(), self.start.month())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_month_parse() {
        let p = Period::from_month_str("2024-02").unwrap();
        assert_eq!(p.start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(p.end, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(p.label(), "2024-02");
    }

    #[test]
    fn test_period_december_rollover() {
        let p = Period::from_month_str("2024-12").unwrap();
        assert_eq!(p.end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn test_period_rejects_bad_months() {
        assert!(Period::from_month_str("2024-13").is_err());
        assert!(Period::from_month_str("2024-00").is_err());
        assert!(Period::from_month_str("2024").is_err());
        assert!(Period::from_month_str("24-01").is_err());
        assert!(Period::from_month_str("2024-1").is_err());
        assert!(Period::from_month_str("not-a-month").is_err());
    }

    #[test]
    fn test_payload_consume_bounds() {
        let mut payload = TicketPayload {
            items: vec![
                LineItem {
                    label: "Pain".into(),
                    amount: 2.5,
                },
                LineItem {
                    label: "Lait".into(),
                    amount: 1.2,
                },
            ],
            ..Default::default()
        };

        payload.consume(&[0]).unwrap();
        assert!(!payload.is_fully_consumed());
        assert_eq!(payload.remaining_indices(), vec![1]);

        // Out of range and double consumption are rejected
        assert!(payload.consume(&[2]).is_err());
        assert!(payload.consume(&[0]).is_err());

        payload.consume(&[1]).unwrap();
        assert!(payload.is_fully_consumed());
    }

    #[test]
    fn test_payload_consume_is_atomic_on_error() {
        let mut payload = TicketPayload {
            items: vec![LineItem {
                label: "Pain".into(),
                amount: 2.5,
            }],
            ..Default::default()
        };

        // One valid + one invalid index: nothing is consumed
        assert!(payload.consume(&[0, 5]).is_err());
        assert!(payload.consumed.is_empty());
    }

    #[test]
    fn test_kind_round_trip() {
        assert_eq!("income".parse::<TransactionKind>().unwrap(), TransactionKind::Income);
        assert_eq!(TransactionKind::Expense.as_str(), "expense");
        assert!("transfer".parse::<TransactionKind>().is_err());
    }
}
