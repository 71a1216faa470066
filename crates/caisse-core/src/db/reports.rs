//! Budget status, dashboard summary, and category analysis
//!
//! Pure readers over the transaction stream. Periods are half-open
//! calendar-month ranges `[start, end)`.

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::{BudgetStatus, CategoryAnalysis, DashboardSummary, Period, TransactionKind};

impl Database {
    /// Per-budget spending vs. limit for the given period
    ///
    /// Emits one row per budget even when spending is zero. A
    /// non-positive limit yields `percentage_used = 0` (no division).
    pub fn budget_status(&self, owner_id: i64, period: Period) -> Result<Vec<BudgetStatus>> {
        let budgets = self.list_budgets(owner_id)?;
        let conn = self.conn()?;

        let mut statuses = Vec::with_capacity(budgets.len());
        for budget in budgets {
            let current_spending: f64 = conn.query_row(
                "SELECT COALESCE(SUM(amount), 0) FROM transactions
                 WHERE owner_id = ? AND kind = 'expense' AND category = ?
                   AND date >= ? AND date < ?",
                params![
                    owner_id,
                    budget.category,
                    period.start.to_string(),
                    period.end.to_string(),
                ],
                |row| row.get(0),
            )?;

            let percentage_used = if budget.monthly_limit > 0.0 {
                current_spending / budget.monthly_limit * 100.0
            } else {
                0.0
            };

            statuses.push(BudgetStatus {
                id: budget.id,
                category: budget.category,
                monthly_limit: round2(budget.monthly_limit),
                current_spending: round2(current_spending),
                percentage_used: round2(percentage_used),
                notification_threshold: budget.notification_threshold,
                is_over_budget: current_spending > budget.monthly_limit,
                is_near_limit: percentage_used >= budget.notification_threshold,
            });
        }

        Ok(statuses)
    }

    /// Income/expense totals and transaction count for the period
    pub fn dashboard_summary(&self, owner_id: i64, period: Period) -> Result<DashboardSummary> {
        let conn = self.conn()?;

        let total_income = self.sum_by_kind(&conn, owner_id, TransactionKind::Income, period)?;
        let total_expenses = self.sum_by_kind(&conn, owner_id, TransactionKind::Expense, period)?;

        let transaction_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions
             WHERE owner_id = ? AND date >= ? AND date < ?",
            params![owner_id, period.start.to_string(), period.end.to_string()],
            |row| row.get(0),
        )?;

        Ok(DashboardSummary {
            total_income: round2(total_income),
            total_expenses: round2(total_expenses),
            balance: round2(total_income - total_expenses),
            transaction_count,
            month: period.label(),
        })
    }

    /// Expense breakdown by category for the period
    ///
    /// Sorted by total descending; ties broken by category name for
    /// determinism. Percentages are 0 when total expenses are zero.
    pub fn category_analysis(&self, owner_id: i64, period: Period) -> Result<Vec<CategoryAnalysis>> {
        let conn = self.conn()?;

        let total_expenses = self.sum_by_kind(&conn, owner_id, TransactionKind::Expense, period)?;

        let mut stmt = conn.prepare(
            "SELECT category, SUM(amount) AS total_amount, COUNT(*) AS transaction_count
             FROM transactions
             WHERE owner_id = ? AND kind = 'expense' AND date >= ? AND date < ?
             GROUP BY category
             ORDER BY total_amount DESC, category ASC",
        )?;

        let rows = stmt
            .query_map(
                params![owner_id, period.start.to_string(), period.end.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let analysis = rows
            .into_iter()
            .map(|(category, total_amount, transaction_count)| {
                let percentage = if total_expenses > 0.0 {
                    total_amount / total_expenses * 100.0
                } else {
                    0.0
                };
                CategoryAnalysis {
                    category,
                    total_amount: round2(total_amount),
                    transaction_count,
                    percentage_of_expenses: round2(percentage),
                }
            })
            .collect();

        Ok(analysis)
    }

    fn sum_by_kind(
        &self,
        conn: &rusqlite::Connection,
        owner_id: i64,
        kind: TransactionKind,
        period: Period,
    ) -> Result<f64> {
        let sum: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions
             WHERE owner_id = ? AND kind = ? AND date >= ? AND date < ?",
            params![
                owner_id,
                kind.as_str(),
                period.start.to_string(),
                period.end.to_string(),
            ],
            |row| row.get(0),
        )?;
        Ok(sum)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
