//! Budget operations
//!
//! At most one budget per (owner, category); duplicates are a `Conflict`.

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Budget, BudgetPatch, NewBudget};

const BUDGET_COLUMNS: &str =
    "id, owner_id, category, monthly_limit, notification_threshold, created_at, updated_at";

impl Database {
    /// Create a budget for an owner
    pub fn create_budget(&self, owner_id: i64, budget: &NewBudget) -> Result<Budget> {
        validate_limit(budget.monthly_limit)?;
        validate_threshold(budget.notification_threshold)?;
        if budget.category.trim().is_empty() {
            return Err(Error::Validation("Category must not be empty".to_string()));
        }

        let conn = self.conn()?;
        if self.budget_exists(&conn, owner_id, &budget.category)? {
            return Err(Error::Conflict(format!(
                "A budget already exists for category '{}'",
                budget.category
            )));
        }

        conn.execute(
            "INSERT INTO budgets (owner_id, category, monthly_limit, notification_threshold)
             VALUES (?, ?, ?, ?)",
            params![
                owner_id,
                budget.category,
                budget.monthly_limit,
                budget.notification_threshold,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_owned_budget(owner_id, id)
    }

    /// Get a budget owned by the caller
    pub fn get_owned_budget(&self, owner_id: i64, id: i64) -> Result<Budget> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM budgets WHERE id = ? AND owner_id = ?",
            BUDGET_COLUMNS
        ))?;

        stmt.query_row(params![id, owner_id], row_to_budget)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Budget {} not found", id)))
    }

    /// List all of an owner's budgets
    pub fn list_budgets(&self, owner_id: i64) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM budgets WHERE owner_id = ? ORDER BY category ASC",
            BUDGET_COLUMNS
        ))?;

        let budgets = stmt
            .query_map(params![owner_id], row_to_budget)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(budgets)
    }

    /// Apply a field-level partial update, returning the updated budget
    pub fn update_budget(&self, owner_id: i64, id: i64, patch: &BudgetPatch) -> Result<Budget> {
        if let Some(limit) = patch.monthly_limit {
            validate_limit(limit)?;
        }
        if let Some(threshold) = patch.notification_threshold {
            validate_threshold(threshold)?;
        }

        let existing = self.get_owned_budget(owner_id, id)?;

        let conn = self.conn()?;

        // Renaming onto another budget's category is a conflict
        if let Some(category) = &patch.category {
            if category != &existing.category && self.budget_exists(&conn, owner_id, category)? {
                return Err(Error::Conflict(format!(
                    "A budget already exists for category '{}'",
                    category
                )));
            }
        }

        conn.execute(
            "UPDATE budgets SET category = ?, monthly_limit = ?, notification_threshold = ?,
             updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND owner_id = ?",
            params![
                patch.category.as_deref().unwrap_or(&existing.category),
                patch.monthly_limit.unwrap_or(existing.monthly_limit),
                patch
                    .notification_threshold
                    .unwrap_or(existing.notification_threshold),
                id,
                owner_id,
            ],
        )?;
        drop(conn);

        self.get_owned_budget(owner_id, id)
    }

    /// Delete a budget
    pub fn delete_budget(&self, owner_id: i64, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM budgets WHERE id = ? AND owner_id = ?",
            params![id, owner_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Budget {} not found", id)));
        }
        Ok(())
    }

    fn budget_exists(
        &self,
        conn: &rusqlite::Connection,
        owner_id: i64,
        category: &str,
    ) -> Result<bool> {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM budgets WHERE owner_id = ? AND category = ?",
                params![owner_id, category],
                |row| row.get(0),
            )
            .optional()?;
        Ok(existing.is_some())
    }
}

fn validate_limit(limit: f64) -> Result<()> {
    if limit <= 0.0 {
        return Err(Error::Validation("Monthly limit must be positive".to_string()));
    }
    Ok(())
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&threshold) {
        return Err(Error::Validation(
            "Notification threshold must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}

fn row_to_budget(row: &rusqlite::Row) -> rusqlite::Result<Budget> {
    let created_at_str: String = row.get(5)?;
    let updated_at_str: String = row.get(6)?;

    Ok(Budget {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        category: row.get(2)?,
        monthly_limit: row.get(3)?,
        notification_threshold: row.get(4)?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}
