//! Transaction operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, Transaction, TransactionPatch, TransactionQuery};

const TRANSACTION_COLUMNS: &str =
    "id, owner_id, description, amount, kind, category, date, created_at, updated_at";

impl Database {
    /// Insert a transaction for an owner
    ///
    /// This is the materialization point: amounts must be strictly positive.
    pub fn insert_transaction(&self, owner_id: i64, tx: &NewTransaction) -> Result<i64> {
        validate_new_transaction(tx)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transactions (owner_id, description, amount, kind, category, date)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                owner_id,
                tx.description,
                tx.amount,
                tx.kind.as_str(),
                tx.category,
                tx.date.to_string(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a batch of transactions as one atomic unit
    ///
    /// All rows commit together or none do.
    pub fn insert_transactions_bulk(
        &self,
        owner_id: i64,
        txs: &[NewTransaction],
    ) -> Result<Vec<i64>> {
        for tx in txs {
            validate_new_transaction(tx)?;
        }

        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;

        let mut ids = Vec::with_capacity(txs.len());
        for tx in txs {
            db_tx.execute(
                "INSERT INTO transactions (owner_id, description, amount, kind, category, date)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    owner_id,
                    tx.description,
                    tx.amount,
                    tx.kind.as_str(),
                    tx.category,
                    tx.date.to_string(),
                ],
            )?;
            ids.push(db_tx.last_insert_rowid());
        }

        db_tx.commit()?;
        Ok(ids)
    }

    /// Get a transaction owned by the caller
    pub fn get_owned_transaction(&self, owner_id: i64, id: i64) -> Result<Transaction> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE id = ? AND owner_id = ?",
            TRANSACTION_COLUMNS
        ))?;

        stmt.query_row(params![id, owner_id], row_to_transaction)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Transaction {} not found", id)))
    }

    /// List an owner's transactions with optional filters
    pub fn list_transactions(
        &self,
        owner_id: i64,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;

        // Build dynamic WHERE clause
        let mut conditions = vec!["owner_id = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner_id)];

        if let Some(kind) = query.kind {
            conditions.push("kind = ?".to_string());
            params.push(Box::new(kind.as_str()));
        }
        if let Some(category) = &query.category {
            conditions.push("category = ?".to_string());
            params.push(Box::new(category.clone()));
        }
        if let Some(from) = query.date_from {
            conditions.push("date >= ?".to_string());
            params.push(Box::new(from.to_string()));
        }
        if let Some(to) = query.date_to {
            conditions.push("date <= ?".to_string());
            params.push(Box::new(to.to_string()));
        }

        let sql = format!(
            "SELECT {} FROM transactions WHERE {} ORDER BY date DESC, id DESC",
            TRANSACTION_COLUMNS,
            conditions.join(" AND ")
        );

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let transactions = stmt
            .query_map(param_refs.as_slice(), row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Apply a field-level partial update, returning the updated row
    pub fn update_transaction_fields(
        &self,
        owner_id: i64,
        id: i64,
        patch: &TransactionPatch,
    ) -> Result<Transaction> {
        if patch.is_empty() {
            return self.get_owned_transaction(owner_id, id);
        }

        if let Some(amount) = patch.amount {
            if amount <= 0.0 {
                return Err(Error::Validation("Amount must be positive".to_string()));
            }
        }

        let conn = self.conn()?;

        let mut sets = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(description) = &patch.description {
            sets.push("description = ?");
            params.push(Box::new(description.clone()));
        }
        if let Some(amount) = patch.amount {
            sets.push("amount = ?");
            params.push(Box::new(amount));
        }
        if let Some(kind) = patch.kind {
            sets.push("kind = ?");
            params.push(Box::new(kind.as_str()));
        }
        if let Some(category) = &patch.category {
            sets.push("category = ?");
            params.push(Box::new(category.clone()));
        }
        if let Some(date) = patch.date {
            sets.push("date = ?");
            params.push(Box::new(date.to_string()));
        }
        sets.push("updated_at = CURRENT_TIMESTAMP");

        let sql = format!(
            "UPDATE transactions SET {} WHERE id = ? AND owner_id = ?",
            sets.join(", ")
        );
        params.push(Box::new(id));
        params.push(Box::new(owner_id));

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let updated = conn.execute(&sql, param_refs.as_slice())?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Transaction {} not found", id)));
        }

        drop(conn);
        self.get_owned_transaction(owner_id, id)
    }

    /// Overwrite a transaction's category
    pub fn set_transaction_category(&self, owner_id: i64, id: i64, category: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE transactions SET category = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND owner_id = ?",
            params![category, id, owner_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Transaction {} not found", id)));
        }
        Ok(())
    }

    /// Delete a transaction and all its attached tickets as one atomic unit
    pub fn delete_transaction(&self, owner_id: i64, id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;

        // Attached tickets are scoped to their transaction: cascade, not unlink
        db_tx.execute(
            "DELETE FROM tickets WHERE transaction_id = ?",
            params![id],
        )?;

        let deleted = db_tx.execute(
            "DELETE FROM transactions WHERE id = ? AND owner_id = ?",
            params![id, owner_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Transaction {} not found", id)));
        }

        db_tx.commit()?;
        Ok(())
    }
}

pub(super) fn validate_new_transaction(tx: &NewTransaction) -> Result<()> {
    if tx.amount <= 0.0 {
        return Err(Error::Validation("Amount must be positive".to_string()));
    }
    if tx.description.trim().is_empty() {
        return Err(Error::Validation("Description must not be empty".to_string()));
    }
    Ok(())
}

pub(super) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let kind_str: String = row.get(4)?;
    let date_str: String = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    Ok(Transaction {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        description: row.get(2)?,
        amount: row.get(3)?,
        kind: kind_str.parse().unwrap_or(crate::models::TransactionKind::Expense),
        category: row.get(5)?,
        date: chrono::NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| chrono::Utc::now().date_naive()),
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}
