//! Ticket persistence, linking, and the consumption ledger
//!
//! Linking a ticket and creating/updating its owning transaction always
//! execute as one SQL transaction; concurrent link attempts on the same
//! ticket are serialized by a conditional write on `transaction_id IS NULL`.

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{
    NewTicket, NewTransaction, Ticket, TicketAttachment, TicketItemStatus, TicketItems,
    TicketPayload,
};

const TICKET_COLUMNS: &str =
    "id, owner_id, transaction_id, mime_type, storage_ref, size_bytes, payload, created_at";

impl Database {
    /// Insert a ticket row
    pub fn insert_ticket(&self, owner_id: i64, ticket: &NewTicket) -> Result<i64> {
        let payload = serde_json::to_string(&ticket.payload)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tickets (owner_id, transaction_id, mime_type, storage_ref, size_bytes, payload)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                owner_id,
                ticket.transaction_id,
                ticket.mime_type,
                ticket.storage_ref,
                ticket.size_bytes,
                payload,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a ticket owned by the caller
    pub fn get_owned_ticket(&self, owner_id: i64, id: i64) -> Result<Ticket> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tickets WHERE id = ? AND owner_id = ?",
            TICKET_COLUMNS
        ))?;

        let row = stmt
            .query_row(params![id, owner_id], row_to_raw_ticket)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Ticket {} not found", id)))?;

        raw_to_ticket(row)
    }

    /// Get all tickets attached to a transaction
    pub fn get_tickets_for_transaction(
        &self,
        owner_id: i64,
        transaction_id: i64,
    ) -> Result<Vec<Ticket>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tickets WHERE owner_id = ? AND transaction_id = ? ORDER BY created_at ASC, id ASC",
            TICKET_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![owner_id, transaction_id], row_to_raw_ticket)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(raw_to_ticket).collect()
    }

    /// Item listing for a ticket with per-index consumption status
    pub fn ticket_items(&self, owner_id: i64, id: i64) -> Result<TicketItems> {
        let ticket = self.get_owned_ticket(owner_id, id)?;
        let payload = &ticket.payload;

        let items = payload
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| TicketItemStatus {
                label: item.label.clone(),
                amount: item.amount,
                index,
                processed: payload.consumed.contains(&index),
            })
            .collect::<Vec<_>>();

        Ok(TicketItems {
            ticket_id: ticket.id,
            total_items: items.len(),
            processed_count: payload.consumed.len(),
            remaining_count: items.len() - payload.consumed.len(),
            items,
        })
    }

    /// Link an unlinked ticket to a transaction
    ///
    /// The conditional write on `transaction_id IS NULL` serializes
    /// concurrent callers: the loser (and a caller naming a missing or
    /// foreign ticket) observes `NotFound`. These cases are deliberately
    /// indistinguishable.
    pub fn link_ticket(&self, owner_id: i64, ticket_id: i64, transaction_id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE tickets SET transaction_id = ?
             WHERE id = ? AND owner_id = ? AND transaction_id IS NULL",
            params![transaction_id, ticket_id, owner_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!(
                "Ticket {} not found or already linked",
                ticket_id
            )));
        }
        Ok(())
    }

    /// Insert a transaction and process its attachments as one atomic unit
    ///
    /// Existing tickets are linked via the conditional write; new
    /// attachments become ticket rows bound to the transaction. Any
    /// failure rolls back the whole unit, including the transaction row.
    pub fn create_transaction_with_attachments(
        &self,
        owner_id: i64,
        tx: &NewTransaction,
        attachments: &[TicketAttachment],
    ) -> Result<i64> {
        super::transactions::validate_new_transaction(tx)?;

        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;

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
        let transaction_id = db_tx.last_insert_rowid();

        for attachment in attachments {
            match attachment {
                TicketAttachment::Existing { ticket_id } => {
                    let updated = db_tx.execute(
                        "UPDATE tickets SET transaction_id = ?
                         WHERE id = ? AND owner_id = ? AND transaction_id IS NULL",
                        params![transaction_id, ticket_id, owner_id],
                    )?;
                    if updated == 0 {
                        return Err(Error::NotFound(format!(
                            "Ticket {} not found or already linked",
                            ticket_id
                        )));
                    }
                }
                TicketAttachment::New {
                    mime_type,
                    storage_ref,
                    size_bytes,
                } => {
                    let payload = serde_json::to_string(&TicketPayload::default())?;
                    db_tx.execute(
                        "INSERT INTO tickets (owner_id, transaction_id, mime_type, storage_ref, size_bytes, payload)
                         VALUES (?, ?, ?, ?, ?, ?)",
                        params![owner_id, transaction_id, mime_type, storage_ref, size_bytes, payload],
                    )?;
                }
            }
        }

        db_tx.commit()?;
        Ok(transaction_id)
    }

    /// Extend a ticket's consumed set in one SQL transaction
    ///
    /// Each index must be in range and not already consumed.
    pub fn consume_ticket_items(
        &self,
        owner_id: i64,
        ticket_id: i64,
        indices: &[usize],
    ) -> Result<Ticket> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;

        let mut payload = load_payload(&db_tx, owner_id, ticket_id)?;
        payload.consume(indices)?;
        store_payload(&db_tx, ticket_id, &payload)?;

        db_tx.commit()?;
        self.get_owned_ticket(owner_id, ticket_id)
    }

    /// Materialize ticket items into transactions, consuming their indices
    /// in the same atomic unit
    ///
    /// Consumption is re-checked inside the transaction, so a retried call
    /// can never double-create a transaction for the same index.
    pub fn materialize_ticket_items(
        &self,
        owner_id: i64,
        ticket_id: i64,
        items: &[(usize, NewTransaction)],
    ) -> Result<Vec<i64>> {
        for (_, tx) in items {
            super::transactions::validate_new_transaction(tx)?;
        }

        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;

        let mut payload = load_payload(&db_tx, owner_id, ticket_id)?;
        let indices: Vec<usize> = items.iter().map(|(i, _)| *i).collect();
        payload.consume(&indices)?;

        let mut ids = Vec::with_capacity(items.len());
        for (_, tx) in items {
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

        store_payload(&db_tx, ticket_id, &payload)?;

        db_tx.commit()?;
        Ok(ids)
    }
}

/// Load and parse a ticket payload inside an open SQL transaction
fn load_payload(
    db_tx: &rusqlite::Transaction,
    owner_id: i64,
    ticket_id: i64,
) -> Result<TicketPayload> {
    let raw: Option<String> = db_tx
        .query_row(
            "SELECT payload FROM tickets WHERE id = ? AND owner_id = ?",
            params![ticket_id, owner_id],
            |row| row.get(0),
        )
        .optional()?;

    let raw = raw.ok_or_else(|| Error::NotFound(format!("Ticket {} not found", ticket_id)))?;
    parse_payload(ticket_id, &raw)
}

fn store_payload(
    db_tx: &rusqlite::Transaction,
    ticket_id: i64,
    payload: &TicketPayload,
) -> Result<()> {
    let raw = serde_json::to_string(payload)?;
    db_tx.execute(
        "UPDATE tickets SET payload = ? WHERE id = ?",
        params![raw, ticket_id],
    )?;
    Ok(())
}

/// Parse a stored payload blob, identifying the ticket on failure
///
/// Also rejects a consumed set pointing outside the item list; valid
/// JSON can still violate the ledger invariant.
fn parse_payload(ticket_id: i64, raw: &str) -> Result<TicketPayload> {
    let payload: TicketPayload = serde_json::from_str(raw).map_err(|e| {
        Error::Internal(format!("Ticket {}: malformed stored payload: {}", ticket_id, e))
    })?;

    if let Some(&idx) = payload.consumed.iter().find(|&&i| i >= payload.items.len()) {
        return Err(Error::Internal(format!(
            "Ticket {}: malformed stored payload: consumed index {} out of range ({} items)",
            ticket_id,
            idx,
            payload.items.len()
        )));
    }

    Ok(payload)
}

struct RawTicket {
    id: i64,
    owner_id: i64,
    transaction_id: Option<i64>,
    mime_type: String,
    storage_ref: String,
    size_bytes: i64,
    payload: String,
    created_at: String,
}

fn row_to_raw_ticket(row: &rusqlite::Row) -> rusqlite::Result<RawTicket> {
    Ok(RawTicket {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        transaction_id: row.get(2)?,
        mime_type: row.get(3)?,
        storage_ref: row.get(4)?,
        size_bytes: row.get(5)?,
        payload: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn raw_to_ticket(raw: RawTicket) -> Result<Ticket> {
    let payload = parse_payload(raw.id, &raw.payload)?;
    Ok(Ticket {
        id: raw.id,
        owner_id: raw.owner_id,
        transaction_id: raw.transaction_id,
        mime_type: raw.mime_type,
        storage_ref: raw.storage_ref,
        size_bytes: raw.size_bytes,
        payload,
        created_at: parse_datetime(&raw.created_at),
    })
}
