//! Transaction handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{extract_owner, AppError, AppState, SuccessResponse};
use caisse_core::{
    Ticket, TicketAttachment, Transaction, TransactionDraft, TransactionKind, TransactionPatch,
    TransactionQuery,
};

/// Request body for creating a transaction
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub description: String,
    pub amount: f64,
    pub kind: TransactionKind,
    /// Resolved by the classifier when absent
    pub category: Option<String>,
    pub date: NaiveDate,
    /// Already ingested tickets to link in the same atomic unit
    #[serde(default)]
    pub ticket_ids: Vec<i64>,
}

impl CreateTransactionRequest {
    fn into_parts(self) -> (TransactionDraft, Vec<TicketAttachment>) {
        let attachments = self
            .ticket_ids
            .iter()
            .map(|&ticket_id| TicketAttachment::Existing { ticket_id })
            .collect();
        let draft = TransactionDraft {
            description: self.description,
            amount: self.amount,
            kind: self.kind,
            category: self.category,
            date: self.date,
        };
        (draft, attachments)
    }
}

/// GET /api/transactions - List transactions with optional filters
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransactionQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let transactions = state.db.list_transactions(owner_id, &query)?;
    Ok(Json(transactions))
}

/// POST /api/transactions - Create a transaction, classifying a missing
/// category and linking tickets atomically
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<Json<Transaction>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let (draft, attachments) = req.into_parts();
    let transaction = state
        .reconciler
        .create_transaction(owner_id, draft, &attachments)
        .await?;
    Ok(Json(transaction))
}

/// POST /api/transactions/bulk - Create a batch of transactions as one
/// all-or-nothing insert
pub async fn create_transactions_bulk(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(drafts): Json<Vec<TransactionDraft>>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    if drafts.is_empty() {
        return Err(AppError::bad_request("Empty transaction batch"));
    }
    let transactions = state
        .reconciler
        .create_transactions_bulk(owner_id, drafts)
        .await?;
    Ok(Json(transactions))
}

/// GET /api/transactions/:id - Get a single transaction
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Transaction>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let transaction = state.db.get_owned_transaction(owner_id, id)?;
    Ok(Json(transaction))
}

/// PATCH /api/transactions/:id - Partial update; a new description
/// without an explicit category triggers reclassification
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(patch): Json<TransactionPatch>,
) -> Result<Json<Transaction>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let transaction = state.reconciler.update_transaction(owner_id, id, patch).await?;
    Ok(Json(transaction))
}

/// DELETE /api/transactions/:id - Delete a transaction and its tickets
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    state.reconciler.delete_transaction(owner_id, id)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/transactions/:id/reclassify - Re-run classification on the
/// stored description; classifier failures surface to the caller
pub async fn reclassify_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Transaction>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let transaction = state.reconciler.reclassify(owner_id, id).await?;
    Ok(Json(transaction))
}

/// GET /api/transactions/:id/tickets - Tickets attached to a transaction
pub async fn get_transaction_tickets(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    // Surface NotFound for a missing transaction rather than an empty list
    state.db.get_owned_transaction(owner_id, id)?;
    let tickets = state.db.get_tickets_for_transaction(owner_id, id)?;
    Ok(Json(tickets))
}
