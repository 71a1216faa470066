//! Ticket ingestion and consumption-ledger handlers

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{extract_owner, AppError, AppState};
use caisse_core::{LineItem, Ticket, TicketItems, Transaction};

/// Response for a successful ticket upload
#[derive(Debug, Serialize)]
pub struct UploadTicketResponse {
    pub ticket_id: i64,
    pub raw_text: Vec<String>,
    pub items: Vec<LineItem>,
    pub message: String,
}

/// POST /api/tickets - Upload a receipt image for OCR ingestion
pub async fn upload_ticket(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadTicketResponse>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;

    let ingestor = state
        .ingestor
        .as_ref()
        .ok_or_else(|| AppError::unavailable("OCR engine not configured"))?;

    // Find the uploaded file field
    let mut upload: Option<(Option<String>, String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::bad_request("Invalid multipart body"))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().map(str::to_string);
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|_| AppError::bad_request("Failed to read uploaded file"))?;
            upload = Some((filename, mime_type, bytes.to_vec()));
            break;
        }
    }

    let (filename, mime_type, bytes) =
        upload.ok_or_else(|| AppError::bad_request("Missing 'file' field"))?;

    let result = ingestor.ingest(owner_id, filename, &mime_type, &bytes).await?;

    Ok(Json(UploadTicketResponse {
        ticket_id: result.ticket_id,
        raw_text: result.raw_lines,
        items: result.items,
        message: "Ticket processed successfully".to_string(),
    }))
}

/// GET /api/tickets/:id - Get a single ticket with its payload
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Ticket>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let ticket = state.db.get_owned_ticket(owner_id, id)?;
    Ok(Json(ticket))
}

/// GET /api/tickets/:id/items - Item listing with consumption status
pub async fn get_ticket_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<TicketItems>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let items = state.db.ticket_items(owner_id, id)?;
    Ok(Json(items))
}

/// Request body for linking a ticket to an existing transaction
#[derive(Debug, Deserialize)]
pub struct LinkTicketRequest {
    pub transaction_id: i64,
}

/// POST /api/tickets/:id/link - Link an unlinked ticket to a transaction
pub async fn link_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<LinkTicketRequest>,
) -> Result<Json<Ticket>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let ticket = state
        .reconciler
        .link_existing(owner_id, id, req.transaction_id)?;
    Ok(Json(ticket))
}

/// Request body for marking ticket items consumed without
/// materializing transactions
#[derive(Debug, Deserialize)]
pub struct ConsumeItemsRequest {
    pub indices: Vec<usize>,
}

/// POST /api/tickets/:id/consume - Mark items consumed
pub async fn consume_ticket_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<ConsumeItemsRequest>,
) -> Result<Json<Ticket>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let ticket = state.db.consume_ticket_items(owner_id, id, &req.indices)?;
    Ok(Json(ticket))
}

/// Request body for materializing remaining ticket items
#[derive(Debug, Deserialize, Default)]
pub struct MaterializeRequest {
    /// Transaction date for the created rows; defaults to today
    pub date: Option<NaiveDate>,
}

/// POST /api/tickets/:id/materialize - Turn every unconsumed item into
/// an expense transaction
pub async fn materialize_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<MaterializeRequest>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let date = req.date.unwrap_or_else(|| Utc::now().date_naive());
    let transactions = state
        .reconciler
        .materialize_remaining(owner_id, id, date)
        .await?;
    Ok(Json(transactions))
}
