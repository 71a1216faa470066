//! Ticket ingestion pipeline
//!
//! Upload -> OCR -> normalization -> item extraction -> persisted ticket.
//! Recognition happens before any database write, so a failed OCR call
//! leaves no trace. Extracted items are candidates only; nothing becomes
//! a transaction until the caller links or materializes explicitly.

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::extract::{extract_from_block, extract_from_lines, normalize_lines};
use crate::models::{LineItem, NewTicket, TicketPayload};
use crate::ocr::{OcrClient, OcrEngine, OcrOutput};

/// Outcome of ingesting one receipt image
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub ticket_id: i64,
    pub filename: Option<String>,
    pub raw_lines: Vec<String>,
    pub items: Vec<LineItem>,
}

/// Runs the ingestion pipeline against a database and an OCR engine
#[derive(Clone)]
pub struct TicketIngestor {
    db: Database,
    ocr: OcrClient,
}

impl TicketIngestor {
    pub fn new(db: Database, ocr: OcrClient) -> Self {
        Self { db, ocr }
    }

    /// Ingest one receipt image for an owner
    ///
    /// Rejects non-image uploads before contacting the recognizer. The
    /// stored ticket starts unlinked with an empty consumption ledger.
    pub async fn ingest(
        &self,
        owner_id: i64,
        filename: Option<String>,
        mime_type: &str,
        image: &[u8],
    ) -> Result<IngestResult> {
        if !mime_type.starts_with("image/") {
            return Err(Error::Validation(format!(
                "Unsupported content type '{}', expected an image",
                mime_type
            )));
        }
        if image.is_empty() {
            return Err(Error::Validation("Uploaded file is empty".to_string()));
        }

        let output = self.ocr.recognize(image).await?;

        let (raw_lines, items) = match output {
            OcrOutput::Block(text) => {
                let items = extract_from_block(&text);
                let lines = text.lines().map(str::to_string).collect();
                (lines, items)
            }
            OcrOutput::Lines(lines) => {
                let cleaned = normalize_lines(&lines);
                let items = extract_from_lines(&cleaned);
                (lines, items)
            }
        };
        debug!(
            lines = raw_lines.len(),
            items = items.len(),
            "Extracted receipt items"
        );

        let storage_ref = hex::encode(Sha256::digest(image));

        let payload = TicketPayload {
            raw_lines: raw_lines.clone(),
            items: items.clone(),
            filename: filename.clone(),
            processed: true,
            consumed: Default::default(),
        };

        let ticket_id = self.db.insert_ticket(
            owner_id,
            &NewTicket {
                transaction_id: None,
                mime_type: mime_type.to_string(),
                storage_ref,
                size_bytes: image.len() as i64,
                payload,
            },
        )?;

        info!(ticket_id, items = items.len(), "Ticket ingested");

        Ok(IngestResult {
            ticket_id,
            filename,
            raw_lines,
            items,
        })
    }
}
