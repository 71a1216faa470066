//! Caisse Core Library
//!
//! Shared functionality for the Caisse personal finance tracker:
//! - Database access and migrations (SQLCipher-encrypted SQLite)
//! - Receipt ("ticket") ingestion: OCR, normalization, item extraction
//! - Reconciliation engine linking tickets to transactions
//! - Pluggable OCR and classifier sidecar clients with mocks
//! - Budget monitoring and dashboard aggregation

pub mod classify;
pub mod db;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod reconcile;

pub use classify::{
    CategoryOutcome, Classifier, ClassifierClient, MockClassifier, RemoteClassifier,
};
pub use db::Database;
pub use error::{Error, Result};
pub use ingest::{IngestResult, TicketIngestor};
pub use models::{
    Budget, BudgetPatch, BudgetStatus, CategoryAnalysis, DashboardSummary, LineItem, NewBudget,
    NewTicket, NewTransaction, Period, Ticket, TicketAttachment, TicketItemStatus, TicketItems,
    TicketPayload, Transaction, TransactionDraft, TransactionKind, TransactionPatch,
    TransactionQuery, FALLBACK_CATEGORY,
};
pub use ocr::{MockOcrEngine, OcrClient, OcrEngine, OcrOutput, RemoteOcrEngine};
pub use reconcile::Reconciler;
