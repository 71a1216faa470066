//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod budgets;
pub mod categories;
pub mod dashboard;
pub mod tickets;
pub mod transactions;

// Re-export all handlers for use in router
pub use budgets::*;
pub use categories::*;
pub use dashboard::*;
pub use tickets::*;
pub use transactions::*;

use axum::Json;

/// GET /api/health - Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
