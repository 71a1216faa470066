//! Dashboard aggregation handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;

use super::budgets::MonthQuery;
use crate::{extract_owner, AppError, AppState};
use caisse_core::{CategoryAnalysis, DashboardSummary, Period};

/// GET /api/dashboard/summary?month=YYYY-MM - Income/expense totals
pub async fn get_dashboard_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
    headers: HeaderMap,
) -> Result<Json<DashboardSummary>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let period = Period::resolve(query.month.as_deref(), Utc::now().date_naive())?;
    let summary = state.db.dashboard_summary(owner_id, period)?;
    Ok(Json(summary))
}

/// GET /api/dashboard/categories?month=YYYY-MM - Expense breakdown
pub async fn get_category_analysis(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<CategoryAnalysis>>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let period = Period::resolve(query.month.as_deref(), Utc::now().date_naive())?;
    let analysis = state.db.category_analysis(owner_id, period)?;
    Ok(Json(analysis))
}
