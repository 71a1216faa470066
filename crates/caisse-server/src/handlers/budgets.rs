//! Budget handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{extract_owner, AppError, AppState, SuccessResponse};
use caisse_core::{Budget, BudgetPatch, BudgetStatus, NewBudget, Period};

/// Optional month selector (`YYYY-MM`), defaulting to the current month
#[derive(Debug, Deserialize, Default)]
pub struct MonthQuery {
    pub month: Option<String>,
}

/// GET /api/budgets - List all budgets for the owner
pub async fn list_budgets(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Budget>>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let budgets = state.db.list_budgets(owner_id)?;
    Ok(Json(budgets))
}

/// POST /api/budgets - Create a budget; one per category
pub async fn create_budget(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(budget): Json<NewBudget>,
) -> Result<Json<Budget>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let budget = state.db.create_budget(owner_id, &budget)?;
    Ok(Json(budget))
}

/// GET /api/budgets/:id - Get a single budget
pub async fn get_budget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Budget>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let budget = state.db.get_owned_budget(owner_id, id)?;
    Ok(Json(budget))
}

/// PUT /api/budgets/:id - Update a budget
pub async fn update_budget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(patch): Json<BudgetPatch>,
) -> Result<Json<Budget>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let budget = state.db.update_budget(owner_id, id, &patch)?;
    Ok(Json(budget))
}

/// DELETE /api/budgets/:id - Delete a budget
pub async fn delete_budget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    state.db.delete_budget(owner_id, id)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/budgets/status?month=YYYY-MM - Spending vs. limit per budget
pub async fn get_budget_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<BudgetStatus>>, AppError> {
    let owner_id = extract_owner(&state, &headers)?;
    let period = Period::resolve(query.month.as_deref(), Utc::now().date_naive())?;
    let statuses = state.db.budget_status(owner_id, period)?;
    Ok(Json(statuses))
}
