//! Static category catalogue
//!
//! The catalogue mirrors the front-end constants; it is data, not
//! configuration, so it lives in code.

use axum::Json;
use serde::Serialize;

/// Available expense categories
pub const EXPENSE_CATEGORIES: &[&str] = &[
    "Nourriture",
    "Transport",
    "Factures",
    "Divertissement",
    "Achats",
    "Santé",
    "Éducation",
    "Divers",
    "Autres",
];

/// Available income categories
pub const INCOME_CATEGORIES: &[&str] = &[
    "Salaire",
    "Freelance",
    "Investissement",
    "Location",
    "Prime",
    "Cadeau",
    "Remboursement",
    "Vente",
    "Intérêts",
    "Dividendes",
    "Autres",
];

/// Category catalogue response
#[derive(Serialize)]
pub struct CategoriesResponse {
    pub expense: Vec<&'static str>,
    pub income: Vec<&'static str>,
}

/// GET /api/categories - List available categories per transaction kind
pub async fn list_categories() -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        expense: EXPENSE_CATEGORIES.to_vec(),
        income: INCOME_CATEGORIES.to_vec(),
    })
}
