//! Caisse Web Server
//!
//! Axum-based REST API for the Caisse personal finance tracker.
//!
//! Identity is consumed, not produced: the `x-owner-id` header carries
//! the caller's owner id, set by a trusted proxy in front of the
//! server. With `--no-auth` a missing header resolves to a local
//! development owner.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use caisse_core::{
    Classifier, ClassifierClient, Database, OcrClient, OcrEngine, Reconciler, TicketIngestor,
};

mod handlers;

/// Maximum receipt upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Trusted header carrying the authenticated owner id
const OWNER_ID_HEADER: &str = "x-owner-id";

/// Owner id used when authentication is disabled and no header is present
const LOCAL_DEV_OWNER: i64 = 1;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether the owner header is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// Ingestion pipeline; absent when no OCR engine is configured
    pub ingestor: Option<TicketIngestor>,
    pub reconciler: Reconciler,
}

/// Resolve the calling owner from the trusted header
///
/// The header always wins when present. Without it, authentication
/// must be disabled or the request is rejected.
pub fn extract_owner(state: &AppState, headers: &HeaderMap) -> Result<i64, AppError> {
    match headers.get(OWNER_ID_HEADER).and_then(|v| v.to_str().ok()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::unauthorized("Invalid owner header")),
        None if !state.config.require_auth => Ok(LOCAL_DEV_OWNER),
        None => Err(AppError::unauthorized("Authentication required")),
    }
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router, resolving capability clients from
/// the environment
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    let ocr = OcrClient::from_env();
    if let Some(ref client) = ocr {
        info!("OCR engine configured: {}", client.host());
    } else {
        info!("OCR engine not configured (set OCR_HOST to enable ticket ingestion)");
    }

    let classifier = match ClassifierClient::from_env() {
        Some(client) => {
            info!("Classifier configured: {}", client.host());
            client
        }
        None => {
            info!("Classifier not configured (set CLASSIFIER_HOST); using fallback category");
            ClassifierClient::Disabled
        }
    };

    create_router_with_capabilities(db, config, ocr, classifier)
}

/// Create the application router with explicit capability clients
/// (used directly by tests)
pub fn create_router_with_capabilities(
    db: Database,
    config: ServerConfig,
    ocr: Option<OcrClient>,
    classifier: ClassifierClient,
) -> Router {
    let state = Arc::new(AppState {
        ingestor: ocr.map(|ocr| TicketIngestor::new(db.clone(), ocr)),
        reconciler: Reconciler::new(db.clone(), classifier),
        db,
        config: config.clone(),
    });

    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Category catalogue
        .route("/categories", get(handlers::list_categories))
        // Tickets (receipt ingestion and the consumption ledger)
        .route(
            "/tickets",
            post(handlers::upload_ticket).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/tickets/:id", get(handlers::get_ticket))
        .route("/tickets/:id/items", get(handlers::get_ticket_items))
        .route("/tickets/:id/link", post(handlers::link_ticket))
        .route("/tickets/:id/consume", post(handlers::consume_ticket_items))
        .route(
            "/tickets/:id/materialize",
            post(handlers::materialize_ticket),
        )
        // Transactions
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route("/transactions/bulk", post(handlers::create_transactions_bulk))
        .route(
            "/transactions/:id",
            get(handlers::get_transaction)
                .patch(handlers::update_transaction)
                .delete(handlers::delete_transaction),
        )
        .route(
            "/transactions/:id/reclassify",
            post(handlers::reclassify_transaction),
        )
        .route(
            "/transactions/:id/tickets",
            get(handlers::get_transaction_tickets),
        )
        // Budgets
        .route(
            "/budgets",
            get(handlers::list_budgets).post(handlers::create_budget),
        )
        .route("/budgets/status", get(handlers::get_budget_status))
        .route(
            "/budgets/:id",
            get(handlers::get_budget)
                .put(handlers::update_budget)
                .delete(handlers::delete_budget),
        )
        // Dashboard
        .route("/dashboard/summary", get(handlers::get_dashboard_summary))
        .route(
            "/dashboard/categories",
            get(handlers::get_category_analysis),
        );

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(db, host, port, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("Authentication disabled - do not expose to network!");
    }

    check_capability_connections().await;

    let app = create_router(db, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log capability backend connection status
async fn check_capability_connections() {
    match OcrClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!("OCR engine connected: {}", client.host());
            } else {
                warn!("OCR engine configured but not responding: {}", client.host());
            }
        }
        None => {
            info!("OCR engine not configured (set OCR_HOST to enable ticket ingestion)");
        }
    }

    match ClassifierClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!("Classifier connected: {}", client.host());
            } else {
                warn!("Classifier configured but not responding: {}", client.host());
            }
        }
        None => {
            info!("Classifier not configured (set CLASSIFIER_HOST); using fallback category");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<caisse_core::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unavailable(msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<caisse_core::Error> for AppError {
    fn from(err: caisse_core::Error) -> Self {
        use caisse_core::Error as E;

        let status = match &err {
            E::Validation(_) => StatusCode::BAD_REQUEST,
            E::NotFound(_) => StatusCode::NOT_FOUND,
            E::Conflict(_) => StatusCode::CONFLICT,
            E::External(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            Self {
                status,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                // Keep full error for logging
                internal: Some(err),
            }
        } else {
            Self {
                status,
                message: err.to_string(),
                internal: None,
            }
        }
    }
}
