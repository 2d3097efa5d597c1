//! HTTP API for querying voltage analytics from the running gateway.
//!
//! Thin axum layer over [`voltwatch::facade`]: handlers lock the shared
//! store for the duration of one query (every store operation is bounded and
//! non-blocking, so the lock is never held across an await) and translate
//! facade validation errors into status codes.

mod handlers;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use voltwatch::QueryError;
use voltwatch::store::StateStore;

/// Shared handler state: the store behind a single mutex.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<StateStore>>,
}

impl AppState {
    /// Wraps a shared store.
    pub fn new(store: Arc<Mutex<StateStore>>) -> Self {
        Self { store }
    }

    /// Locks the store for one query, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, StateStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/voltage/latest", get(handlers::latest))
        .route("/api/voltage/history", get(handlers::history))
        .route("/api/voltage/anomalies", get(handlers::anomalies))
        .route("/api/voltage/anomalies/active", get(handlers::active_anomalies))
        .route("/api/voltage/compliance/weekly", get(handlers::weekly_compliance))
        .route("/api/voltage/summary", get(handlers::summary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

/// Facade validation error carried to the wire.
#[derive(Debug)]
pub struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            QueryError::NoData => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.0.token() }))).into_response()
    }
}
