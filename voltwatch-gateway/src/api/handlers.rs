//! Request handlers for the voltage API.
//!
//! Each handler parses its query parameters, takes the store lock once, and
//! delegates to the facade; response shaping happens entirely in
//! [`voltwatch::facade`].

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use voltwatch::facade::{
    self, ActiveAnomaliesResponse, AnomalyListResponse, AnomalyParams, HistoryParams,
    HistoryResponse, LatestResponse, SummaryResponse, WeeklyComplianceResponse,
};

use super::{ApiError, AppState};

/// `GET /api/voltage/latest`
pub async fn latest(State(state): State<AppState>) -> Result<Json<LatestResponse>, ApiError> {
    let store = state.lock();
    Ok(Json(facade::latest(&store)?))
}

/// `GET /api/voltage/history?from&to&points&interval`
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let store = state.lock();
    Ok(Json(facade::history(&store, &params)?))
}

/// `GET /api/voltage/anomalies?type&phase&from&to&limit`
pub async fn anomalies(
    State(state): State<AppState>,
    Query(params): Query<AnomalyParams>,
) -> Result<Json<AnomalyListResponse>, ApiError> {
    let store = state.lock();
    Ok(Json(facade::anomalies(&store, &params)?))
}

/// `GET /api/voltage/anomalies/active`
pub async fn active_anomalies(State(state): State<AppState>) -> Json<ActiveAnomaliesResponse> {
    let store = state.lock();
    Json(facade::active_anomalies(&store))
}

/// Query parameters of the weekly compliance endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ComplianceParams {
    /// Any date inside the requested week; loose format.
    pub date: Option<String>,
}

/// `GET /api/voltage/compliance/weekly?date`
pub async fn weekly_compliance(
    State(state): State<AppState>,
    Query(params): Query<ComplianceParams>,
) -> Json<WeeklyComplianceResponse> {
    let store = state.lock();
    Json(facade::weekly_compliance(&store, params.date.as_deref()))
}

/// `GET /api/voltage/summary`
pub async fn summary(State(state): State<AppState>) -> Json<SummaryResponse> {
    let store = state.lock();
    Json(facade::summary(&store))
}
