use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};
use seatledger_core::commands::parse_date;
use seatledger_core::AuditReport;
use seatledger_shared::FlightKey;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    #[serde(flatten)]
    pub report: AuditReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistent: Option<bool>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/v1/admin/flights/{flight_id}/{departure_date}/audit",
        get(audit_flight),
    )
}

/// GET /v1/admin/flights/{flight_id}/{departure_date}/audit
///
/// Read-only check of the seat counter against the active bookings, for
/// reconciling partial writes.
async fn audit_flight(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<AuditResponse>, AppError> {
    let Path((flight_id, departure_date)) = path?;
    let key = FlightKey::new(flight_id, parse_date(&departure_date)?);

    let report = state.ledger.audit(&key).await?;
    Ok(Json(AuditResponse {
        consistent: report.is_consistent(),
        report,
    }))
}
