use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use seatledger_core::commands::{parse_booking_id, BookRequest, CancelRequest, UpdateRequest};
use seatledger_core::UpdatedFields;
use seatledger_shared::{Booking, BookingStatus};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub message: String,
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CanceledAttributes {
    pub status: BookingStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub message: String,
    pub booking_id: Uuid,
    pub updated_attributes: CanceledAttributes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub message: String,
    pub booking_id: Uuid,
    pub updated_attributes: UpdatedFields,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/cancel", post(cancel_booking))
        .route("/v1/bookings/update", post(update_booking))
        .route("/v1/bookings/{booking_id}", get(get_booking))
}

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<BookRequest>, JsonRejection>,
) -> Result<Json<BookingResponse>, AppError> {
    let Json(req) = payload?;
    debug!("Booking request: {:?}", req);

    let confirmation = state.ledger.book(req.validate()?).await?;

    Ok(Json(BookingResponse {
        message: "Booking created successfully".to_string(),
        booking_id: confirmation.booking.booking_id,
    }))
}

/// POST /v1/bookings/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<CancelResponse>, AppError> {
    let Json(req) = payload?;
    debug!("Cancel request: {:?}", req);

    let cancellation = state.ledger.cancel(req.validate()?).await?;

    Ok(Json(CancelResponse {
        message: "Booking canceled successfully".to_string(),
        booking_id: cancellation.booking_id,
        updated_attributes: CanceledAttributes {
            status: cancellation.status,
        },
    }))
}

/// POST /v1/bookings/update
async fn update_booking(
    State(state): State<AppState>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<UpdateResponse>, AppError> {
    let Json(req) = payload?;
    debug!("Update request: {:?}", req);

    let amendment = state.ledger.update(req.validate()?).await?;

    Ok(Json(UpdateResponse {
        message: "Booking updated successfully".to_string(),
        booking_id: amendment.booking.booking_id,
        updated_attributes: amendment.updated,
    }))
}

/// GET /v1/bookings/{booking_id}
async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.ledger.get_booking(parse_booking_id(&booking_id)?).await?;
    Ok(Json(booking))
}
