use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use seatledger_core::commands::SearchQuery;
use seatledger_shared::Flight;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/flights/search", get(search_flights))
}

/// GET /v1/flights/search?departureCity=..&destinationCity=..&departureDate=..
async fn search_flights(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<Flight>>, AppError> {
    let Query(query) = query?;
    let search = query.validate()?;

    let flights = state.ledger.search(search.clone()).await?;
    info!(
        "Search {} -> {} on {}: {} flights",
        search.departure_city,
        search.destination_city,
        search.departure_date,
        flights.len()
    );

    Ok(Json(flights))
}
