use chrono::NaiveDate;
use seatledger_shared::{Booking, Flight};
use serde::Serialize;

/// Snapshot comparing a flight's seat counter with the bookings held on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub flight_id: String,
    pub departure_date: NaiveDate,
    pub seat_availability: u32,
    pub active_bookings: usize,
    pub committed_seats: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// `capacity - committed - availability`. Zero when the counter and the
    /// bookings agree; positive means seats were lost, negative means the
    /// flight is oversold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<i64>,
}

impl AuditReport {
    pub fn compile(flight: &Flight, bookings: &[Booking]) -> Self {
        let active: Vec<&Booking> = bookings.iter().filter(|b| b.is_active()).collect();
        let committed_seats: u64 = active.iter().map(|b| u64::from(b.seats)).sum();
        let drift = flight.capacity.map(|capacity| {
            i64::from(capacity) - committed_seats as i64 - i64::from(flight.seat_availability)
        });

        Self {
            flight_id: flight.flight_id.clone(),
            departure_date: flight.departure_date,
            seat_availability: flight.seat_availability,
            active_bookings: active.len(),
            committed_seats,
            capacity: flight.capacity,
            drift,
        }
    }

    pub fn is_consistent(&self) -> Option<bool> {
        self.drift.map(|d| d == 0)
    }
}
