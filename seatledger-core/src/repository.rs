use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use seatledger_shared::{Booking, BookingStatus, Flight, FlightKey};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a conditional delta write on a flight's seat counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatAdjustment {
    Applied { seat_availability: u32 },
    /// The delta would have driven the counter below zero; nothing was written.
    Insufficient { seat_availability: u32 },
    FlightMissing,
}

/// Result of a conditional write on a booking record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    PreconditionFailed,
}

/// What the caller last observed on a booking. A transition only applies
/// while the stored booking is still active and still matches these values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingGuard {
    pub seats: u32,
    pub departure_date: NaiveDate,
}

impl From<&Booking> for BookingGuard {
    fn from(booking: &Booking) -> Self {
        Self {
            seats: booking.seats,
            departure_date: booking.departure_date,
        }
    }
}

/// Fields written by a booking transition. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingChange {
    pub status: Option<BookingStatus>,
    pub seats: Option<u32>,
    pub departure_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl BookingChange {
    pub fn cancel(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(BookingStatus::Canceled),
            seats: None,
            departure_date: None,
            updated_at: at,
        }
    }

    pub fn amend(seats: Option<u32>, departure_date: Option<NaiveDate>, at: DateTime<Utc>) -> Self {
        Self {
            status: None,
            seats,
            departure_date,
            updated_at: at,
        }
    }

    /// Apply the change to an in-memory copy of a booking.
    pub fn apply_to(&self, booking: &mut Booking) {
        if let Some(status) = self.status {
            booking.status = status;
        }
        if let Some(seats) = self.seats {
            booking.seats = seats;
        }
        if let Some(date) = self.departure_date {
            booking.departure_date = date;
        }
        booking.updated_at = Some(self.updated_at);
    }
}

/// Flight records and their seat counters.
#[async_trait]
pub trait FlightStore: Send + Sync {
    async fn get_flight(&self, key: &FlightKey) -> StoreResult<Option<Flight>>;

    /// Unconditional upsert. Only used to seed flights.
    async fn put_flight(&self, flight: &Flight) -> StoreResult<()>;

    /// Add `delta` to the seat counter, only if the result stays non-negative.
    async fn adjust_seats(&self, key: &FlightKey, delta: i64) -> StoreResult<SeatAdjustment>;

    async fn search_flights(
        &self,
        departure_city: &str,
        destination_city: &str,
        departure_date: NaiveDate,
    ) -> StoreResult<Vec<Flight>>;
}

/// Booking records.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()>;

    /// Conditionally write `change`, guarded on the booking being active and
    /// matching `guard`.
    async fn transition_booking(
        &self,
        id: Uuid,
        guard: &BookingGuard,
        change: &BookingChange,
    ) -> StoreResult<WriteOutcome>;

    /// Every booking, in any status, referencing the flight.
    async fn bookings_for_flight(&self, key: &FlightKey) -> StoreResult<Vec<Booking>>;
}
