use async_trait::async_trait;
use chrono::NaiveDate;
use seatledger_shared::{Booking, Flight, FlightKey};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{
    BookingChange, BookingGuard, BookingStore, FlightStore, SeatAdjustment, StoreResult, WriteOutcome,
};

#[derive(Default)]
struct Tables {
    flights: HashMap<FlightKey, Flight>,
    bookings: HashMap<Uuid, Booking>,
}

/// In-process store. Each conditional write runs under one write lock, which
/// gives it the same atomicity a single-key conditional update has in Redis
/// or Postgres.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flights(flights: impl IntoIterator<Item = Flight>) -> Self {
        let tables = Tables {
            flights: flights.into_iter().map(|f| (f.key(), f)).collect(),
            bookings: HashMap::new(),
        };
        Self {
            tables: RwLock::new(tables),
        }
    }
}

#[async_trait]
impl FlightStore for MemoryStore {
    async fn get_flight(&self, key: &FlightKey) -> StoreResult<Option<Flight>> {
        Ok(self.tables.read().await.flights.get(key).cloned())
    }

    async fn put_flight(&self, flight: &Flight) -> StoreResult<()> {
        self.tables.write().await.flights.insert(flight.key(), flight.clone());
        Ok(())
    }

    async fn adjust_seats(&self, key: &FlightKey, delta: i64) -> StoreResult<SeatAdjustment> {
        let mut tables = self.tables.write().await;
        let Some(flight) = tables.flights.get_mut(key) else {
            return Ok(SeatAdjustment::FlightMissing);
        };

        let updated = i64::from(flight.seat_availability) + delta;
        match u32::try_from(updated) {
            Ok(seats) => {
                flight.seat_availability = seats;
                Ok(SeatAdjustment::Applied { seat_availability: seats })
            }
            Err(_) => Ok(SeatAdjustment::Insufficient {
                seat_availability: flight.seat_availability,
            }),
        }
    }

    async fn search_flights(
        &self,
        departure_city: &str,
        destination_city: &str,
        departure_date: NaiveDate,
    ) -> StoreResult<Vec<Flight>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Flight> = tables
            .flights
            .values()
            .filter(|f| f.serves(departure_city, destination_city, departure_date))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.flight_id.cmp(&b.flight_id));
        Ok(found)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.read().await.bookings.get(&id).cloned())
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .bookings
            .insert(booking.booking_id, booking.clone());
        Ok(())
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        guard: &BookingGuard,
        change: &BookingChange,
    ) -> StoreResult<WriteOutcome> {
        let mut tables = self.tables.write().await;
        match tables.bookings.get_mut(&id) {
            Some(booking)
                if booking.is_active()
                    && booking.seats == guard.seats
                    && booking.departure_date == guard.departure_date =>
            {
                change.apply_to(booking);
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::PreconditionFailed),
        }
    }

    async fn bookings_for_flight(&self, key: &FlightKey) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.flight_id == key.flight_id && b.departure_date == key.departure_date)
            .cloned()
            .collect();
        found.sort_by_key(|b| b.booking_date);
        Ok(found)
    }
}
