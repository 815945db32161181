use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use seatledger_core::repository::{
    BookingChange, BookingGuard, BookingStore, FlightStore, SeatAdjustment, StoreError, StoreResult,
    WriteOutcome,
};
use seatledger_shared::{Booking, BookingStatus, Flight, FlightKey};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend_error;

const FLIGHT_COLUMNS: &str =
    "flight_id, departure_date, seat_availability, capacity, departure_city, destination_city, details";

const BOOKING_COLUMNS: &str =
    "booking_id, user_id, flight_id, seats, departure_date, booking_date, status, updated_at";

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    flight_id: String,
    departure_date: NaiveDate,
    seat_availability: i32,
    capacity: Option<i32>,
    departure_city: Option<String>,
    destination_city: Option<String>,
    details: Value,
}

impl FlightRow {
    fn into_flight(self) -> StoreResult<Flight> {
        let key = format!("flights/{}/{}", self.flight_id, self.departure_date);
        let details = match self.details {
            Value::Object(map) => map,
            _ => Default::default(),
        };

        Ok(Flight {
            seat_availability: from_i32(&key, self.seat_availability)?,
            capacity: self.capacity.map(|c| from_i32(&key, c)).transpose()?,
            flight_id: self.flight_id,
            departure_date: self.departure_date,
            departure_city: self.departure_city,
            destination_city: self.destination_city,
            details,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    booking_id: Uuid,
    user_id: String,
    flight_id: String,
    seats: i32,
    departure_date: NaiveDate,
    booking_date: DateTime<Utc>,
    status: String,
    updated_at: Option<DateTime<Utc>>,
}

impl BookingRow {
    fn into_booking(self) -> StoreResult<Booking> {
        let key = format!("bookings/{}", self.booking_id);
        let status = self
            .status
            .parse::<BookingStatus>()
            .map_err(|reason| StoreError::Corrupt {
                key: key.clone(),
                reason,
            })?;

        Ok(Booking {
            booking_id: self.booking_id,
            user_id: self.user_id,
            flight_id: self.flight_id,
            seats: from_i32(&key, self.seats)?,
            departure_date: self.departure_date,
            booking_date: self.booking_date,
            status,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl FlightStore for PostgresStore {
    async fn get_flight(&self, key: &FlightKey) -> StoreResult<Option<Flight>> {
        let sql = format!(
            "SELECT {} FROM flights WHERE flight_id = $1 AND departure_date = $2",
            FLIGHT_COLUMNS
        );
        let row = sqlx::query_as::<_, FlightRow>(&sql)
            .bind(&key.flight_id)
            .bind(key.departure_date)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;

        row.map(FlightRow::into_flight).transpose()
    }

    async fn put_flight(&self, flight: &Flight) -> StoreResult<()> {
        let key = flight.key().to_string();
        sqlx::query(
            r#"
            INSERT INTO flights (flight_id, departure_date, seat_availability, capacity, departure_city, destination_city, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (flight_id, departure_date) DO UPDATE SET
                seat_availability = EXCLUDED.seat_availability,
                capacity = EXCLUDED.capacity,
                departure_city = EXCLUDED.departure_city,
                destination_city = EXCLUDED.destination_city,
                details = EXCLUDED.details
            "#,
        )
        .bind(&flight.flight_id)
        .bind(flight.departure_date)
        .bind(to_i32(&key, i64::from(flight.seat_availability))?)
        .bind(flight.capacity.map(|c| to_i32(&key, i64::from(c))).transpose()?)
        .bind(&flight.departure_city)
        .bind(&flight.destination_city)
        .bind(Value::Object(flight.details.clone()))
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(())
    }

    async fn adjust_seats(&self, key: &FlightKey, delta: i64) -> StoreResult<SeatAdjustment> {
        let delta = to_i32(&key.to_string(), delta)?;

        // The guard and the increment are one statement, so concurrent
        // adjustments serialize on the row lock.
        let applied: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE flights SET seat_availability = seat_availability + $3
            WHERE flight_id = $1 AND departure_date = $2 AND seat_availability + $3 >= 0
            RETURNING seat_availability
            "#,
        )
        .bind(&key.flight_id)
        .bind(key.departure_date)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        if let Some(seats) = applied {
            return Ok(SeatAdjustment::Applied {
                seat_availability: from_i32(&key.to_string(), seats)?,
            });
        }

        let current: Option<i32> = sqlx::query_scalar(
            "SELECT seat_availability FROM flights WHERE flight_id = $1 AND departure_date = $2",
        )
        .bind(&key.flight_id)
        .bind(key.departure_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match current {
            Some(seats) => Ok(SeatAdjustment::Insufficient {
                seat_availability: from_i32(&key.to_string(), seats)?,
            }),
            None => Ok(SeatAdjustment::FlightMissing),
        }
    }

    async fn search_flights(
        &self,
        departure_city: &str,
        destination_city: &str,
        departure_date: NaiveDate,
    ) -> StoreResult<Vec<Flight>> {
        let sql = format!(
            "SELECT {} FROM flights \
             WHERE departure_city = $1 AND destination_city = $2 AND departure_date = $3 \
             ORDER BY flight_id",
            FLIGHT_COLUMNS
        );
        let rows = sqlx::query_as::<_, FlightRow>(&sql)
            .bind(departure_city)
            .bind(destination_city)
            .bind(departure_date)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)?;

        rows.into_iter().map(FlightRow::into_flight).collect()
    }
}

#[async_trait]
impl BookingStore for PostgresStore {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE booking_id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;

        row.map(BookingRow::into_booking).transpose()
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let key = format!("bookings/{}", booking.booking_id);
        sqlx::query(
            r#"
            INSERT INTO bookings (booking_id, user_id, flight_id, seats, departure_date, booking_date, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(booking.booking_id)
        .bind(&booking.user_id)
        .bind(&booking.flight_id)
        .bind(to_i32(&key, i64::from(booking.seats))?)
        .bind(booking.departure_date)
        .bind(booking.booking_date)
        .bind(booking.status.as_str())
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(())
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        guard: &BookingGuard,
        change: &BookingChange,
    ) -> StoreResult<WriteOutcome> {
        let key = format!("bookings/{}", id);
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = COALESCE($4, status),
                seats = COALESCE($5, seats),
                departure_date = COALESCE($6, departure_date),
                updated_at = $7
            WHERE booking_id = $1 AND status = 'active' AND seats = $2 AND departure_date = $3
            "#,
        )
        .bind(id)
        .bind(to_i32(&key, i64::from(guard.seats))?)
        .bind(guard.departure_date)
        .bind(change.status.map(|s| s.as_str()))
        .bind(change.seats.map(|s| to_i32(&key, i64::from(s))).transpose()?)
        .bind(change.departure_date)
        .bind(change.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(if result.rows_affected() == 1 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::PreconditionFailed
        })
    }

    async fn bookings_for_flight(&self, key: &FlightKey) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE flight_id = $1 AND departure_date = $2 ORDER BY booking_date",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(&key.flight_id)
            .bind(key.departure_date)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)?;

        rows.into_iter().map(BookingRow::into_booking).collect()
    }
}

fn to_i32(key: &str, value: i64) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("value {} does not fit an INTEGER column", value),
    })
}

fn from_i32(key: &str, value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("negative seat count {}", value),
    })
}
