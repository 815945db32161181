use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redis::AsyncCommands;
use seatledger_core::repository::{
    BookingChange, BookingGuard, BookingStore, FlightStore, SeatAdjustment, StoreError, StoreResult,
    WriteOutcome,
};
use seatledger_shared::{Booking, BookingStatus, Flight, FlightKey};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::backend_error;

// Conditional delta on the seat counter. Returns {status, availability} where
// status is 1 applied, 0 insufficient, -1 missing flight.
const ADJUST_SEATS: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 0 then
        return {-1, 0}
    end
    local current = tonumber(redis.call("HGET", KEYS[1], "seatAvailability"))
    local delta = tonumber(ARGV[1])
    if current + delta < 0 then
        return {0, current}
    end
    return {1, redis.call("HINCRBY", KEYS[1], "seatAvailability", delta)}
"#;

// Guarded booking write. KEYS: booking, current flight index, new flight index.
// ARGV: expected seats, expected date, status, seats, date, updatedAt, id.
// Empty ARGV values leave the field untouched.
const TRANSITION_BOOKING: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 0 then
        return 0
    end
    local state = redis.call("HMGET", KEYS[1], "status", "seats", "departureDate")
    if state[1] ~= "active" or state[2] ~= ARGV[1] or state[3] ~= ARGV[2] then
        return 0
    end
    if ARGV[3] ~= "" then
        redis.call("HSET", KEYS[1], "status", ARGV[3])
    end
    if ARGV[4] ~= "" then
        redis.call("HSET", KEYS[1], "seats", ARGV[4])
    end
    if ARGV[5] ~= "" then
        redis.call("HSET", KEYS[1], "departureDate", ARGV[5])
        redis.call("SMOVE", KEYS[2], KEYS[3], ARGV[7])
    end
    redis.call("HSET", KEYS[1], "updatedAt", ARGV[6])
    return 1
"#;

/// Key layout, all under one namespace:
///
/// * `{ns}:flight:{flightId}:{date}` hash: `record` (JSON), `seatAvailability`
/// * `{ns}:route:{from}:{to}:{date}` set of flight ids
/// * `{ns}:booking:{bookingId}` hash, one field per booking attribute
/// * `{ns}:flight-bookings:{flightId}:{date}` set of booking ids
#[derive(Debug, Clone)]
pub struct RedisKeys {
    namespace: String,
}

impl RedisKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn flight(&self, key: &FlightKey) -> String {
        format!("{}:flight:{}:{}", self.namespace, key.flight_id, key.departure_date)
    }

    pub fn route(&self, from: &str, to: &str, date: NaiveDate) -> String {
        format!("{}:route:{}:{}:{}", self.namespace, from, to, date)
    }

    pub fn booking(&self, id: Uuid) -> String {
        format!("{}:booking:{}", self.namespace, id)
    }

    /// Route set `previous` must be dropped from once `next` replaces it.
    pub fn stale_route(&self, previous: &Flight, next: &Flight) -> Option<String> {
        match (&previous.departure_city, &previous.destination_city) {
            (Some(from), Some(to)) if !next.serves(from, to, previous.departure_date) => {
                Some(self.route(from, to, previous.departure_date))
            }
            _ => None,
        }
    }

    pub fn flight_bookings(&self, key: &FlightKey) -> String {
        format!(
            "{}:flight-bookings:{}:{}",
            self.namespace, key.flight_id, key.departure_date
        )
    }
}

#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    keys: RedisKeys,
}

impl RedisStore {
    pub async fn new(connection_string: &str, namespace: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        // Fail at startup rather than on the first request.
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Connected to Redis, namespace '{}'", namespace);

        Ok(Self {
            client,
            keys: RedisKeys::new(namespace),
        })
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)
    }
}

#[async_trait]
impl FlightStore for RedisStore {
    async fn get_flight(&self, key: &FlightKey) -> StoreResult<Option<Flight>> {
        let mut conn = self.connection().await?;
        let redis_key = self.keys.flight(key);
        let fields: HashMap<String, String> = conn.hgetall(&redis_key).await.map_err(backend_error)?;
        if fields.is_empty() {
            return Ok(None);
        }
        flight_from_fields(&redis_key, &fields).map(Some)
    }

    async fn put_flight(&self, flight: &Flight) -> StoreResult<()> {
        let key = flight.key();
        let previous = self.get_flight(&key).await?;
        let mut conn = self.connection().await?;
        let record = serde_json::to_string(flight).map_err(backend_error)?;

        let mut pipe = redis::pipe();
        pipe.atomic().hset_multiple(
            self.keys.flight(&key),
            &[
                ("record", record),
                ("seatAvailability", flight.seat_availability.to_string()),
            ],
        );
        if let (Some(from), Some(to)) = (&flight.departure_city, &flight.destination_city) {
            pipe.sadd(self.keys.route(from, to, flight.departure_date), &flight.flight_id);
        }
        if let Some(stale) = previous.and_then(|p| self.keys.stale_route(&p, flight)) {
            pipe.srem(stale, &flight.flight_id);
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(backend_error)?;
        Ok(())
    }

    async fn adjust_seats(&self, key: &FlightKey, delta: i64) -> StoreResult<SeatAdjustment> {
        let mut conn = self.connection().await?;
        let (status, seats): (i64, i64) = redis::Script::new(ADJUST_SEATS)
            .key(self.keys.flight(key))
            .arg(delta)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_error)?;

        let seat_availability = u32::try_from(seats).map_err(|_| StoreError::Corrupt {
            key: self.keys.flight(key),
            reason: format!("seat counter out of range: {}", seats),
        })?;
        Ok(match status {
            1 => SeatAdjustment::Applied { seat_availability },
            0 => SeatAdjustment::Insufficient { seat_availability },
            _ => SeatAdjustment::FlightMissing,
        })
    }

    async fn search_flights(
        &self,
        departure_city: &str,
        destination_city: &str,
        departure_date: NaiveDate,
    ) -> StoreResult<Vec<Flight>> {
        let mut conn = self.connection().await?;
        let route = self.keys.route(departure_city, destination_city, departure_date);
        let mut flight_ids: Vec<String> = conn.smembers(&route).await.map_err(backend_error)?;
        flight_ids.sort();

        let mut flights = Vec::with_capacity(flight_ids.len());
        for flight_id in flight_ids {
            // Route sets can lag a concurrent re-put; the record decides.
            if let Some(flight) = self.get_flight(&FlightKey::new(flight_id, departure_date)).await? {
                if flight.serves(departure_city, destination_city, departure_date) {
                    flights.push(flight);
                }
            }
        }
        Ok(flights)
    }
}

#[async_trait]
impl BookingStore for RedisStore {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let mut conn = self.connection().await?;
        let redis_key = self.keys.booking(id);
        let fields: HashMap<String, String> = conn.hgetall(&redis_key).await.map_err(backend_error)?;
        if fields.is_empty() {
            return Ok(None);
        }
        booking_from_fields(&redis_key, &fields).map(Some)
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(self.keys.booking(booking.booking_id), &booking_fields(booking))
            .sadd(
                self.keys.flight_bookings(&booking.flight_key()),
                booking.booking_id.to_string(),
            )
            .query_async(&mut conn)
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
        // Index keys need the flight id. It never changes, so reading it
        // outside the script is safe.
        let booking = match self.get_booking(id).await? {
            Some(b) => b,
            None => return Ok(WriteOutcome::PreconditionFailed),
        };
        let current = FlightKey::new(booking.flight_id.clone(), guard.departure_date);
        let next = FlightKey::new(
            booking.flight_id,
            change.departure_date.unwrap_or(guard.departure_date),
        );

        let mut conn = self.connection().await?;
        let applied: i64 = redis::Script::new(TRANSITION_BOOKING)
            .key(self.keys.booking(id))
            .key(self.keys.flight_bookings(&current))
            .key(self.keys.flight_bookings(&next))
            .arg(guard.seats.to_string())
            .arg(guard.departure_date.to_string())
            .arg(change.status.map(|s| s.as_str().to_string()).unwrap_or_default())
            .arg(change.seats.map(|s| s.to_string()).unwrap_or_default())
            .arg(change.departure_date.map(|d| d.to_string()).unwrap_or_default())
            .arg(change.updated_at.to_rfc3339())
            .arg(id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(backend_error)?;

        Ok(if applied == 1 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::PreconditionFailed
        })
    }

    async fn bookings_for_flight(&self, key: &FlightKey) -> StoreResult<Vec<Booking>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn
            .smembers(self.keys.flight_bookings(key))
            .await
            .map_err(backend_error)?;

        let mut bookings = Vec::with_capacity(ids.len());
        for raw in ids {
            let id = Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt {
                key: self.keys.flight_bookings(key),
                reason: e.to_string(),
            })?;
            if let Some(booking) = self.get_booking(id).await? {
                bookings.push(booking);
            }
        }
        bookings.sort_by_key(|b| b.booking_date);
        Ok(bookings)
    }
}

fn flight_from_fields(key: &str, fields: &HashMap<String, String>) -> StoreResult<Flight> {
    let record = required(key, fields, "record")?;
    let mut flight: Flight = serde_json::from_str(record).map_err(|e| corrupt(key, e))?;
    flight.seat_availability = required(key, fields, "seatAvailability")?
        .parse()
        .map_err(|e| corrupt(key, e))?;
    Ok(flight)
}

fn booking_fields(booking: &Booking) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("bookingId", booking.booking_id.to_string()),
        ("userId", booking.user_id.clone()),
        ("flightId", booking.flight_id.clone()),
        ("seats", booking.seats.to_string()),
        ("departureDate", booking.departure_date.to_string()),
        ("bookingDate", booking.booking_date.to_rfc3339()),
        ("status", booking.status.as_str().to_string()),
    ];
    if let Some(updated_at) = booking.updated_at {
        fields.push(("updatedAt", updated_at.to_rfc3339()));
    }
    fields
}

fn booking_from_fields(key: &str, fields: &HashMap<String, String>) -> StoreResult<Booking> {
    let updated_at = match fields.get("updatedAt") {
        Some(raw) => Some(parse_timestamp(key, raw)?),
        None => None,
    };

    Ok(Booking {
        booking_id: Uuid::parse_str(required(key, fields, "bookingId")?).map_err(|e| corrupt(key, e))?,
        user_id: required(key, fields, "userId")?.to_string(),
        flight_id: required(key, fields, "flightId")?.to_string(),
        seats: required(key, fields, "seats")?.parse().map_err(|e| corrupt(key, e))?,
        departure_date: required(key, fields, "departureDate")?
            .parse()
            .map_err(|e| corrupt(key, e))?,
        booking_date: parse_timestamp(key, required(key, fields, "bookingDate")?)?,
        status: required(key, fields, "status")?
            .parse::<BookingStatus>()
            .map_err(|e| corrupt(key, e))?,
        updated_at,
    })
}

fn parse_timestamp(key: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(key, e))
}

fn required<'a>(key: &str, fields: &'a HashMap<String, String>, field: &str) -> StoreResult<&'a str> {
    fields
        .get(field)
        .map(String::as_str)
        .ok_or_else(|| corrupt(key, format!("missing field '{}'", field)))
}

fn corrupt(key: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn test_key_layout() {
        let keys = RedisKeys::new("test");
        let flight = FlightKey::new("SL101", date());
        assert_eq!(keys.flight(&flight), "test:flight:SL101:2025-03-14");
        assert_eq!(keys.flight_bookings(&flight), "test:flight-bookings:SL101:2025-03-14");
        assert_eq!(keys.route("Lisbon", "Oslo", date()), "test:route:Lisbon:Oslo:2025-03-14");
    }

    #[test]
    fn test_rerouted_flight_leaves_old_route() {
        let keys = RedisKeys::new("test");
        let before = Flight::new("SL101", date(), 5).with_route("Lisbon", "Oslo");

        let rerouted = before.clone().with_route("Lisbon", "Rome");
        assert_eq!(
            keys.stale_route(&before, &rerouted).as_deref(),
            Some("test:route:Lisbon:Oslo:2025-03-14")
        );

        let recounted = Flight::new("SL101", date(), 2).with_route("Lisbon", "Oslo");
        assert_eq!(keys.stale_route(&before, &recounted), None);

        let unrouted = Flight::new("SL101", date(), 5);
        assert_eq!(keys.stale_route(&unrouted, &rerouted), None);
        assert!(!rerouted.serves("Lisbon", "Oslo", date()));
    }

    #[test]
    fn test_booking_hash_fields() {
        let mut booking = Booking::new(Uuid::new_v4(), "u1".into(), "SL101".into(), 2, date(), Utc::now());
        booking.status = BookingStatus::Canceled;
        booking.updated_at = Some(Utc::now());

        let fields: HashMap<String, String> = booking_fields(&booking)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(fields["status"], "canceled");
        assert_eq!(fields["seats"], "2");

        let parsed = booking_from_fields("test:booking", &fields).unwrap();
        assert_eq!(parsed, booking);
    }

    #[test]
    fn test_flight_counter_field_wins_over_record() {
        let flight = Flight::new("SL101", date(), 9);
        let mut fields = HashMap::new();
        fields.insert("record".to_string(), serde_json::to_string(&flight).unwrap());
        fields.insert("seatAvailability".to_string(), "4".to_string());

        let parsed = flight_from_fields("test:flight", &fields).unwrap();
        assert_eq!(parsed.seat_availability, 4);
    }

    #[test]
    fn test_missing_field_is_corrupt() {
        let fields = HashMap::new();
        let err = booking_from_fields("test:booking:x", &fields).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
