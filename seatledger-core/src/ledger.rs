//! The inventory ledger keeps every flight's seat counter equal to its
//! starting availability minus the seats of the active bookings on it.
//!
//! The counter and the bookings live in separate records with no shared
//! transaction, so each operation orders its writes:
//!
//! * seats are taken from a flight (conditional debit) before the booking
//!   that holds them is written;
//! * seats are given back to a flight only after the booking that released
//!   them is written.
//!
//! A failure between the two writes therefore leaves the counter low, never
//! high: the flight can undersell but not oversell. A booking write that fails
//! after a debit is compensated by crediting the debit back. Anything that
//! cannot be put right is returned as [`LedgerError::PartialWrite`].

use chrono::{NaiveDate, Utc};
use seatledger_shared::{Booking, BookingStatus, Flight, FlightKey};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::AuditReport;
use crate::commands::{BookFlight, CancelBooking, FlightSearch, UpdateBooking};
use crate::repository::{
    BookingChange, BookingGuard, BookingStore, FlightStore, SeatAdjustment, WriteOutcome,
};
use crate::{LedgerError, LedgerResult};

pub const DEFAULT_MAX_CANCEL_ATTEMPTS: u32 = 3;

const NOT_ENOUGH_SEATS: &str = "Not enough seats available";
const ALREADY_CANCELED: &str = "Booking has already been canceled";
const CONCURRENT_CHANGE: &str = "Booking was modified concurrently, please retry";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub booking: Booking,
    pub seat_availability: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub seats_released: u32,
    pub seat_availability: u32,
}

/// The booking attributes an update actually set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingAmendment {
    pub booking: Booking,
    pub updated: UpdatedFields,
    /// Availability of the flight the booking now holds seats on.
    pub seat_availability: u32,
}

pub struct InventoryLedger {
    flights: Arc<dyn FlightStore>,
    bookings: Arc<dyn BookingStore>,
    max_cancel_attempts: u32,
}

impl InventoryLedger {
    pub fn new(flights: Arc<dyn FlightStore>, bookings: Arc<dyn BookingStore>) -> Self {
        Self {
            flights,
            bookings,
            max_cancel_attempts: DEFAULT_MAX_CANCEL_ATTEMPTS,
        }
    }

    pub fn with_max_cancel_attempts(mut self, attempts: u32) -> Self {
        self.max_cancel_attempts = attempts.max(1);
        self
    }

    /// Reserve seats on a flight and record the booking.
    pub async fn book(&self, cmd: BookFlight) -> LedgerResult<BookingConfirmation> {
        let key = FlightKey::new(cmd.flight_id.clone(), cmd.departure_date);
        let flight = self.require_flight(&key).await?;

        if cmd.seats > flight.seat_availability {
            warn!(
                "Requested seats ({}) exceed available seats ({}) on {}",
                cmd.seats, flight.seat_availability, key
            );
            return Err(LedgerError::Conflict(NOT_ENOUGH_SEATS.to_string()));
        }

        let booking_id = Uuid::new_v4();
        let delta = -i64::from(cmd.seats);
        let seat_availability = self.debit(&key, delta).await?;

        let booking = Booking::new(
            booking_id,
            cmd.user_id,
            cmd.flight_id,
            cmd.seats,
            cmd.departure_date,
            Utc::now(),
        );

        if let Err(e) = self.bookings.insert_booking(&booking).await {
            let reason = format!("booking insert failed: {}", e);
            self.compensate(&key, booking_id, delta, &reason).await?;
            return Err(LedgerError::PartialWrite {
                flight_key: key,
                booking_id,
                seats_delta: delta,
                compensated: true,
                reason,
            });
        }

        info!(
            "Booking {} created: {} seats on {}, {} remaining",
            booking_id, booking.seats, key, seat_availability
        );
        Ok(BookingConfirmation {
            booking,
            seat_availability,
        })
    }

    /// Cancel an active booking and return its seats to the flight.
    pub async fn cancel(&self, cmd: CancelBooking) -> LedgerResult<Cancellation> {
        for attempt in 1..=self.max_cancel_attempts {
            let booking = self.require_booking(cmd.booking_id).await?;
            if !booking.is_active() {
                warn!("Booking {} is already canceled", booking.booking_id);
                return Err(LedgerError::Conflict(ALREADY_CANCELED.to_string()));
            }

            let key = booking.flight_key();
            if self.flights.get_flight(&key).await?.is_none() {
                warn!("Booking {} references missing flight {}", booking.booking_id, key);
                return Err(LedgerError::NotFound("Flight not found".to_string()));
            }

            let change = BookingChange::cancel(Utc::now());
            let outcome = self
                .bookings
                .transition_booking(booking.booking_id, &BookingGuard::from(&booking), &change)
                .await?;

            match outcome {
                WriteOutcome::Applied => {
                    let seat_availability = self.credit(&key, booking.booking_id, booking.seats).await?;
                    info!(
                        "Booking {} canceled: {} seats returned to {}",
                        booking.booking_id, booking.seats, key
                    );
                    return Ok(Cancellation {
                        booking_id: booking.booking_id,
                        status: BookingStatus::Canceled,
                        seats_released: booking.seats,
                        seat_availability,
                    });
                }
                WriteOutcome::PreconditionFailed => {
                    warn!(
                        "Booking {} changed while canceling (attempt {}/{})",
                        booking.booking_id, attempt, self.max_cancel_attempts
                    );
                }
            }
        }

        Err(LedgerError::Conflict(CONCURRENT_CHANGE.to_string()))
    }

    /// Change the seat count and/or departure date of an active booking.
    ///
    /// A date change moves the booking's seats to the flight on the new date:
    /// that flight is debited, then the booking is rewritten, then the old
    /// flight is credited.
    pub async fn update(&self, cmd: UpdateBooking) -> LedgerResult<BookingAmendment> {
        let booking = self.require_booking(cmd.booking_id).await?;
        if !booking.is_active() {
            warn!("Booking {} is canceled and cannot be updated", booking.booking_id);
            return Err(LedgerError::Conflict(ALREADY_CANCELED.to_string()));
        }

        let source = booking.flight_key();
        let target = FlightKey::new(
            booking.flight_id.clone(),
            cmd.departure_date.unwrap_or(booking.departure_date),
        );
        let seats = cmd.seats.unwrap_or(booking.seats);
        let updated = UpdatedFields {
            seats: cmd.seats,
            departure_date: cmd.departure_date,
        };

        let target_flight = self.require_flight(&target).await?;
        if source == target && seats == booking.seats {
            return Ok(BookingAmendment {
                booking,
                updated,
                seat_availability: target_flight.seat_availability,
            });
        }

        let change = BookingChange::amend(cmd.seats, cmd.departure_date, Utc::now());
        let seat_availability = if source == target {
            self.resize(&booking, &target_flight, seats, &change).await?
        } else {
            // The old flight is credited last; make sure it is still there
            // before anything is written.
            self.require_flight(&source).await?;
            self.relocate(&booking, &target_flight, seats, &change).await?
        };

        let mut amended = booking;
        change.apply_to(&mut amended);
        info!(
            "Booking {} updated: {} seats on {}, {} remaining",
            amended.booking_id, amended.seats, target, seat_availability
        );

        Ok(BookingAmendment {
            booking: amended,
            updated,
            seat_availability,
        })
    }

    pub async fn search(&self, query: FlightSearch) -> LedgerResult<Vec<Flight>> {
        let flights = self
            .flights
            .search_flights(&query.departure_city, &query.destination_city, query.departure_date)
            .await?;

        if flights.is_empty() {
            return Err(LedgerError::NotFound("No flights found".to_string()));
        }
        Ok(flights)
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> LedgerResult<Booking> {
        self.require_booking(booking_id).await
    }

    /// Compare a flight's counter with the bookings held on it.
    pub async fn audit(&self, key: &FlightKey) -> LedgerResult<AuditReport> {
        let flight = self.require_flight(key).await?;
        let bookings = self.bookings.bookings_for_flight(key).await?;
        let report = AuditReport::compile(&flight, &bookings);

        if report.is_consistent() == Some(false) {
            warn!("Seat drift on {}: {:?}", key, report.drift);
        }
        Ok(report)
    }

    // Same flight, different seat count.
    async fn resize(
        &self,
        booking: &Booking,
        flight: &Flight,
        seats: u32,
        change: &BookingChange,
    ) -> LedgerResult<u32> {
        let key = flight.key();
        let diff = i64::from(seats) - i64::from(booking.seats);

        if diff > 0 {
            if diff > i64::from(flight.seat_availability) {
                warn!(
                    "Booking {} needs {} more seats, {} available on {}",
                    booking.booking_id, diff, flight.seat_availability, key
                );
                return Err(LedgerError::Conflict(NOT_ENOUGH_SEATS.to_string()));
            }
            let seat_availability = self.debit(&key, -diff).await?;
            self.commit_amendment(booking, change, Some((&key, -diff))).await?;
            Ok(seat_availability)
        } else {
            self.commit_amendment(booking, change, None).await?;
            self.credit(&key, booking.booking_id, booking.seats - seats).await
        }
    }

    // Different flight date: debit the new flight, rewrite, credit the old one.
    async fn relocate(
        &self,
        booking: &Booking,
        target: &Flight,
        seats: u32,
        change: &BookingChange,
    ) -> LedgerResult<u32> {
        let key = target.key();
        if seats > target.seat_availability {
            warn!(
                "Booking {} cannot move {} seats to {}: {} available",
                booking.booking_id, seats, key, target.seat_availability
            );
            return Err(LedgerError::Conflict(NOT_ENOUGH_SEATS.to_string()));
        }

        let delta = -i64::from(seats);
        let seat_availability = self.debit(&key, delta).await?;
        self.commit_amendment(booking, change, Some((&key, delta))).await?;
        self.credit(&booking.flight_key(), booking.booking_id, booking.seats)
            .await?;
        Ok(seat_availability)
    }

    /// Write a booking amendment. `debited` is the flight write that preceded
    /// it, undone if the booking cannot be written.
    async fn commit_amendment(
        &self,
        booking: &Booking,
        change: &BookingChange,
        debited: Option<(&FlightKey, i64)>,
    ) -> LedgerResult<()> {
        let id = booking.booking_id;
        match self
            .bookings
            .transition_booking(id, &BookingGuard::from(booking), change)
            .await
        {
            Ok(WriteOutcome::Applied) => Ok(()),
            Ok(WriteOutcome::PreconditionFailed) => {
                warn!("Booking {} changed during update", id);
                if let Some((key, delta)) = debited {
                    self.compensate(key, id, delta, "booking changed concurrently")
                        .await?;
                }
                Err(LedgerError::Conflict(CONCURRENT_CHANGE.to_string()))
            }
            Err(e) => match debited {
                Some((key, delta)) => {
                    let reason = format!("booking update failed: {}", e);
                    self.compensate(key, id, delta, &reason).await?;
                    Err(LedgerError::PartialWrite {
                        flight_key: key.clone(),
                        booking_id: id,
                        seats_delta: delta,
                        compensated: true,
                        reason,
                    })
                }
                None => Err(e.into()),
            },
        }
    }

    // Conditional debit; `delta` is negative.
    async fn debit(&self, key: &FlightKey, delta: i64) -> LedgerResult<u32> {
        match self.flights.adjust_seats(key, delta).await? {
            SeatAdjustment::Applied { seat_availability } => Ok(seat_availability),
            SeatAdjustment::Insufficient { seat_availability } => {
                warn!(
                    "Lost seat race on {}: needed {}, {} available",
                    key, -delta, seat_availability
                );
                Err(LedgerError::Conflict(NOT_ENOUGH_SEATS.to_string()))
            }
            SeatAdjustment::FlightMissing => Err(LedgerError::NotFound("Flight not found".to_string())),
        }
    }

    /// Return seats after the booking write has committed. There is nothing
    /// left to undo at this point, so any failure is a partial write.
    async fn credit(&self, key: &FlightKey, booking_id: Uuid, seats: u32) -> LedgerResult<u32> {
        let delta = i64::from(seats);
        let reason = match self.flights.adjust_seats(key, delta).await {
            Ok(SeatAdjustment::Applied { seat_availability }) => return Ok(seat_availability),
            Ok(SeatAdjustment::Insufficient { seat_availability }) => {
                format!("credit rejected at availability {}", seat_availability)
            }
            Ok(SeatAdjustment::FlightMissing) => "flight record missing".to_string(),
            Err(e) => e.to_string(),
        };

        error!(
            "Reconciliation required: {} seats for booking {} not returned to {}: {}",
            seats, booking_id, key, reason
        );
        Err(LedgerError::PartialWrite {
            flight_key: key.clone(),
            booking_id,
            seats_delta: delta,
            compensated: false,
            reason,
        })
    }

    /// Undo a debit whose booking write did not happen.
    async fn compensate(
        &self,
        key: &FlightKey,
        booking_id: Uuid,
        delta: i64,
        reason: &str,
    ) -> LedgerResult<()> {
        match self.flights.adjust_seats(key, -delta).await {
            Ok(SeatAdjustment::Applied { .. }) => {
                warn!(
                    "Compensated {} seats on {} for booking {}: {}",
                    -delta, key, booking_id, reason
                );
                Ok(())
            }
            outcome => {
                error!(
                    "Reconciliation required: could not return {} seats to {} for booking {} ({}): {:?}",
                    -delta, key, booking_id, reason, outcome
                );
                Err(LedgerError::PartialWrite {
                    flight_key: key.clone(),
                    booking_id,
                    seats_delta: delta,
                    compensated: false,
                    reason: reason.to_string(),
                })
            }
        }
    }

    async fn require_flight(&self, key: &FlightKey) -> LedgerResult<Flight> {
        self.flights
            .get_flight(key)
            .await?
            .ok_or_else(|| LedgerError::NotFound("Flight not found".to_string()))
    }

    async fn require_booking(&self, booking_id: Uuid) -> LedgerResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("Booking not found".to_string()))
    }
}
