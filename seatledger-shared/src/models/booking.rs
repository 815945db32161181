use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::flight::FlightKey;

/// Booking lifecycle. `Canceled` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BookingStatus::Active),
            "canceled" => Ok(BookingStatus::Canceled),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// Seats committed by one user against one flight date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub booking_id: Uuid,
    pub user_id: String,
    pub flight_id: String,
    pub seats: u32,
    pub departure_date: NaiveDate,
    pub booking_date: DateTime<Utc>,
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn new(
        booking_id: Uuid,
        user_id: String,
        flight_id: String,
        seats: u32,
        departure_date: NaiveDate,
        booking_date: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id,
            user_id,
            flight_id,
            seats,
            departure_date,
            booking_date,
            status: BookingStatus::Active,
            updated_at: None,
        }
    }

    /// Key of the flight this booking holds seats on.
    pub fn flight_key(&self) -> FlightKey {
        FlightKey::new(self.flight_id.clone(), self.departure_date)
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }
}
