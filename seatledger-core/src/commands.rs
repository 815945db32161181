//! Wire-level requests and their validated forms.
//!
//! Requests arrive with every field optional so that validation, not the
//! deserializer, decides what a missing or malformed field means. All
//! validation happens here, before the ledger touches a store.

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{LedgerError, LedgerResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    pub user_id: Option<String>,
    pub flight_id: Option<String>,
    pub seats: Option<i64>,
    pub departure_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFlight {
    pub user_id: String,
    pub flight_id: String,
    pub seats: u32,
    pub departure_date: NaiveDate,
}

impl BookRequest {
    pub fn validate(self) -> LedgerResult<BookFlight> {
        let user_id = present(self.user_id);
        let flight_id = present(self.flight_id);
        let departure_date = present(self.departure_date);

        let mut missing = Vec::new();
        if user_id.is_none() {
            missing.push("userId");
        }
        if flight_id.is_none() {
            missing.push("flightId");
        }
        if self.seats.is_none() {
            missing.push("seats");
        }
        if departure_date.is_none() {
            missing.push("departureDate");
        }

        match (user_id, flight_id, self.seats, departure_date) {
            (Some(user_id), Some(flight_id), Some(seats), Some(departure_date)) => Ok(BookFlight {
                user_id,
                flight_id,
                seats: seat_count(seats)?,
                departure_date: parse_date(&departure_date)?,
            }),
            _ => Err(LedgerError::ValidationError(format!(
                "Missing required fields: {}",
                missing.join(", ")
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub booking_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelBooking {
    pub booking_id: Uuid,
}

impl CancelRequest {
    pub fn validate(self) -> LedgerResult<CancelBooking> {
        let raw = present(self.booking_id)
            .ok_or_else(|| LedgerError::ValidationError("bookingId is required".to_string()))?;
        Ok(CancelBooking {
            booking_id: parse_booking_id(&raw)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub booking_id: Option<String>,
    pub seats: Option<i64>,
    pub departure_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateBooking {
    pub booking_id: Uuid,
    pub seats: Option<u32>,
    pub departure_date: Option<NaiveDate>,
}

impl UpdateRequest {
    pub fn validate(self) -> LedgerResult<UpdateBooking> {
        let raw = present(self.booking_id)
            .ok_or_else(|| LedgerError::ValidationError("bookingId is required".to_string()))?;
        let booking_id = parse_booking_id(&raw)?;

        let departure_date = present(self.departure_date);
        if self.seats.is_none() && departure_date.is_none() {
            return Err(LedgerError::ValidationError("No fields to update".to_string()));
        }

        Ok(UpdateBooking {
            booking_id,
            seats: self.seats.map(seat_count).transpose()?,
            departure_date: departure_date.as_deref().map(parse_date).transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub departure_city: Option<String>,
    pub destination_city: Option<String>,
    pub departure_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightSearch {
    pub departure_city: String,
    pub destination_city: String,
    pub departure_date: NaiveDate,
}

impl SearchQuery {
    pub fn validate(self) -> LedgerResult<FlightSearch> {
        match (
            present(self.departure_city),
            present(self.destination_city),
            present(self.departure_date),
        ) {
            (Some(departure_city), Some(destination_city), Some(date)) => Ok(FlightSearch {
                departure_city,
                destination_city,
                departure_date: parse_date(&date)?,
            }),
            _ => Err(LedgerError::ValidationError(
                "Missing required query parameters".to_string(),
            )),
        }
    }
}

pub fn parse_booking_id(raw: &str) -> LedgerResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| LedgerError::ValidationError("bookingId must be a valid UUID".to_string()))
}

pub fn parse_date(raw: &str) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        LedgerError::ValidationError(format!(
            "departureDate must be a date in YYYY-MM-DD format, got '{}'",
            raw
        ))
    })
}

fn seat_count(seats: i64) -> LedgerResult<u32> {
    match u32::try_from(seats) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(LedgerError::ValidationError(
            "seats must be a positive integer".to_string(),
        )),
    }
}

// Blank strings count as absent.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: LedgerError) -> String {
        match err {
            LedgerError::ValidationError(msg) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_book_request_lists_missing_fields() {
        let req: BookRequest = serde_json::from_str(r#"{"flightId": "SL101", "userId": ""}"#).unwrap();
        let msg = message(req.validate().unwrap_err());
        assert_eq!(msg, "Missing required fields: userId, seats, departureDate");
    }

    #[test]
    fn test_book_request_rejects_non_positive_seats() {
        let req = BookRequest {
            user_id: Some("u1".into()),
            flight_id: Some("SL101".into()),
            seats: Some(0),
            departure_date: Some("2025-03-14".into()),
        };
        assert_eq!(message(req.validate().unwrap_err()), "seats must be a positive integer");
    }

    #[test]
    fn test_book_request_valid() {
        let req: BookRequest = serde_json::from_str(
            r#"{"userId": "u1", "flightId": "SL101", "seats": 3, "departureDate": "2025-03-14"}"#,
        )
        .unwrap();
        let cmd = req.validate().unwrap();
        assert_eq!(cmd.seats, 3);
        assert_eq!(cmd.departure_date, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let req = BookRequest {
            user_id: Some("u1".into()),
            flight_id: Some("SL101".into()),
            seats: Some(1),
            departure_date: Some("14/03/2025".into()),
        };
        assert!(message(req.validate().unwrap_err()).starts_with("departureDate must be a date"));
    }

    #[test]
    fn test_update_request_requires_a_field() {
        let req = UpdateRequest {
            booking_id: Some(Uuid::new_v4().to_string()),
            seats: None,
            departure_date: Some("  ".into()),
        };
        assert_eq!(message(req.validate().unwrap_err()), "No fields to update");
    }

    #[test]
    fn test_update_request_requires_booking_id() {
        let req = UpdateRequest {
            booking_id: None,
            seats: Some(2),
            departure_date: None,
        };
        assert_eq!(message(req.validate().unwrap_err()), "bookingId is required");
    }

    #[test]
    fn test_cancel_request_rejects_malformed_id() {
        let req = CancelRequest {
            booking_id: Some("not-a-uuid".into()),
        };
        assert_eq!(message(req.validate().unwrap_err()), "bookingId must be a valid UUID");
    }

    #[test]
    fn test_search_query_requires_all_parameters() {
        let query = SearchQuery {
            departure_city: Some("Lisbon".into()),
            destination_city: None,
            departure_date: Some("2025-03-14".into()),
        };
        assert_eq!(message(query.validate().unwrap_err()), "Missing required query parameters");
    }
}
