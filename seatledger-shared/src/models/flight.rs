use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Unique key of a flight: the same flight number departs once per date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightKey {
    pub flight_id: String,
    pub departure_date: NaiveDate,
}

impl FlightKey {
    pub fn new(flight_id: impl Into<String>, departure_date: NaiveDate) -> Self {
        Self {
            flight_id: flight_id.into(),
            departure_date,
        }
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.flight_id, self.departure_date)
    }
}

/// A scheduled flight and its live seat counter.
///
/// Attributes the ledger does not interpret (price, aircraft, ...) are kept
/// in `details` and round-trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    pub flight_id: String,
    pub departure_date: NaiveDate,
    pub seat_availability: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_city: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Flight {
    pub fn new(flight_id: impl Into<String>, departure_date: NaiveDate, seat_availability: u32) -> Self {
        Self {
            flight_id: flight_id.into(),
            departure_date,
            seat_availability,
            capacity: None,
            departure_city: None,
            destination_city: None,
            details: Map::new(),
        }
    }

    /// Set the route used by search.
    pub fn with_route(mut self, departure_city: impl Into<String>, destination_city: impl Into<String>) -> Self {
        self.departure_city = Some(departure_city.into());
        self.destination_city = Some(destination_city.into());
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn key(&self) -> FlightKey {
        FlightKey::new(self.flight_id.clone(), self.departure_date)
    }

    pub fn serves(&self, departure_city: &str, destination_city: &str, departure_date: NaiveDate) -> bool {
        self.departure_date == departure_date
            && self.departure_city.as_deref() == Some(departure_city)
            && self.destination_city.as_deref() == Some(destination_city)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flight_wire_format() {
        let json = r#"
            {
                "flightId": "SL101",
                "departureDate": "2025-03-14",
                "seatAvailability": 5,
                "departureCity": "Lisbon",
                "destinationCity": "Oslo",
                "price": 129.5
            }
        "#;
        let flight: Flight = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(flight.flight_id, "SL101");
        assert_eq!(flight.seat_availability, 5);
        assert_eq!(flight.details.get("price"), Some(&serde_json::json!(129.5)));
        assert!(flight.serves("Lisbon", "Oslo", NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()));

        let value = serde_json::to_value(&flight).unwrap();
        assert_eq!(value["price"], serde_json::json!(129.5));
        assert!(value.get("capacity").is_none());
    }

    #[test]
    fn test_flight_key_display() {
        let key = FlightKey::new("SL101", NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(key.to_string(), "SL101@2025-03-14");
    }
}
