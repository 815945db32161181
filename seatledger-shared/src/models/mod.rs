pub mod booking;
pub mod flight;

pub use booking::{Booking, BookingStatus};
pub use flight::{Flight, FlightKey};
