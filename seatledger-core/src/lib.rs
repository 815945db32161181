pub mod audit;
pub mod commands;
pub mod ledger;
pub mod memory;
pub mod repository;

use seatledger_shared::FlightKey;
use uuid::Uuid;

pub use audit::AuditReport;
pub use ledger::{BookingAmendment, BookingConfirmation, Cancellation, InventoryLedger, UpdatedFields};
pub use memory::MemoryStore;
pub use repository::{BookingStore, FlightStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// A mutation sequence stopped between the flight write and the booking
    /// write. Carries what an operator needs to reconcile the two records.
    #[error(
        "partial write on flight {flight_key} for booking {booking_id} \
         (seat delta {seats_delta}, compensated: {compensated}): {reason}"
    )]
    PartialWrite {
        flight_key: FlightKey,
        booking_id: Uuid,
        seats_delta: i64,
        compensated: bool,
        reason: String,
    },
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
