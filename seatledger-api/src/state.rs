use seatledger_core::InventoryLedger;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<InventoryLedger>,
}

impl AppState {
    pub fn new(ledger: InventoryLedger) -> Self {
        Self {
            ledger: Arc::new(ledger),
        }
    }
}
