pub mod app_config;
pub mod database;
pub mod postgres_repo;
pub mod redis_repo;

use anyhow::Context;
use seatledger_core::repository::{BookingStore, FlightStore, StoreError};
use seatledger_core::{InventoryLedger, MemoryStore};
use seatledger_shared::Flight;
use std::sync::Arc;
use tracing::info;

use crate::app_config::{Config, LedgerConfig, StoreBackend};

pub use database::DbClient;
pub use postgres_repo::PostgresStore;
pub use redis_repo::RedisStore;

/// The two store handles the ledger is built from.
#[derive(Clone)]
pub struct Stores {
    pub flights: Arc<dyn FlightStore>,
    pub bookings: Arc<dyn BookingStore>,
}

impl Stores {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: FlightStore + BookingStore + 'static,
    {
        Self {
            flights: store.clone(),
            bookings: store,
        }
    }

    pub fn ledger(&self, config: &LedgerConfig) -> InventoryLedger {
        InventoryLedger::new(self.flights.clone(), self.bookings.clone())
            .with_max_cancel_attempts(config.max_cancel_attempts)
    }
}

/// Open the backend named in the configuration and seed it if asked to.
pub async fn connect(config: &Config) -> anyhow::Result<Stores> {
    let stores = match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Stores::shared(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let store = RedisStore::new(&config.redis.url, &config.store.namespace)
                .await
                .context("Failed to connect to Redis")?;
            Stores::shared(Arc::new(store))
        }
        StoreBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Stores::shared(Arc::new(PostgresStore::new(db.pool)))
        }
    };

    if let Some(path) = &config.store.seed_path {
        let inserted = seed_flights(stores.flights.as_ref(), path).await?;
        info!("Seeded {} flights from {}", inserted, path);
    }

    Ok(stores)
}

/// Insert the flights listed in a JSON file, skipping any that already exist
/// so a restart never resets a live seat counter.
pub async fn seed_flights(store: &dyn FlightStore, path: &str) -> anyhow::Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path))?;
    let flights: Vec<Flight> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid seed file {}", path))?;

    let mut inserted = 0;
    for flight in flights {
        if store.get_flight(&flight.key()).await?.is_none() {
            store.put_flight(&flight).await?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

pub(crate) fn backend_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use seatledger_shared::FlightKey;

    #[tokio::test]
    async fn test_seed_skips_existing_flights() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let store = MemoryStore::with_flights([Flight::new("SL101", date, 1)]);

        let path = std::env::temp_dir().join(format!("seatledger-seed-{}.json", uuid::Uuid::new_v4()));
        let seed = serde_json::json!([
            { "flightId": "SL101", "departureDate": "2025-03-14", "seatAvailability": 50 },
            { "flightId": "SL202", "departureDate": "2025-03-14", "seatAvailability": 40,
              "departureCity": "Lisbon", "destinationCity": "Oslo" }
        ]);
        tokio::fs::write(&path, seed.to_string()).await.unwrap();

        let inserted = seed_flights(&store, path.to_str().unwrap()).await.unwrap();
        assert_eq!(inserted, 1);

        let existing = store.get_flight(&FlightKey::new("SL101", date)).await.unwrap().unwrap();
        assert_eq!(existing.seat_availability, 1);
        assert!(store.get_flight(&FlightKey::new("SL202", date)).await.unwrap().is_some());

        let _ = tokio::fs::remove_file(&path).await;
    }
}
