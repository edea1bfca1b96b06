use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{Device, DeviceState, DeviceTarget, NewDevice, NewReading, Reading};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("device {0} not found")]
    DeviceNotFound(i32),
}

/// Filter for [`Store::history`]. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the timestamp's text form, e.g. `2026-03-01 12:`.
    pub q: Option<String>,
    pub limit: i64,
}

/// Persistence capability used by the sampling loop and the HTTP API.
///
/// Readings are append-only. "Latest" means greatest `recorded_at`, ties
/// broken by the higher id.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append a reading and return its id.
    async fn insert_reading(&self, reading: &NewReading) -> Result<i64, StoreError>;

    async fn latest_reading(&self) -> Result<Option<Reading>, StoreError>;

    /// Newest first.
    async fn history(&self, query: &HistoryQuery) -> Result<Vec<Reading>, StoreError>;

    /// Returns the number of rows updated.
    async fn update_device_state(
        &self,
        target: DeviceTarget,
        state: &DeviceState,
    ) -> Result<u64, StoreError>;

    /// Ordered by device id.
    async fn list_devices(&self) -> Result<Vec<Device>, StoreError>;

    /// Insert `devices` only if no device exists yet. Returns how many were inserted.
    async fn seed_devices(
        &self,
        devices: &[NewDevice],
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}
