use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    models::{Device, DeviceState, DeviceTarget, NewDevice, NewReading, Reading},
    store::{HistoryQuery, Store, StoreError},
};

/// Process-local [`Store`] used when no database is configured, and in tests.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
/// Uses `tokio::sync::RwLock` so concurrent readers never block each other.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    readings: Vec<Reading>,
    devices: Vec<Device>,
    next_reading_id: i64,
    next_device_id: i32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored readings.
    pub async fn reading_count(&self) -> usize {
        self.inner.read().await.readings.len()
    }
}

/// Same shape PostgreSQL gives `timestamptz::text` in a UTC session.
fn timestamp_text(r: &Reading) -> String {
    r.recorded_at
        .format("%Y-%m-%d %H:%M:%S%.f+00")
        .to_string()
        .to_lowercase()
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_reading(&self, reading: &NewReading) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_reading_id += 1;
        let id = inner.next_reading_id;
        inner.readings.push(reading.clone().into_reading(id));
        Ok(id)
    }

    async fn latest_reading(&self) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .readings
            .iter()
            .max_by_key(|r| (r.recorded_at, r.id))
            .cloned())
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<Reading>, StoreError> {
        let needle = query.q.as_ref().map(|q| q.to_lowercase());
        let inner = self.inner.read().await;
        let mut rows: Vec<Reading> = inner
            .readings
            .iter()
            .filter(|r| query.from.map_or(true, |from| r.recorded_at >= from))
            .filter(|r| query.to.map_or(true, |to| r.recorded_at <= to))
            .filter(|r| needle.as_deref().map_or(true, |q| timestamp_text(r).contains(q)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.recorded_at, b.id).cmp(&(a.recorded_at, a.id)));
        rows.truncate(query.limit.max(0) as usize);
        Ok(rows)
    }

    async fn update_device_state(
        &self,
        target: DeviceTarget,
        state: &DeviceState,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        match target {
            DeviceTarget::All => {
                inner.devices.iter_mut().for_each(|d| d.apply(state));
                Ok(inner.devices.len() as u64)
            }
            DeviceTarget::One(id) => {
                let device = inner
                    .devices
                    .iter_mut()
                    .find(|d| d.id == id)
                    .ok_or(StoreError::DeviceNotFound(id))?;
                device.apply(state);
                Ok(1)
            }
        }
    }

    async fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
        // Ids are assigned in insertion order, so the vector is already sorted.
        Ok(self.inner.read().await.devices.clone())
    }

    async fn seed_devices(
        &self,
        devices: &[NewDevice],
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.devices.is_empty() {
            return Ok(0);
        }
        for d in devices {
            inner.next_device_id += 1;
            let id = inner.next_device_id;
            inner.devices.push(Device {
                id,
                name: d.name.clone(),
                metric: d.metric,
                status: d.status,
                battery: d.battery,
                heartbeat: d.heartbeat.clone(),
                signal: d.signal,
                calibration: d.calibration.clone(),
                freshness_minutes: d.freshness_minutes,
                last_update: now,
            });
        }
        Ok(devices.len())
    }
}
