use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    models::{Device, DeviceState, DeviceTarget, NewDevice, NewReading, Reading},
    store::{HistoryQuery, Store, StoreError},
};

const READING_COLUMNS: &str = "id, ph, turbidity, temperature, status, recorded_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_reading(&self, reading: &NewReading) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sensor_readings (ph, turbidity, temperature, status, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(reading.ph())
        .bind(reading.turbidity())
        .bind(reading.temperature())
        .bind(reading.status())
        .bind(reading.recorded_at())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn latest_reading(&self) -> Result<Option<Reading>, StoreError> {
        let row = sqlx::query_as::<_, Reading>(&format!(
            "SELECT {READING_COLUMNS} FROM sensor_readings \
             ORDER BY recorded_at DESC, id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<Reading>, StoreError> {
        let rows = sqlx::query_as::<_, Reading>(&format!(
            "SELECT {READING_COLUMNS} FROM sensor_readings \
             WHERE ($1::timestamptz IS NULL OR recorded_at >= $1) \
               AND ($2::timestamptz IS NULL OR recorded_at <= $2) \
               AND ($4::text IS NULL OR recorded_at::text ILIKE '%' || $4 || '%') \
             ORDER BY recorded_at DESC, id DESC \
             LIMIT $3"
        ))
        .bind(query.from)
        .bind(query.to)
        .bind(query.limit.max(0))
        .bind(query.q.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn update_device_state(
        &self,
        target: DeviceTarget,
        state: &DeviceState,
    ) -> Result<u64, StoreError> {
        let id = match target {
            DeviceTarget::All => None,
            DeviceTarget::One(id) => Some(id),
        };

        let result = sqlx::query(
            r#"
            UPDATE devices
            SET status            = $1,
                heartbeat         = $2,
                signal            = $3,
                freshness_minutes = $4,
                last_update       = $5
            WHERE ($6::int IS NULL OR id = $6)
            "#,
        )
        .bind(state.status)
        .bind(&state.heartbeat)
        .bind(state.signal)
        .bind(state.freshness_minutes)
        .bind(state.last_update)
        .bind(id)
        .execute(&self.pool)
        .await?;

        match id {
            Some(id) if result.rows_affected() == 0 => Err(StoreError::DeviceNotFound(id)),
            _ => Ok(result.rows_affected()),
        }
    }

    async fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
        let rows = sqlx::query_as::<_, Device>(
            r#"
            SELECT id, name, metric, status, battery, heartbeat, signal,
                   calibration, freshness_minutes, last_update
            FROM devices
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn seed_devices(
        &self,
        devices: &[NewDevice],
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialise concurrent bootstraps so the emptiness check stays valid.
        sqlx::query("LOCK TABLE devices IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM devices")
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            tx.rollback().await?;
            return Ok(0);
        }

        for d in devices {
            sqlx::query(
                r#"
                INSERT INTO devices (
                    name, metric, status, battery, heartbeat, signal,
                    calibration, freshness_minutes, last_update
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&d.name)
            .bind(d.metric)
            .bind(d.status)
            .bind(d.battery)
            .bind(&d.heartbeat)
            .bind(d.signal)
            .bind(&d.calibration)
            .bind(d.freshness_minutes)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(devices.len())
    }
}

// ---------------------------------------------------------------------------
// Tests (need a PostgreSQL instance via DATABASE_URL)
// ---------------------------------------------------------------------------
