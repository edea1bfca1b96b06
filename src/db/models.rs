use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::sensors::status::overall_status;

/// Mirrors the `metric_kind` Postgres enum. One device row exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "metric_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Ph,
    Turbidity,
    Temperature,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Ph, MetricKind::Turbidity, MetricKind::Temperature];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Ph => "ph",
            MetricKind::Turbidity => "turbidity",
            MetricKind::Temperature => "temperature",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "ph" => Ok(Self::Ph),
            "turbidity" => Ok(Self::Turbidity),
            "temperature" => Ok(Self::Temperature),
            other => Err(anyhow::anyhow!("unknown metric: {other:?}")),
        }
    }
}

/// Health label of a single metric or of a whole reading.
/// Mirrors the `reading_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "reading_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Normal,
    Warning,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Normal => "normal",
            Status::Warning => "warning",
        })
    }
}

/// Power state of a device row. Mirrors the `device_power` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "device_power", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DevicePower {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub ph: f64,
    pub turbidity: f64,
    pub temperature: f64,
    pub status: Status,
    pub recorded_at: DateTime<Utc>,
}

impl Reading {
    pub fn value(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Ph => self.ph,
            MetricKind::Turbidity => self.turbidity,
            MetricKind::Temperature => self.temperature,
        }
    }
}

/// A reading that has not been stored yet.
///
/// Only constructible through [`NewReading::new`], so `status` always agrees
/// with the thresholds applied to the three values.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    ph: f64,
    turbidity: f64,
    temperature: f64,
    status: Status,
    recorded_at: DateTime<Utc>,
}

impl NewReading {
    pub fn new(ph: f64, turbidity: f64, temperature: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            ph,
            turbidity,
            temperature,
            status: overall_status(ph, turbidity, temperature),
            recorded_at,
        }
    }

    pub fn ph(&self) -> f64 {
        self.ph
    }

    pub fn turbidity(&self) -> f64 {
        self.turbidity
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Attach the id assigned by the store.
    pub fn into_reading(self, id: i64) -> Reading {
        Reading {
            id,
            ph: self.ph,
            turbidity: self.turbidity,
            temperature: self.temperature,
            status: self.status,
            recorded_at: self.recorded_at,
        }
    }
}

/// A full `devices` row.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Device {
    pub id: i32,
    pub name: String,
    pub metric: MetricKind,
    pub status: DevicePower,
    pub battery: i32,
    pub heartbeat: String,
    pub signal: i32,
    pub calibration: String,
    pub freshness_minutes: i32,
    pub last_update: DateTime<Utc>,
}

impl Device {
    pub fn apply(&mut self, state: &DeviceState) {
        self.status = state.status;
        self.heartbeat = state.heartbeat.clone();
        self.signal = state.signal;
        self.freshness_minutes = state.freshness_minutes;
        self.last_update = state.last_update;
    }
}

/// The scheduler-owned subset of a device row.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub status: DevicePower,
    pub heartbeat: String,
    /// 0-100
    pub signal: i32,
    pub freshness_minutes: i32,
    pub last_update: DateTime<Utc>,
}

/// Which device rows a state update applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTarget {
    All,
    One(i32),
}

/// Values for a device row inserted at bootstrap.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub name: String,
    pub metric: MetricKind,
    pub status: DevicePower,
    pub battery: i32,
    pub heartbeat: String,
    pub signal: i32,
    pub calibration: String,
    pub freshness_minutes: i32,
}
