use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    db::models::{Device, DevicePower, MetricKind, Reading, Status},
    sensors::{
        generator::round2,
        status::{display_range, metric_status, unit},
    },
};

/// One stored reading.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadingDto {
    pub id: i64,
    pub ph: f64,
    /// NTU
    pub turbidity: f64,
    /// Degrees Celsius
    pub temperature: f64,
    pub status: Status,
    /// When the reading was recorded (RFC3339).
    pub timestamp: DateTime<Utc>,
}

impl From<Reading> for ReadingDto {
    fn from(r: Reading) -> Self {
        Self {
            id: r.id,
            ph: round2(r.ph),
            turbidity: round2(r.turbidity),
            temperature: round2(r.temperature),
            status: r.status,
            timestamp: r.recorded_at,
        }
    }
}

/// A single metric of the latest reading with its own status.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricDto {
    pub value: f64,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Healthy range, for display.
    pub range: String,
}

impl MetricDto {
    fn of(reading: &Reading, metric: MetricKind) -> Self {
        let value = reading.value(metric);
        Self {
            value: round2(value),
            status: metric_status(metric, value),
            unit: unit(metric).map(str::to_owned),
            range: display_range(metric).to_owned(),
        }
    }
}

/// `offline` as soon as any device is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FleetStatus {
    Online,
    Offline,
}

impl FleetStatus {
    pub fn of(devices: &[Device]) -> Self {
        if devices.iter().any(|d| d.status == DevicePower::Off) {
            Self::Offline
        } else {
            Self::Online
        }
    }
}

/// Response for `GET /latest-readings`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LatestReadingsDto {
    pub ph: MetricDto,
    pub turbidity: MetricDto,
    pub temperature: MetricDto,
    pub device_status: FleetStatus,
    pub last_update: DateTime<Utc>,
}

impl LatestReadingsDto {
    pub fn new(reading: &Reading, devices: &[Device]) -> Self {
        Self {
            ph: MetricDto::of(reading, MetricKind::Ph),
            turbidity: MetricDto::of(reading, MetricKind::Turbidity),
            temperature: MetricDto::of(reading, MetricKind::Temperature),
            device_status: FleetStatus::of(devices),
            last_update: reading.recorded_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub id: i32,
    pub name: String,
    pub metric: MetricKind,
    pub status: DevicePower,
    /// Battery percentage.
    pub battery: i32,
    pub heartbeat: String,
    /// Signal strength, 0-100.
    pub signal: i32,
    pub calibration: String,
    /// Age of the newest reading in whole minutes.
    pub freshness_minutes: i32,
    pub last_update: DateTime<Utc>,
}

impl From<Device> for DeviceDto {
    fn from(d: Device) -> Self {
        Self {
            id: d.id,
            name: d.name,
            metric: d.metric,
            status: d.status,
            battery: d.battery,
            heartbeat: d.heartbeat,
            signal: d.signal,
            calibration: d.calibration,
            freshness_minutes: d.freshness_minutes,
            last_update: d.last_update,
        }
    }
}

/// Request body for `POST /iot/readings`.
///
/// Each metric may be a JSON number or a numeric string.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestReadingRequest {
    #[schema(value_type = f64)]
    pub ph: Option<serde_json::Value>,
    #[schema(value_type = f64)]
    pub turbidity: Option<serde_json::Value>,
    #[schema(value_type = f64)]
    pub temperature: Option<serde_json::Value>,
}

impl IngestReadingRequest {
    /// `(ph, turbidity, temperature)`, or `None` if any is missing or not a finite number.
    pub fn parse(&self) -> Option<(f64, f64, f64)> {
        Some((
            numeric(self.ph.as_ref()?)?,
            numeric(self.turbidity.as_ref()?)?,
            numeric(self.temperature.as_ref()?)?,
        ))
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(body: serde_json::Value) -> IngestReadingRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn parses_numbers_and_numeric_strings() {
        let r = request(json!({ "ph": 7.2, "turbidity": "3.5", "temperature": " 25 " }));
        assert_eq!(r.parse(), Some((7.2, 3.5, 25.0)));
    }

    #[test]
    fn rejects_missing_null_and_non_numeric() {
        assert_eq!(request(json!({ "ph": 7.2, "turbidity": 3.5 })).parse(), None);
        assert_eq!(
            request(json!({ "ph": null, "turbidity": 3.5, "temperature": 25 })).parse(),
            None
        );
        assert_eq!(
            request(json!({ "ph": "abc", "turbidity": 3.5, "temperature": 25 })).parse(),
            None
        );
        assert_eq!(
            request(json!({ "ph": true, "turbidity": 3.5, "temperature": 25 })).parse(),
            None
        );
        assert_eq!(
            request(json!({ "ph": "NaN", "turbidity": 3.5, "temperature": 25 })).parse(),
            None
        );
    }

    #[test]
    fn fleet_status_offline_if_any_device_off() {
        let now = Utc::now();
        let device = |status| Device {
            id: 1,
            name: "d".into(),
            metric: MetricKind::Ph,
            status,
            battery: 50,
            heartbeat: "hb".into(),
            signal: 50,
            calibration: "ok".into(),
            freshness_minutes: 0,
            last_update: now,
        };
        assert_eq!(FleetStatus::of(&[]), FleetStatus::Online);
        assert_eq!(FleetStatus::of(&[device(DevicePower::On)]), FleetStatus::Online);
        assert_eq!(
            FleetStatus::of(&[device(DevicePower::On), device(DevicePower::Off)]),
            FleetStatus::Offline
        );
    }
}
