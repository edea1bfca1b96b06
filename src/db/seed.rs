use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

use super::{
    models::{DevicePower, MetricKind, NewDevice, NewReading},
    store::{HistoryQuery, Store, StoreError},
};

/// Demo readings, newest first, spaced 40 minutes apart: (ph, turbidity, temperature).
const DEMO_READINGS: [(f64, f64, f64); 8] = [
    (7.2, 3.5, 25.4),
    (6.8, 5.1, 26.1),
    (7.5, 2.0, 24.8),
    (7.1, 3.9, 25.3),
    (7.3, 4.2, 25.9),
    (7.0, 4.8, 24.7),
    (7.6, 3.1, 24.3),
    (6.9, 5.5, 26.4),
];

const DEMO_SPACING_MINUTES: i64 = 40;

/// One row per monitored channel, in id order.
pub fn default_devices() -> Vec<NewDevice> {
    #[allow(clippy::too_many_arguments)]
    fn device(
        name: &str,
        metric: MetricKind,
        status: DevicePower,
        battery: i32,
        heartbeat: &str,
        signal: i32,
        calibration: &str,
        freshness_minutes: i32,
    ) -> NewDevice {
        NewDevice {
            name: name.to_owned(),
            metric,
            status,
            battery,
            heartbeat: heartbeat.to_owned(),
            signal,
            calibration: calibration.to_owned(),
            freshness_minutes,
        }
    }

    vec![
        device("Temperature Sensor", MetricKind::Temperature, DevicePower::On, 91, "2s ago", 84, "Calibrated", 12),
        device("Turbidity Sensor", MetricKind::Turbidity, DevicePower::On, 88, "8s ago", 63, "Due Soon", 38),
        device("pH Sensor", MetricKind::Ph, DevicePower::Off, 42, "Offline", 24, "Needs Calibration", 97),
    ]
}

pub fn demo_readings(now: DateTime<Utc>) -> Vec<NewReading> {
    DEMO_READINGS
        .iter()
        .zip(0..)
        .map(|(&(ph, turbidity, temperature), i)| {
            let at = now - TimeDelta::minutes(i * DEMO_SPACING_MINUTES);
            NewReading::new(ph, turbidity, temperature, at)
        })
        .collect()
}

/// Create the default devices if the store has none and, when asked, fill an
/// empty reading table with demo data.
pub async fn bootstrap(
    store: &dyn Store,
    now: DateTime<Utc>,
    with_demo_readings: bool,
) -> Result<(), StoreError> {
    let inserted = store.seed_devices(&default_devices(), now).await?;
    if inserted > 0 {
        info!(devices = inserted, "Default devices created");
    }

    if with_demo_readings {
        let empty = store
            .history(&HistoryQuery { limit: 1, ..Default::default() })
            .await?
            .is_empty();
        if empty {
            let readings = demo_readings(now);
            for reading in &readings {
                store.insert_reading(reading).await?;
            }
            info!(readings = readings.len(), "Demo readings created");
        }
    }

    Ok(())
}
