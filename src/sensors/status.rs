//! Threshold rules that label metric values as `normal` or `warning`.
//!
//! | Metric      | Warning when          | Display range | Unit |
//! |-------------|-----------------------|---------------|------|
//! | ph          | `< 6.5` or `> 8.5`    | 6.5-8.5       |      |
//! | turbidity   | `> 8`                 | 0-10          | NTU  |
//! | temperature | `< 20` or `> 30`      | 20-30         | °C   |
//!
//! Boundaries themselves are normal.

use crate::db::models::{MetricKind, Status};

const PH_MIN: f64 = 6.5;
const PH_MAX: f64 = 8.5;
const TURBIDITY_MAX: f64 = 8.0;
const TEMPERATURE_MIN: f64 = 20.0;
const TEMPERATURE_MAX: f64 = 30.0;

pub fn metric_status(metric: MetricKind, value: f64) -> Status {
    let warning = match metric {
        MetricKind::Ph => value < PH_MIN || value > PH_MAX,
        MetricKind::Turbidity => value > TURBIDITY_MAX,
        MetricKind::Temperature => value < TEMPERATURE_MIN || value > TEMPERATURE_MAX,
    };
    if warning {
        Status::Warning
    } else {
        Status::Normal
    }
}

/// Like [`metric_status`] but keyed by the metric's wire name.
/// Unrecognised names are `normal` so odd labels never block ingestion.
pub fn metric_status_by_name(metric: &str, value: f64) -> Status {
    match metric.parse::<MetricKind>() {
        Ok(kind) => metric_status(kind, value),
        Err(_) => Status::Normal,
    }
}

/// `warning` if any of the three metrics is in warning.
pub fn overall_status(ph: f64, turbidity: f64, temperature: f64) -> Status {
    let any_warning = [
        metric_status(MetricKind::Ph, ph),
        metric_status(MetricKind::Turbidity, turbidity),
        metric_status(MetricKind::Temperature, temperature),
    ]
    .contains(&Status::Warning);

    if any_warning {
        Status::Warning
    } else {
        Status::Normal
    }
}

pub fn display_range(metric: MetricKind) -> &'static str {
    match metric {
        MetricKind::Ph => "6.5-8.5",
        MetricKind::Turbidity => "0-10",
        MetricKind::Temperature => "20-30",
    }
}

pub fn unit(metric: MetricKind) -> Option<&'static str> {
    match metric {
        MetricKind::Ph => None,
        MetricKind::Turbidity => Some("NTU"),
        MetricKind::Temperature => Some("°C"),
    }
}
