use chrono::{DateTime, Utc};
use rand::Rng;

use crate::db::models::{MetricKind, NewReading, Reading};

/// Random-walk parameters for one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricWalk {
    /// Starting point when there is no previous reading.
    pub initial: f64,
    /// Full width of the step; each step is uniform in `[-step/2, step/2)`.
    pub step: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricWalk {
    pub fn for_metric(metric: MetricKind) -> Self {
        match metric {
            MetricKind::Ph => Self { initial: 7.1, step: 0.3, min: 6.3, max: 8.7 },
            MetricKind::Turbidity => Self { initial: 4.0, step: 1.2, min: 1.0, max: 11.5 },
            MetricKind::Temperature => Self { initial: 25.0, step: 0.7, min: 20.0, max: 30.5 },
        }
    }

    /// `unit` is a uniform sample from `[0, 1)`.
    fn apply(&self, previous: f64, unit: f64) -> f64 {
        let next = previous + (unit - 0.5) * self.step;
        round2(next.clamp(self.min, self.max))
    }
}

/// Produces synthetic readings by walking each metric independently from the
/// previous reading.
///
/// The random source is injected so tests can drive it with a seeded or mock
/// RNG and get exact output sequences.
pub struct ReadingGenerator<R> {
    rng: R,
}

impl<R: Rng> ReadingGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// One walk step per metric, in the order ph, turbidity, temperature.
    /// Without a previous reading each metric steps away from its initial value.
    pub fn next(&mut self, previous: Option<&Reading>, now: DateTime<Utc>) -> NewReading {
        let [ph, turbidity, temperature] = MetricKind::ALL.map(|metric| {
            let walk = MetricWalk::for_metric(metric);
            let start = previous.map_or(walk.initial, |r| r.value(metric));
            walk.apply(start, self.rng.gen::<f64>())
        });

        NewReading::new(ph, turbidity, temperature, now)
    }
}

/// Round to two decimal places.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
