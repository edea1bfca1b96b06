//! Duty-cycle bookkeeping.
//!
//! A cycle is a sampling window followed by a resting window. The phase is
//! always recomputed from `now - cycle_start`, never from a tick count, so a
//! late or missed tick still lands in the right phase.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::db::models::{DevicePower, DeviceState, Reading};

pub const DEFAULT_SAMPLE_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_REST_WINDOW: Duration = Duration::from_secs(40 * 60);
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

const SAMPLING_HEARTBEAT: &str = "Just now";
const SAMPLING_SIGNAL: i32 = 75;
const RESTING_HEARTBEAT: &str = "Offline";
const RESTING_SIGNAL: i32 = 20;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CycleConfigError {
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("{0} is too large")]
    OutOfRange(&'static str),
}

/// Validated window lengths. All three durations are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleConfig {
    sample_window: TimeDelta,
    rest_window: TimeDelta,
    tick_interval: Duration,
}

impl CycleConfig {
    pub fn new(
        sample_window: Duration,
        rest_window: Duration,
        tick_interval: Duration,
    ) -> Result<Self, CycleConfigError> {
        Ok(Self {
            sample_window: positive_delta("sample window", sample_window)?,
            rest_window: positive_delta("rest window", rest_window)?,
            tick_interval: {
                positive_delta("tick interval", tick_interval)?;
                tick_interval
            },
        })
    }

    pub fn from_millis(
        sample_window_ms: u64,
        rest_window_ms: u64,
        tick_interval_ms: u64,
    ) -> Result<Self, CycleConfigError> {
        Self::new(
            Duration::from_millis(sample_window_ms),
            Duration::from_millis(rest_window_ms),
            Duration::from_millis(tick_interval_ms),
        )
    }

    pub fn sample_window(&self) -> TimeDelta {
        self.sample_window
    }

    pub fn rest_window(&self) -> TimeDelta {
        self.rest_window
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn cycle_length(&self) -> TimeDelta {
        self.sample_window + self.rest_window
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            sample_window: TimeDelta::minutes(5),
            rest_window: TimeDelta::minutes(40),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

fn positive_delta(name: &'static str, d: Duration) -> Result<TimeDelta, CycleConfigError> {
    if d.is_zero() {
        return Err(CycleConfigError::NotPositive(name));
    }
    let delta = TimeDelta::from_std(d).map_err(|_| CycleConfigError::OutOfRange(name))?;
    // Two windows are summed into the cycle length; keep that sum representable.
    if delta > TimeDelta::days(365 * 100) {
        return Err(CycleConfigError::OutOfRange(name));
    }
    Ok(delta)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sampling,
    Resting,
}

impl Phase {
    /// Phase for a point `elapsed` into the current cycle, or `None` once the
    /// whole cycle has elapsed.
    pub fn within_cycle(elapsed: TimeDelta, config: &CycleConfig) -> Option<Phase> {
        if elapsed < config.sample_window {
            Some(Phase::Sampling)
        } else if elapsed < config.cycle_length() {
            Some(Phase::Resting)
        } else {
            None
        }
    }

    pub fn is_sampling(self) -> bool {
        self == Phase::Sampling
    }

    /// Device fields written on every tick in this phase.
    pub fn device_state(self, freshness_minutes: i32, now: DateTime<Utc>) -> DeviceState {
        let (status, heartbeat, signal) = match self {
            Phase::Sampling => (DevicePower::On, SAMPLING_HEARTBEAT, SAMPLING_SIGNAL),
            Phase::Resting => (DevicePower::Off, RESTING_HEARTBEAT, RESTING_SIGNAL),
        };
        DeviceState {
            status,
            heartbeat: heartbeat.to_owned(),
            signal,
            freshness_minutes,
            last_update: now,
        }
    }
}

/// State carried from one tick to the next. Owned by the sampling task alone.
#[derive(Debug, Clone)]
pub struct CycleState {
    cycle_start: DateTime<Utc>,
    previous: Option<Reading>,
}

impl CycleState {
    pub fn new(cycle_start: DateTime<Utc>, previous: Option<Reading>) -> Self {
        Self { cycle_start, previous }
    }

    pub fn cycle_start(&self) -> DateTime<Utc> {
        self.cycle_start
    }

    /// The reading that seeds the next random-walk step.
    pub fn previous(&self) -> Option<&Reading> {
        self.previous.as_ref()
    }

    /// Decide the phase at `now`, starting a fresh cycle (in sampling) when the
    /// previous one has run its full length.
    pub fn phase_at(&mut self, now: DateTime<Utc>, config: &CycleConfig) -> Phase {
        match Phase::within_cycle(now - self.cycle_start, config) {
            Some(phase) => phase,
            None => {
                self.cycle_start = now;
                Phase::Sampling
            }
        }
    }

    pub fn record(&mut self, reading: Reading) {
        self.previous = Some(reading);
    }

    pub fn freshness_minutes(&self, now: DateTime<Utc>) -> i32 {
        freshness_minutes(self.previous.as_ref().map(|r| r.recorded_at), now)
    }
}

/// Age of `last` in whole minutes (rounded), never negative; 0 without a reading.
pub fn freshness_minutes(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i32 {
    let Some(last) = last else {
        return 0;
    };
    let minutes = ((now - last).num_milliseconds() as f64 / 60_000.0).round();
    minutes.clamp(0.0, i32::MAX as f64) as i32
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::db::models::NewReading;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn reading_at(at: DateTime<Utc>) -> Reading {
        NewReading::new(7.1, 4.0, 25.0, at).into_reading(1)
    }

    #[test]
    fn default_windows() {
        let c = CycleConfig::default();
        assert_eq!(c.sample_window(), TimeDelta::minutes(5));
        assert_eq!(c.rest_window(), TimeDelta::minutes(40));
        assert_eq!(c.tick_interval(), Duration::from_secs(10));
        assert_eq!(c.cycle_length(), TimeDelta::minutes(45));
        assert_eq!(
            CycleConfig::new(DEFAULT_SAMPLE_WINDOW, DEFAULT_REST_WINDOW, DEFAULT_TICK_INTERVAL),
            Ok(c)
        );
    }

    #[test]
    fn zero_durations_are_rejected() {
        assert_eq!(
            CycleConfig::from_millis(0, 1, 1),
            Err(CycleConfigError::NotPositive("sample window"))
        );
        assert_eq!(
            CycleConfig::from_millis(1, 0, 1),
            Err(CycleConfigError::NotPositive("rest window"))
        );
        assert_eq!(
            CycleConfig::from_millis(1, 1, 0),
            Err(CycleConfigError::NotPositive("tick interval"))
        );
    }

    #[test]
    fn huge_durations_are_rejected() {
        let err = CycleConfig::new(Duration::MAX, Duration::from_secs(1), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err, CycleConfigError::OutOfRange("sample window"));
    }

    #[test]
    fn phase_boundaries() {
        let c = CycleConfig::default();
        let phase = |d: TimeDelta| Phase::within_cycle(d, &c);

        assert_eq!(phase(TimeDelta::zero()), Some(Phase::Sampling));
        assert_eq!(phase(TimeDelta::minutes(5) - TimeDelta::milliseconds(1)), Some(Phase::Sampling));
        assert_eq!(phase(TimeDelta::minutes(5)), Some(Phase::Resting));
        assert_eq!(phase(TimeDelta::minutes(45) - TimeDelta::milliseconds(1)), Some(Phase::Resting));
        assert_eq!(phase(TimeDelta::minutes(45)), None);
    }

    #[test]
    fn phase_at_wraps_exactly_at_cycle_length() {
        let c = CycleConfig::default();
        let mut state = CycleState::new(t0(), None);

        assert_eq!(state.phase_at(t0() + TimeDelta::minutes(44), &c), Phase::Resting);
        assert_eq!(state.cycle_start(), t0());

        let wrap = t0() + TimeDelta::minutes(45);
        assert_eq!(state.phase_at(wrap, &c), Phase::Sampling);
        assert_eq!(state.cycle_start(), wrap);

        assert_eq!(state.phase_at(wrap + TimeDelta::minutes(4), &c), Phase::Sampling);
        assert_eq!(state.phase_at(wrap + TimeDelta::minutes(6), &c), Phase::Resting);
    }

    #[test]
    fn phase_after_long_pause_starts_new_cycle() {
        let c = CycleConfig::default();
        let mut state = CycleState::new(t0(), None);
        let late = t0() + TimeDelta::hours(10);

        assert_eq!(state.phase_at(late, &c), Phase::Sampling);
        assert_eq!(state.cycle_start(), late);
    }

    #[test]
    fn freshness_rounds_to_whole_minutes() {
        let now = t0();
        assert_eq!(freshness_minutes(Some(now - TimeDelta::seconds(125)), now), 2);
        assert_eq!(freshness_minutes(Some(now - TimeDelta::seconds(29)), now), 0);
        assert_eq!(freshness_minutes(Some(now - TimeDelta::seconds(30)), now), 1);
        assert_eq!(freshness_minutes(Some(now - TimeDelta::minutes(6)), now), 6);
    }

    #[test]
    fn freshness_without_reading_is_zero() {
        assert_eq!(freshness_minutes(None, t0()), 0);
        assert_eq!(CycleState::new(t0(), None).freshness_minutes(t0()), 0);
    }

    #[test]
    fn freshness_of_future_reading_is_zero() {
        let now = t0();
        assert_eq!(freshness_minutes(Some(now + TimeDelta::minutes(3)), now), 0);
    }

    #[test]
    fn record_replaces_previous() {
        let mut state = CycleState::new(t0(), Some(reading_at(t0())));
        let later = reading_at(t0() + TimeDelta::minutes(1));
        state.record(later.clone());
        assert_eq!(state.previous(), Some(&later));
        assert_eq!(state.freshness_minutes(t0() + TimeDelta::minutes(3)), 2);
    }

    #[test]
    fn device_state_per_phase() {
        let now = t0();
        let on = Phase::Sampling.device_state(0, now);
        assert_eq!(on.status, DevicePower::On);
        assert_eq!(on.heartbeat, "Just now");
        assert_eq!(on.signal, 75);
        assert_eq!(on.last_update, now);

        let off = Phase::Resting.device_state(6, now);
        assert_eq!(off.status, DevicePower::Off);
        assert_eq!(off.heartbeat, "Offline");
        assert_eq!(off.signal, 20);
        assert_eq!(off.freshness_minutes, 6);
    }
}
