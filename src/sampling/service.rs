use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::cycle::{CycleConfig, CycleState, Phase};
use crate::{
    db::{
        models::{DeviceTarget, Reading},
        Store,
    },
    sensors::ReadingGenerator,
};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub phase: Phase,
    /// The reading generated and stored during this tick, if any.
    pub reading: Option<Reading>,
    /// Device rows updated, or `None` if the update failed.
    pub devices_updated: Option<u64>,
}

/// Drives the duty cycle: generates readings while sampling and refreshes
/// device state on every tick.
///
/// The service owns its [`CycleState`]; nothing else can observe or mutate it.
/// Ticks run strictly one after another on the task that owns the service.
pub struct SamplingService<R> {
    store: Arc<dyn Store>,
    generator: ReadingGenerator<R>,
    config: CycleConfig,
    state: CycleState,
    last_phase: Option<Phase>,
}

impl<R: Rng + Send + 'static> SamplingService<R> {
    /// Seed the walk from the most recent stored reading, if there is one.
    /// A failed lookup is logged and the walk starts from defaults.
    pub async fn bootstrap(
        store: Arc<dyn Store>,
        rng: R,
        config: CycleConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let previous = match store.latest_reading().await {
            Ok(previous) => previous,
            Err(e) => {
                error!(error = %e, "Failed to load latest reading; starting walk from defaults");
                None
            }
        };

        if let Some(r) = &previous {
            info!(reading_id = r.id, recorded_at = %r.recorded_at, "Resuming walk from stored reading");
        }

        Self {
            store,
            generator: ReadingGenerator::new(rng),
            config,
            state: CycleState::new(now, previous),
            last_phase: None,
        }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    /// Run one tick as of `now`. Store failures are logged, never returned.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let phase = self.state.phase_at(now, &self.config);
        if self.last_phase != Some(phase) {
            info!(phase = ?phase, cycle_start = %self.state.cycle_start(), "Entered phase");
            self.last_phase = Some(phase);
        }

        let mut reading = None;
        if phase.is_sampling() {
            let next = self.generator.next(self.state.previous(), now);
            match self.store.insert_reading(&next).await {
                Ok(id) => {
                    let stored = next.into_reading(id);
                    debug!(
                        reading_id = stored.id,
                        ph = stored.ph,
                        turbidity = stored.turbidity,
                        temperature = stored.temperature,
                        status = %stored.status,
                        "Generated reading"
                    );
                    self.state.record(stored.clone());
                    reading = Some(stored);
                }
                Err(e) => error!(error = %e, "Failed to store generated reading"),
            }
        }

        let device_state = phase.device_state(self.state.freshness_minutes(now), now);
        let devices_updated = match self
            .store
            .update_device_state(DeviceTarget::All, &device_state)
            .await
        {
            Ok(n) => Some(n),
            Err(e) => {
                error!(error = %e, "Failed to update device state");
                None
            }
        };

        TickOutcome { phase, reading, devices_updated }
    }

    /// Runs the loop until `shutdown` flips to `true` or its sender is dropped.
    /// The first tick fires immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.tick_interval();
        info!(
            tick_interval_ms = interval.as_millis() as u64,
            sample_window_secs = self.config.sample_window().num_seconds(),
            rest_window_secs = self.config.rest_window().num_seconds(),
            "Sampling loop started"
        );

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            self.tick_at(Utc::now()).await;
            let took = started.elapsed();
            if took > interval {
                warn!(
                    took_ms = took.as_millis() as u64,
                    tick_interval_ms = interval.as_millis() as u64,
                    "Tick overran its interval; skipping missed ticks"
                );
            }
        }

        info!("Sampling loop stopped");
    }

    pub fn spawn(self) -> SamplingHandle {
        let (tx, rx) = watch::channel(false);
        SamplingHandle {
            shutdown: tx,
            task: tokio::spawn(self.run(rx)),
        }
    }
}

/// Handle to a spawned sampling loop.
pub struct SamplingHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplingHandle {
    /// Ask the loop to stop and wait up to `grace` for an in-flight tick to
    /// finish its writes. After that the task is aborted.
    pub async fn stop(self, grace: Duration) {
        let _ = self.shutdown.send(true);
        let mut task = self.task;

        match time::timeout(grace, &mut task).await {
            Ok(Ok(())) => info!("Sampling loop shut down cleanly"),
            Ok(Err(e)) => error!(error = %e, "Sampling task failed"),
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Sampling tick still running after grace period; aborting"
                );
                task.abort();
            }
        }
    }
}
