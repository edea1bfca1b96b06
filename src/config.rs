use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};

use crate::sampling::{
    cycle::{DEFAULT_REST_WINDOW, DEFAULT_SAMPLE_WINDOW, DEFAULT_TICK_INTERVAL},
    CycleConfig,
};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL URL. When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    /// Allowed CORS origin; `*` allows any.
    pub cors_origin: String,
    pub cycle: CycleConfig,
    /// How long shutdown waits for an in-flight tick.
    pub shutdown_grace: Duration,
    pub simulation_enabled: bool,
    /// Fixed RNG seed for reproducible runs.
    pub simulation_seed: Option<u64>,
    /// Insert demo readings into an empty store at startup.
    pub seed_demo_readings: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);

        let cycle = CycleConfig::from_millis(
            env.parsed("SAMPLE_WINDOW_MS", DEFAULT_SAMPLE_WINDOW.as_millis() as u64)?,
            env.parsed("REST_WINDOW_MS", DEFAULT_REST_WINDOW.as_millis() as u64)?,
            env.parsed("TICK_INTERVAL_MS", DEFAULT_TICK_INTERVAL.as_millis() as u64)?,
        )
        .context("invalid sampling cycle configuration")?;

        let shutdown_grace_ms: u64 = env.parsed("SHUTDOWN_GRACE_MS", 5_000)?;
        anyhow::ensure!(shutdown_grace_ms > 0, "SHUTDOWN_GRACE_MS must be greater than zero");

        Ok(Self {
            database_url: env.get("DATABASE_URL").filter(|s| !s.is_empty()),
            server_host: env.get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            server_port: env.parsed("SERVER_PORT", 4000)?,
            cors_origin: env.get("CORS_ORIGIN").unwrap_or_else(|| "*".to_owned()),
            cycle,
            shutdown_grace: Duration::from_millis(shutdown_grace_ms),
            simulation_enabled: env.flag("SIMULATION_ENABLED", true)?,
            simulation_seed: env
                .get("SIMULATION_SEED")
                .map(|s| s.parse().context("SIMULATION_SEED must be an unsigned integer"))
                .transpose()?,
            seed_demo_readings: env.flag("SEED_DEMO_READINGS", false)?,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_owned())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(anyhow::anyhow!("{key} must be a boolean, got {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeDelta;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.database_url, None);
        assert_eq!(c.server_host, "0.0.0.0");
        assert_eq!(c.server_port, 4000);
        assert_eq!(c.cors_origin, "*");
        assert_eq!(c.cycle, CycleConfig::default());
        assert_eq!(c.shutdown_grace, Duration::from_secs(5));
        assert!(c.simulation_enabled);
        assert_eq!(c.simulation_seed, None);
        assert!(!c.seed_demo_readings);
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("DATABASE_URL", "postgres://localhost/water"),
            ("SERVER_PORT", "8080"),
            ("SAMPLE_WINDOW_MS", "1000"),
            ("REST_WINDOW_MS", "2000"),
            ("TICK_INTERVAL_MS", "100"),
            ("SIMULATION_ENABLED", "false"),
            ("SIMULATION_SEED", "17"),
            ("SEED_DEMO_READINGS", "1"),
        ])
        .unwrap();
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/water"));
        assert_eq!(c.server_port, 8080);
        assert_eq!(c.cycle.sample_window(), TimeDelta::seconds(1));
        assert_eq!(c.cycle.rest_window(), TimeDelta::seconds(2));
        assert_eq!(c.cycle.tick_interval(), Duration::from_millis(100));
        assert!(!c.simulation_enabled);
        assert_eq!(c.simulation_seed, Some(17));
        assert!(c.seed_demo_readings);
    }

    #[test]
    fn empty_database_url_means_memory() {
        let c = config(&[("DATABASE_URL", "")]).unwrap();
        assert_eq!(c.database_url, None);
    }

    #[test]
    fn zero_window_is_fatal() {
        let err = config(&[("SAMPLE_WINDOW_MS", "0")]).unwrap_err();
        assert!(format!("{err:#}").contains("sample window must be greater than zero"));

        let err = config(&[("TICK_INTERVAL_MS", "0")]).unwrap_err();
        assert!(format!("{err:#}").contains("tick interval"));
    }

    #[test]
    fn negative_window_is_fatal() {
        let err = config(&[("REST_WINDOW_MS", "-5")]).unwrap_err();
        assert!(err.to_string().contains("REST_WINDOW_MS"));
    }

    #[test]
    fn non_numeric_port_errors() {
        let err = config(&[("SERVER_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
    }

    #[test]
    fn bad_flag_errors() {
        let err = config(&[("SIMULATION_ENABLED", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("SIMULATION_ENABLED"));
    }
}
