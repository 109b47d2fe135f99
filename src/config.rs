use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::coordinator::CoordinatorConfig;

/// Server settings, read from `ROOMSLOT_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub coordinator: CoordinatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5480,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str| parsed::<u64>(&lookup, key).map(Duration::from_millis);

        let defaults = Self::default();
        let coordinator = CoordinatorConfig {
            write_timeout: millis("ROOMSLOT_WRITE_TIMEOUT_MS")
                .unwrap_or(defaults.coordinator.write_timeout),
            pending_grace: millis("ROOMSLOT_PENDING_GRACE_MS")
                .unwrap_or(defaults.coordinator.pending_grace),
            follow_up_delay: millis("ROOMSLOT_FOLLOW_UP_DELAY_MS")
                .unwrap_or(defaults.coordinator.follow_up_delay),
            notify_email: lookup("ROOMSLOT_NOTIFY_EMAIL").filter(|s| !s.trim().is_empty()),
        };

        Self {
            bind: lookup("ROOMSLOT_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "ROOMSLOT_PORT").unwrap_or(defaults.port),
            data_dir: lookup("ROOMSLOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_connections: parsed(&lookup, "ROOMSLOT_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "ROOMSLOT_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "ROOMSLOT_METRICS_PORT"),
            coordinator,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
