//! Periodic settlement/rebate reconciliation sweep.
//!
//! Scans recently settled periods and repairs any that are missing rebate
//! records. Safe to run alongside any number of settlement processes; the
//! database guards provide correctness, this binary just provides cadence.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, Level};

use gridline_engine::{DrawCache, SettlementEngine, Store};

fn default_interval_secs() -> u64 {
    60
}

fn default_window_secs() -> u64 {
    6 * 60 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize)]
struct Config {
    database: DatabaseConfig,
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
    #[serde(default = "default_window_secs")]
    window_secs: u64,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct DatabaseConfig {
    backend: String,
    path: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Error)]
enum ConfigError {
    #[error("database.backend must be sqlite or postgres (got {value:?})")]
    InvalidBackend { value: String },
    #[error("database.{field} is required for the {backend} backend")]
    MissingField {
        field: &'static str,
        backend: &'static str,
    },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0")]
    InvalidNonZero { field: &'static str },
}

enum StoreTarget {
    Sqlite(PathBuf),
    Postgres(String),
}

struct ValidatedConfig {
    target: StoreTarget,
    interval: Duration,
    window_ms: u64,
    log_level: Level,
}

impl Config {
    fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let target = match self.database.backend.as_str() {
            "sqlite" => {
                let path = self.database.path.ok_or(ConfigError::MissingField {
                    field: "path",
                    backend: "sqlite",
                })?;
                StoreTarget::Sqlite(PathBuf::from(path))
            }
            "postgres" => {
                let url = self.database.url.ok_or(ConfigError::MissingField {
                    field: "url",
                    backend: "postgres",
                })?;
                StoreTarget::Postgres(url)
            }
            other => {
                return Err(ConfigError::InvalidBackend {
                    value: other.to_string(),
                })
            }
        };
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "interval_secs",
            });
        }
        if self.window_secs == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "window_secs",
            });
        }
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;
        Ok(ValidatedConfig {
            target,
            interval: Duration::from_secs(self.interval_secs),
            window_ms: self.window_secs * 1_000,
            log_level,
        })
    }
}

fn open_store(target: &StoreTarget) -> Result<Store> {
    match target {
        StoreTarget::Sqlite(path) => {
            Store::open_sqlite(path).with_context(|| format!("open sqlite store {path:?}"))
        }
        StoreTarget::Postgres(url) => {
            Store::open_postgres(url).context("open postgres store")
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

fn main() -> Result<()> {
    // Parse arguments
    let matches = Command::new("gridline-sweep")
        .about("Repair settled periods that are missing rebate distribution.")
        .arg(Arg::new("config").long("config").required(true))
        .arg(
            Arg::new("once")
                .long("once")
                .action(ArgAction::SetTrue)
                .help("Run a single sweep cycle and exit"),
        )
        .get_matches();
    let once = matches.get_flag("once");

    // Load from config file
    let config_file = matches
        .get_one::<String>("config")
        .expect("--config is required");
    let raw = std::fs::read_to_string(config_file)
        .with_context(|| format!("read config file {config_file}"))?;
    let config: Config = serde_yaml::from_str(&raw).context("parse config file")?;
    let config = config.validate().context("validate config")?;

    // Setup logging
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();
    info!(
        interval_secs = config.interval.as_secs(),
        window_secs = config.window_ms / 1_000,
        "Starting reconciliation sweep"
    );

    let mut store = open_store(&config.target)?;
    let mut engine = SettlementEngine::new(DrawCache::new(256, Duration::from_secs(3_600)));
    loop {
        if let Err(err) = engine.reconcile_recent(&mut store, config.window_ms, now_ms()) {
            error!(error = %err, "Sweep cycle failed");
        }
        if once {
            break;
        }
        std::thread::sleep(config.interval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validates_sqlite() {
        let config: Config = serde_yaml::from_str(
            "database:\n  backend: sqlite\n  path: /tmp/gridline.db\ninterval_secs: 30\n",
        )
        .unwrap();
        let validated = config.validate().unwrap();
        assert!(matches!(validated.target, StoreTarget::Sqlite(_)));
        assert_eq!(validated.interval, Duration::from_secs(30));
        assert_eq!(validated.window_ms, 6 * 60 * 60 * 1_000);
    }

    #[test]
    fn test_config_rejects_missing_url() {
        let config: Config =
            serde_yaml::from_str("database:\n  backend: postgres\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field: "url", .. })
        ));
    }

    #[test]
    fn test_config_rejects_unknown_backend() {
        let config: Config =
            serde_yaml::from_str("database:\n  backend: mysql\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBackend { .. })
        ));
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let config: Config = serde_yaml::from_str(
            "database:\n  backend: sqlite\n  path: a.db\ninterval_secs: 0\n",
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNonZero { field: "interval_secs" })
        ));
    }
}
