use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::Level;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Which [`DocumentStore`](crate::store::DocumentStore) backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Append-only log under the data directory.
    Log,
    /// In-process map, lost on restart.
    Memory,
}

impl FromStr for StoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(StoreKind::Log),
            "memory" => Ok(StoreKind::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub production: bool,
    pub store: StoreKind,
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "0.0.0.0".into(),
            production: false,
            store: StoreKind::Log,
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

fn parse<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Unset and empty variables
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(v) = get("AMBULANCE_API_PORT") {
            config.port = parse("AMBULANCE_API_PORT", v)?;
        }
        if let Some(v) = get("AMBULANCE_API_BIND") {
            config.bind = v;
        }
        if let Some(v) = get("AMBULANCE_API_ENVIRONMENT") {
            config.production = v.trim().eq_ignore_ascii_case("production");
        }
        if let Some(v) = get("AMBULANCE_API_STORE") {
            config.store = parse("AMBULANCE_API_STORE", v)?;
        }
        if let Some(v) = get("AMBULANCE_API_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("AMBULANCE_API_COMPACT_THRESHOLD") {
            config.compact_threshold = parse("AMBULANCE_API_COMPACT_THRESHOLD", v)?;
            if config.compact_threshold == 0 {
                return Err(ConfigError::Zero {
                    var: "AMBULANCE_API_COMPACT_THRESHOLD",
                });
            }
        }
        if let Some(v) = get("AMBULANCE_API_METRICS_PORT") {
            config.metrics_port = Some(parse("AMBULANCE_API_METRICS_PORT", v)?);
        }
        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn log_level(&self) -> Level {
        if self.production {
            Level::INFO
        } else {
            Level::DEBUG
        }
    }

    /// Log file of the durable store.
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("ambulances.wal")
    }
}
