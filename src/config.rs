use std::path::PathBuf;
use std::str::FromStr;

use crate::rooms::{RoomDirectory, RoomError};

pub const DEFAULT_ROOMS: &str =
    "large:Large meeting room,small:Small meeting room,booth:Phone booth";

/// Process configuration, read once from `ROOMLOCK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub rooms: RoomDirectory,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub admit_attempts: u32,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, RoomError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source. Unparseable numbers fall back to
    /// their defaults; an unparseable room table is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RoomError> {
        let rooms = lookup("ROOMLOCK_ROOMS").unwrap_or_else(|| DEFAULT_ROOMS.to_string());
        Ok(Self {
            bind: lookup("ROOMLOCK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "ROOMLOCK_PORT").unwrap_or(5480),
            data_dir: lookup("ROOMLOCK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            rooms: RoomDirectory::parse(&rooms)?,
            max_connections: parsed(&lookup, "ROOMLOCK_MAX_CONNECTIONS").unwrap_or(256),
            compact_threshold: parsed(&lookup, "ROOMLOCK_COMPACT_THRESHOLD").unwrap_or(1000),
            admit_attempts: parsed(&lookup, "ROOMLOCK_ADMIT_ATTEMPTS")
                .filter(|&n: &u32| n > 0)
                .unwrap_or(3),
            metrics_port: parsed(&lookup, "ROOMLOCK_METRICS_PORT"),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
