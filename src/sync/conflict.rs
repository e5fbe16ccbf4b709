//! Conflict detection and resolution for offline sync
//!
//! Resolution is a pure decision over versions and timestamps; applying the
//! winner is the engine's job.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

/// Fields a client payload can never overwrite
pub const PROTECTED_FIELDS: &[&str] = &[
    "id",
    "tenant_id",
    "created_at",
    "updated_at",
    "sync_version",
    "sync_status",
    "last_sync_at",
    "last_modified_device",
];

/// Columns only the server writes: photo URLs name files on disk and
/// `recorded_by` must stay a user of the same farm
pub const SERVER_OWNED_FIELDS: &[&str] = &["photo_url", "recorded_by"];

pub fn is_protected(field: &str) -> bool {
    PROTECTED_FIELDS.contains(&field) || SERVER_OWNED_FIELDS.contains(&field)
}

/// How a version conflict is settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../sdk/generated/")]
pub enum ConflictStrategy {
    #[default]
    ServerWins,
    ClientWins,
    LastWriteWins,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerWins => "server_wins",
            Self::ClientWins => "client_wins",
            Self::LastWriteWins => "last_write_wins",
        }
    }

    pub fn resolve(&self, server_updated_at: DateTime<Utc>, client_timestamp: DateTime<Utc>) -> Resolution {
        match self {
            Self::ServerWins => server_wins(),
            Self::ClientWins => client_wins(),
            Self::LastWriteWins => last_write_wins(server_updated_at, client_timestamp),
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "server_wins" => Ok(Self::ServerWins),
            "client_wins" => Ok(Self::ClientWins),
            "last_write_wins" | "lww" => Ok(Self::LastWriteWins),
            other => Err(format!(
                "unknown conflict strategy '{}' (expected server_wins, client_wins or last_write_wins)",
                other
            )),
        }
    }
}

/// Which side's state survives a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../sdk/generated/")]
pub enum Resolution {
    ServerWins,
    ClientWins,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerWins => "server_wins",
            Self::ClientWins => "client_wins",
        }
    }
}

/// A conflict exists only when the client edited a stale version
pub fn is_conflict(client_version: i64, server_version: i64) -> bool {
    client_version < server_version
}

pub fn server_wins() -> Resolution {
    Resolution::ServerWins
}

pub fn client_wins() -> Resolution {
    Resolution::ClientWins
}

/// Client wins only when strictly newer; ties keep the server state
pub fn last_write_wins(server_updated_at: DateTime<Utc>, client_timestamp: DateTime<Utc>) -> Resolution {
    if client_timestamp > server_updated_at {
        Resolution::ClientWins
    } else {
        Resolution::ServerWins
    }
}

/// Overlay client fields onto a serialized server row.
///
/// Only keys the server row already has are taken; protected and unknown
/// keys are dropped silently.
pub fn merge_fields(server: &Map<String, Value>, client: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = server.clone();
    for (key, value) in client {
        if is_protected(key) || !server.contains_key(key) {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}
