//! Wire types for the sync endpoints
//!
//! `entity_type` and `operation` arrive as plain strings so an unknown value
//! fails only its own operation instead of rejecting the whole batch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use super::conflict::{ConflictStrategy, Resolution};

/// Entity types that can travel through sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../sdk/generated/")]
pub enum EntityType {
    Tenant,
    Animal,
    HealthRecord,
    ReproductionRecord,
    ProductionRecord,
    Transaction,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Tenant,
        EntityType::Animal,
        EntityType::HealthRecord,
        EntityType::ReproductionRecord,
        EntityType::ProductionRecord,
        EntityType::Transaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Animal => "animal",
            Self::HealthRecord => "health_record",
            Self::ReproductionRecord => "reproduction_record",
            Self::ProductionRecord => "production_record",
            Self::Transaction => "transaction",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown entity type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// One client mutation recorded while offline
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../sdk/generated/")]
pub struct SyncOperation {
    pub entity_type: String,
    #[ts(type = "number")]
    pub entity_id: i64,
    pub operation: String,
    #[serde(default)]
    #[ts(optional)]
    pub data: Option<Value>,
    pub device_id: String,
    pub local_timestamp: String,
    /// Version the client last saw for this entity
    #[serde(default)]
    #[ts(type = "number")]
    pub sync_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../sdk/generated/")]
pub struct SyncRequest {
    pub device_id: String,
    #[serde(default)]
    #[ts(optional)]
    pub last_sync: Option<String>,
    /// Overrides the server's configured strategy for this batch
    #[serde(default)]
    #[ts(optional)]
    pub strategy: Option<ConflictStrategy>,
    #[serde(default)]
    pub operations: Vec<SyncOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../sdk/generated/")]
pub struct SyncConflict {
    pub entity_type: EntityType,
    #[ts(type = "number")]
    pub entity_id: i64,
    #[ts(type = "number")]
    pub server_version: i64,
    #[ts(type = "number")]
    pub client_version: i64,
    pub server_data: Value,
    pub client_data: Value,
    pub resolution: Resolution,
}

/// Entity state another writer produced since the client's last sync
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../sdk/generated/")]
pub struct ServerUpdate {
    pub entity_type: EntityType,
    #[ts(type = "number")]
    pub entity_id: i64,
    /// `update`, or `delete` for soft-deleted rows
    pub operation: String,
    pub data: Value,
    #[ts(type = "number")]
    pub sync_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../sdk/generated/")]
pub struct FailedOperation {
    /// Position of the operation in the submitted batch
    pub index: usize,
    pub entity_type: String,
    #[ts(type = "number")]
    pub entity_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../sdk/generated/")]
pub struct SyncResponse {
    pub success: bool,
    pub synced_at: String,
    pub conflicts: Vec<SyncConflict>,
    pub updates_from_server: Vec<ServerUpdate>,
    pub failed_operations: Vec<FailedOperation>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../sdk/generated/")]
pub struct SyncStats {
    pub last_sync: Option<String>,
    #[ts(type = "number")]
    pub pending_operations: i64,
    #[ts(type = "number")]
    pub synced_entities: i64,
    #[ts(type = "number")]
    pub conflicts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../sdk/generated/")]
pub struct MarkSyncedRequest {
    pub entity_type: String,
    #[ts(type = "Array<number>")]
    pub entity_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../sdk/generated/")]
pub struct MarkSyncedResponse {
    pub success: bool,
    pub entity_type: EntityType,
    pub updated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_parsing() {
        assert_eq!("health_record".parse::<EntityType>().unwrap(), EntityType::HealthRecord);
        assert_eq!(EntityType::ReproductionRecord.to_string(), "reproduction_record");
        assert!("finca".parse::<EntityType>().is_err());
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
    }

    #[test]
    fn test_request_defaults() {
        let req: SyncRequest = serde_json::from_value(json!({
            "device_id": "tablet-1",
            "operations": [{
                "entity_type": "animal",
                "entity_id": 10,
                "operation": "delete",
                "device_id": "tablet-1",
                "local_timestamp": "2024-05-01T10:00:00Z"
            }]
        }))
        .unwrap();
        assert!(req.last_sync.is_none());
        assert!(req.strategy.is_none());
        assert_eq!(req.operations[0].sync_version, 0);
        assert!(req.operations[0].data.is_none());
    }
}
