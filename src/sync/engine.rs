//! Batch processor for offline sync
//!
//! Operations are applied strictly in submission order, each in its own
//! immediate transaction, so a later operation sees the effect of an earlier
//! one in the same batch. A failing operation is rolled back alone and
//! reported in `failed_operations`; the rest of the batch carries on.

use chrono::{DateTime, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::SqliteConnection;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::conflict::{is_conflict, is_protected, ConflictStrategy, Resolution};
use super::protocol::{
    EntityType, FailedOperation, MarkSyncedRequest, MarkSyncedResponse, OperationKind,
    ServerUpdate, SyncConflict, SyncOperation, SyncRequest, SyncResponse, SyncStats,
};
use super::record::{apply_patch, SyncRecord, MAX_CAS_ATTEMPTS};
use crate::db::models::{
    current_timestamp, format_timestamp, parse_timestamp, sync_status, Animal, HealthRecord,
    NewSyncConflict, ProductionRecord, ReproductionRecord, Tenant, Transaction,
};
use crate::db::{sync_conflicts, Database, TenantContext};
use crate::error::AppError;

/// Call a generic function with the row type matching an `EntityType`
macro_rules! with_record_type {
    ($entity:expr, $func:ident ( $($arg:expr),* $(,)? )) => {
        match $entity {
            EntityType::Tenant => $func::<Tenant>($($arg),*),
            EntityType::Animal => $func::<Animal>($($arg),*),
            EntityType::HealthRecord => $func::<HealthRecord>($($arg),*),
            EntityType::ReproductionRecord => $func::<ReproductionRecord>($($arg),*),
            EntityType::ProductionRecord => $func::<ProductionRecord>($($arg),*),
            EntityType::Transaction => $func::<Transaction>($($arg),*),
        }
    };
}

/// Result of one applied operation
#[derive(Debug)]
enum Outcome {
    Applied,
    /// Create for an id that already exists; nothing written
    Unchanged,
    Conflict(SyncConflict),
}

/// Parsed view of one operation
struct OperationInput<'a> {
    ctx: &'a TenantContext,
    strategy: ConflictStrategy,
    op: &'a SyncOperation,
    kind: OperationKind,
    client_ts: DateTime<Utc>,
    device: &'a str,
}

#[derive(Clone)]
pub struct SyncEngine {
    db: Database,
    default_strategy: ConflictStrategy,
    max_batch: usize,
}

impl SyncEngine {
    pub fn new(db: Database, default_strategy: ConflictStrategy, max_batch: usize) -> Self {
        Self {
            db,
            default_strategy,
            max_batch,
        }
    }

    pub fn default_strategy(&self) -> ConflictStrategy {
        self.default_strategy
    }

    /// Apply a client batch and collect what the device missed since `last_sync`
    pub fn process(&self, ctx: &TenantContext, request: &SyncRequest) -> Result<SyncResponse, AppError> {
        if request.device_id.trim().is_empty() {
            return Err(AppError::InvalidInput("device_id is required".into()));
        }
        if request.operations.len() > self.max_batch {
            return Err(AppError::PayloadTooLarge(format!(
                "sync batch of {} operations exceeds the limit of {}",
                request.operations.len(),
                self.max_batch
            )));
        }
        let since = request
            .last_sync
            .as_deref()
            .map(|raw| {
                parse_timestamp(raw)
                    .map(|ts| format_timestamp(&ts))
                    .ok_or_else(|| AppError::InvalidInput(format!("last_sync '{}' is not a timestamp", raw)))
            })
            .transpose()?;

        let strategy = request.strategy.unwrap_or(self.default_strategy);
        let synced_at = current_timestamp();

        let mut pooled = self.db.pool().get()?;
        let conn: &mut SqliteConnection = &mut pooled;

        let mut applied = 0usize;
        let mut unchanged = 0usize;
        let mut conflicts = Vec::new();
        let mut failed_operations = Vec::new();

        for (index, op) in request.operations.iter().enumerate() {
            match process_operation(conn, ctx, strategy, op, &request.device_id) {
                Ok(Outcome::Applied) => applied += 1,
                Ok(Outcome::Unchanged) => unchanged += 1,
                Ok(Outcome::Conflict(conflict)) => conflicts.push(conflict),
                Err(e) => {
                    warn!(
                        tenant = ctx.tenant_id,
                        index,
                        entity_type = %op.entity_type,
                        entity_id = op.entity_id,
                        error = %e,
                        "Sync operation failed"
                    );
                    failed_operations.push(FailedOperation {
                        index,
                        entity_type: op.entity_type.clone(),
                        entity_id: op.entity_id,
                        error: e.public_message(),
                    });
                }
            }
        }

        let updates_from_server = match since {
            Some(ref since) => collect_updates(conn, ctx, since, &request.device_id)?,
            None => Vec::new(),
        };

        info!(
            tenant = ctx.tenant_id,
            device = %request.device_id,
            strategy = %strategy,
            operations = request.operations.len(),
            applied,
            conflicts = conflicts.len(),
            failed = failed_operations.len(),
            updates = updates_from_server.len(),
            "Sync batch processed"
        );

        let message = format!(
            "Processed {} operations: {} applied, {} unchanged, {} conflicts, {} failed",
            request.operations.len(),
            applied,
            unchanged,
            conflicts.len(),
            failed_operations.len()
        );

        Ok(SyncResponse {
            success: failed_operations.is_empty(),
            synced_at,
            conflicts,
            updates_from_server,
            failed_operations,
            message,
        })
    }

    /// Pending/synced counts across all tables plus logged conflicts
    pub fn stats(&self, ctx: &TenantContext, device_id: Option<&str>) -> Result<SyncStats, AppError> {
        self.db.with_conn(|conn| {
            let mut stats = SyncStats {
                last_sync: None,
                pending_operations: 0,
                synced_entities: 0,
                conflicts: sync_conflicts::count_conflicts(conn, ctx, device_id)?,
            };
            for entity in EntityType::ALL {
                with_record_type!(entity, accumulate_stats(conn, ctx, device_id, &mut stats))?;
            }
            Ok(stats)
        })
    }

    /// Acknowledge rows the client has stored locally
    pub fn mark_synced(&self, ctx: &TenantContext, request: &MarkSyncedRequest) -> Result<MarkSyncedResponse, AppError> {
        let entity: EntityType = request.entity_type.parse().map_err(AppError::InvalidInput)?;
        let now = current_timestamp();
        let updated = self
            .db
            .with_conn(|conn| with_record_type!(entity, mark_rows(conn, ctx, &request.entity_ids, &now)))?;
        debug!(tenant = ctx.tenant_id, entity = %entity, updated, "Marked rows synced");
        Ok(MarkSyncedResponse {
            success: true,
            entity_type: entity,
            updated,
        })
    }
}

fn process_operation(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    strategy: ConflictStrategy,
    op: &SyncOperation,
    request_device: &str,
) -> Result<Outcome, AppError> {
    let entity: EntityType = op.entity_type.parse().map_err(AppError::InvalidInput)?;
    let kind: OperationKind = op.operation.parse().map_err(AppError::InvalidInput)?;
    let client_ts = parse_timestamp(&op.local_timestamp).ok_or_else(|| {
        AppError::InvalidInput(format!("local_timestamp '{}' is not a timestamp", op.local_timestamp))
    })?;
    let device = if op.device_id.trim().is_empty() {
        request_device
    } else {
        op.device_id.as_str()
    };

    let input = OperationInput {
        ctx,
        strategy,
        op,
        kind,
        client_ts,
        device,
    };
    conn.immediate_transaction(|conn| with_record_type!(entity, apply_operation(conn, &input)))
}

fn apply_operation<T: SyncRecord>(conn: &mut SqliteConnection, input: &OperationInput<'_>) -> Result<Outcome, AppError> {
    if input.kind != OperationKind::Update && !T::client_lifecycle() {
        return Err(AppError::Forbidden(format!(
            "{} rows can only be updated through sync",
            T::ENTITY
        )));
    }
    match input.kind {
        OperationKind::Create => create::<T>(conn, input),
        OperationKind::Update | OperationKind::Delete => modify::<T>(conn, input),
    }
}

fn client_fields(op: &SyncOperation) -> Result<Map<String, Value>, AppError> {
    match op.data {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(ref map)) => Ok(map.clone()),
        Some(_) => Err(AppError::InvalidInput("data must be a JSON object".into())),
    }
}

fn create<T: SyncRecord>(conn: &mut SqliteConnection, input: &OperationInput<'_>) -> Result<Outcome, AppError> {
    let op = input.op;
    if T::find(conn, input.ctx, op.entity_id)?.is_some() {
        debug!(entity = %T::ENTITY, id = op.entity_id, "Create replayed for existing row, skipping");
        return Ok(Outcome::Unchanged);
    }

    let now = current_timestamp();
    let mut fields: Map<String, Value> = client_fields(op)?
        .into_iter()
        .filter(|(key, _)| !is_protected(key))
        .collect();
    fields.insert("id".into(), json!(op.entity_id));
    fields.insert("tenant_id".into(), json!(input.ctx.tenant_id));
    fields.insert("created_at".into(), json!(now));
    fields.insert("updated_at".into(), json!(now));
    fields.insert("sync_version".into(), json!(1));
    fields.insert("sync_status".into(), json!(sync_status::SYNCED));
    fields.insert("last_sync_at".into(), json!(now));
    fields.insert("last_modified_device".into(), json!(input.device));

    let row: T = serde_json::from_value(Value::Object(fields))
        .map_err(|e| AppError::InvalidInput(format!("invalid {} payload: {}", T::ENTITY, e)))?;
    row.validate()?;
    row.check_relations(conn, input.ctx)?;

    T::insert(conn, &row).map_err(|e| match e {
        AppError::Database(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            AppError::Conflict(format!("{} id {} is already in use", T::ENTITY, op.entity_id))
        }
        other => other,
    })?;
    Ok(Outcome::Applied)
}

fn modify<T: SyncRecord>(conn: &mut SqliteConnection, input: &OperationInput<'_>) -> Result<Outcome, AppError> {
    let op = input.op;
    let ctx = input.ctx;

    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let server = T::find(conn, ctx, op.entity_id)?
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", T::ENTITY, op.entity_id)))?;
        let server_version = server.version();

        let mut conflict = None;
        if is_conflict(op.sync_version, server_version) {
            let server_ts = parse_timestamp(server.updated_at()).ok_or_else(|| {
                AppError::Internal(format!("{} {} has an unreadable updated_at", T::ENTITY, op.entity_id))
            })?;
            let found = SyncConflict {
                entity_type: T::ENTITY,
                entity_id: op.entity_id,
                server_version,
                client_version: op.sync_version,
                server_data: serde_json::to_value(&server)?,
                client_data: op.data.clone().unwrap_or(Value::Null),
                resolution: input.strategy.resolve(server_ts, input.client_ts),
            };
            if found.resolution == Resolution::ServerWins {
                log_conflict(conn, input, &found)?;
                return Ok(Outcome::Conflict(found));
            }
            conflict = Some(found);
        }

        let mut next = match input.kind {
            OperationKind::Delete => {
                let mut next = server.clone();
                next.mark_deleted()?;
                next
            }
            _ => {
                let next = apply_patch(&server, &client_fields(op)?)?;
                next.validate()?;
                next.check_relations(conn, ctx)?;
                next
            }
        };
        next.stamp(
            server_version + 1,
            Some(input.device),
            sync_status::SYNCED,
            &current_timestamp(),
        );

        if T::compare_and_swap(conn, ctx, &next, server_version)? {
            return match conflict {
                Some(found) => {
                    log_conflict(conn, input, &found)?;
                    Ok(Outcome::Conflict(found))
                }
                None => Ok(Outcome::Applied),
            };
        }
        debug!(entity = %T::ENTITY, id = op.entity_id, attempt, "Version moved during sync write, retrying");
    }

    Err(AppError::Conflict(format!(
        "{} {} kept changing, gave up after {} attempts",
        T::ENTITY,
        op.entity_id,
        MAX_CAS_ATTEMPTS
    )))
}

fn log_conflict(conn: &mut SqliteConnection, input: &OperationInput<'_>, conflict: &SyncConflict) -> Result<(), AppError> {
    info!(
        tenant = input.ctx.tenant_id,
        device = %input.device,
        entity = %conflict.entity_type,
        id = conflict.entity_id,
        server_version = conflict.server_version,
        client_version = conflict.client_version,
        resolution = conflict.resolution.as_str(),
        "Sync conflict"
    );
    let now = current_timestamp();
    sync_conflicts::record_conflict(
        conn,
        &NewSyncConflict {
            tenant_id: input.ctx.tenant_id,
            device_id: input.device,
            entity_type: conflict.entity_type.as_str(),
            entity_id: conflict.entity_id,
            server_version: conflict.server_version,
            client_version: conflict.client_version,
            resolution: conflict.resolution.as_str(),
            created_at: &now,
        },
    )
}

fn collect_updates(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    since: &str,
    device_id: &str,
) -> Result<Vec<ServerUpdate>, AppError> {
    let mut updates = Vec::new();
    for entity in EntityType::ALL {
        with_record_type!(entity, push_changes(conn, ctx, since, device_id, &mut updates))?;
    }
    Ok(updates)
}

fn push_changes<T: SyncRecord>(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    since: &str,
    device_id: &str,
    out: &mut Vec<ServerUpdate>,
) -> Result<(), AppError> {
    for row in T::changed_since(conn, ctx, since, device_id)? {
        out.push(ServerUpdate {
            entity_type: T::ENTITY,
            entity_id: row.id(),
            operation: if row.is_deleted() { "delete" } else { "update" }.to_string(),
            sync_version: row.version(),
            data: serde_json::to_value(&row)?,
        });
    }
    Ok(())
}

fn accumulate_stats<T: SyncRecord>(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    device_id: Option<&str>,
    stats: &mut SyncStats,
) -> Result<(), AppError> {
    stats.pending_operations += T::count_with_status(conn, ctx, sync_status::PENDING)?;
    stats.synced_entities += T::count_with_status(conn, ctx, sync_status::SYNCED)?;
    if let Some(latest) = T::latest_sync(conn, ctx, device_id)? {
        if stats.last_sync.as_deref().map_or(true, |current| latest.as_str() > current) {
            stats.last_sync = Some(latest);
        }
    }
    Ok(())
}

fn mark_rows<T: SyncRecord>(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    ids: &[i64],
    now: &str,
) -> Result<usize, AppError> {
    T::mark_synced(conn, ctx, ids, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::animals::{self, create_animal, fixtures::new_animal};
    use crate::db::models::status;
    use crate::db::test_support::db_with_tenant;

    fn op(entity_type: &str, entity_id: i64, operation: &str, version: i64, data: Option<Value>) -> SyncOperation {
        SyncOperation {
            entity_type: entity_type.into(),
            entity_id,
            operation: operation.into(),
            data,
            device_id: "tablet-1".into(),
            local_timestamp: "2030-01-01T00:00:00Z".into(),
            sync_version: version,
        }
    }

    fn request(operations: Vec<SyncOperation>) -> SyncRequest {
        SyncRequest {
            device_id: "tablet-1".into(),
            last_sync: None,
            strategy: None,
            operations,
        }
    }

    #[test]
    fn test_unknown_entity_fails_only_that_operation() {
        let (db, ctx) = db_with_tenant();
        let cow = db
            .with_conn(|conn| create_animal(conn, &new_animal(&ctx, "CO-1", "female")))
            .unwrap();
        let engine = SyncEngine::new(db.clone(), ConflictStrategy::ServerWins, 10);

        let resp = engine
            .process(
                &ctx,
                &request(vec![
                    op("finca", 1, "update", 1, None),
                    op("animal", cow.id, "update", 1, Some(json!({"name": "Pinta"}))),
                ]),
            )
            .unwrap();

        assert!(!resp.success);
        assert_eq!(resp.failed_operations.len(), 1);
        assert_eq!(resp.failed_operations[0].index, 0);
        let stored = db.with_conn(|conn| animals::get_animal(conn, &ctx, cow.id)).unwrap().unwrap();
        assert_eq!(stored.name.as_deref(), Some("Pinta"));
        assert_eq!(stored.sync_version, 2);
    }

    #[test]
    fn test_batch_limit() {
        let (db, ctx) = db_with_tenant();
        let engine = SyncEngine::new(db, ConflictStrategy::ServerWins, 1);
        let err = engine
            .process(
                &ctx,
                &request(vec![op("animal", 1, "delete", 1, None), op("animal", 2, "delete", 1, None)]),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }

    #[test]
    fn test_server_wins_conflict_leaves_row() {
        let (db, ctx) = db_with_tenant();
        let cow = db
            .with_conn(|conn| {
                let cow = create_animal(conn, &new_animal(&ctx, "CO-2", "female"))?;
                let mut bumped = cow.clone();
                bumped.sync_version = 3;
                animals::compare_and_swap(conn, &ctx, &bumped, 1)?;
                Ok(bumped)
            })
            .unwrap();
        let engine = SyncEngine::new(db.clone(), ConflictStrategy::ServerWins, 10);

        let resp = engine
            .process(&ctx, &request(vec![op("animal", cow.id, "delete", 1, None)]))
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.conflicts.len(), 1);
        assert_eq!(resp.conflicts[0].resolution, Resolution::ServerWins);
        assert_eq!(resp.conflicts[0].server_version, 3);

        let stored = db.with_conn(|conn| animals::get_animal(conn, &ctx, cow.id)).unwrap().unwrap();
        assert_eq!(stored.status, status::ACTIVE);
        assert_eq!(stored.sync_version, 3);

        let stats = engine.stats(&ctx, Some("tablet-1")).unwrap();
        assert_eq!(stats.conflicts, 1);
    }

    #[test]
    fn test_tenant_cannot_be_deleted() {
        let (db, ctx) = db_with_tenant();
        let engine = SyncEngine::new(db, ConflictStrategy::ClientWins, 10);
        let resp = engine
            .process(&ctx, &request(vec![op("tenant", ctx.tenant_id, "delete", 1, None)]))
            .unwrap();
        assert_eq!(resp.failed_operations.len(), 1);
    }

    #[test]
    fn test_invalid_last_sync_rejected() {
        let (db, ctx) = db_with_tenant();
        let engine = SyncEngine::new(db, ConflictStrategy::ServerWins, 10);
        let mut req = request(vec![]);
        req.last_sync = Some("last tuesday".into());
        assert!(matches!(engine.process(&ctx, &req), Err(AppError::InvalidInput(_))));
    }
}
