//! Offline synchronization
//!
//! Field devices queue mutations while offline and replay them as a batch.
//! Each row carries a `sync_version` counter; a client operation built on a
//! stale version is a conflict, settled by the configured `ConflictStrategy`.
//! Writes go through a compare-and-swap on the version so concurrent writers
//! can never both apply against the same state.

pub mod conflict;
pub mod engine;
pub mod protocol;
pub mod record;

pub use conflict::{ConflictStrategy, Resolution};
pub use engine::SyncEngine;
pub use protocol::{
    EntityType, FailedOperation, MarkSyncedRequest, MarkSyncedResponse, ServerUpdate, SyncConflict,
    SyncOperation, SyncRequest, SyncResponse, SyncStats,
};
pub use record::{apply_patch, soft_delete, update_versioned, SyncRecord};
