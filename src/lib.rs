//! Hato - multi-tenant livestock management backend
//!
//! Farms (tenants) keep an animal registry plus health, reproduction, milk
//! production and financial logs. Field devices work offline and reconcile
//! through the sync engine, which detects stale writes by row version and
//! settles them with a configurable conflict strategy.
//!
//! ## Layout
//!
//! - [`db`] - SQLite storage through diesel, tenant-scoped queries
//! - [`sync`] - batch sync protocol, conflict resolution, versioned writes
//! - [`services`] - business rules on top of storage
//! - [`auth`] - JWT tokens, argon2 password hashes, roles
//! - [`http`] - hyper server and REST routing

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod services;
pub mod sync;
pub mod validation;
pub mod views;

pub use config::Args;
pub use db::{Database, TenantContext};
pub use error::AppError;
pub use services::{ServiceConfig, Services};
pub use sync::{ConflictStrategy, SyncEngine};
