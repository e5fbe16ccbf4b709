//! Service layer
//!
//! Services sit between HTTP handlers and repositories. Each one wraps
//! database work with:
//! - Input validation
//! - Cross-entity effects (a sale marks its animal sold)
//! - Transaction boundaries
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```
//!
//! Service methods are synchronous; handlers run them on the blocking pool.

pub mod animal_service;
pub mod auth_service;
pub mod dashboard_service;
pub mod health_service;
pub mod media_service;
pub mod production_service;
pub mod reproduction_service;
pub mod tenant_service;
pub mod transaction_service;

pub use animal_service::AnimalService;
pub use auth_service::AuthService;
pub use dashboard_service::DashboardService;
pub use health_service::HealthService;
pub use media_service::MediaService;
pub use production_service::ProductionService;
pub use reproduction_service::ReproductionService;
pub use tenant_service::TenantService;
pub use transaction_service::TransactionService;

use std::path::Path;
use std::sync::Arc;

use crate::auth::JwtManager;
use crate::db::Database;
use crate::sync::{ConflictStrategy, SyncEngine};

/// Settings the services need beyond the database
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub sync_strategy: ConflictStrategy,
    pub max_sync_batch: usize,
    pub max_upload_bytes: usize,
}

/// Service container handed to the HTTP server
pub struct Services {
    pub auth: Arc<AuthService>,
    pub tenant: Arc<TenantService>,
    pub animals: Arc<AnimalService>,
    pub health: Arc<HealthService>,
    pub reproduction: Arc<ReproductionService>,
    pub production: Arc<ProductionService>,
    pub transactions: Arc<TransactionService>,
    pub dashboard: Arc<DashboardService>,
    pub media: Arc<MediaService>,
    pub sync: Arc<SyncEngine>,
}

impl Services {
    pub fn new(db: Database, jwt: JwtManager, media_dir: &Path, config: &ServiceConfig) -> Self {
        let animals = Arc::new(AnimalService::new(db.clone()));
        Self {
            auth: Arc::new(AuthService::new(db.clone(), jwt)),
            tenant: Arc::new(TenantService::new(db.clone())),
            health: Arc::new(HealthService::new(db.clone())),
            reproduction: Arc::new(ReproductionService::new(db.clone())),
            production: Arc::new(ProductionService::new(db.clone())),
            transactions: Arc::new(TransactionService::new(db.clone())),
            dashboard: Arc::new(DashboardService::new(db.clone())),
            media: Arc::new(MediaService::new(media_dir, config.max_upload_bytes, Arc::clone(&animals))),
            sync: Arc::new(SyncEngine::new(db, config.sync_strategy, config.max_sync_batch)),
            animals,
        }
    }
}
