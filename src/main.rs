//! Hato server
//!
//! ```bash
//! # Local development with a throwaway signing secret
//! hato --dev-mode --database-url ./hato.db
//!
//! # Production
//! JWT_SECRET=... SYNC_STRATEGY=last_write_wins hato --listen 0.0.0.0:8000
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hato::auth::JwtManager;
use hato::http::{self, AppState};
use hato::{Args, Database, ServiceConfig, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("hato={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        anyhow::bail!("invalid configuration: {}", e);
    }

    info!("======================================");
    info!("  Hato - livestock management backend");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Environment: {}", args.environment);
    info!("Sync strategy: {}", args.sync_strategy);

    let access_ttl = args.access_token_minutes * 60;
    let refresh_ttl = args.refresh_token_days * 86_400;
    let jwt = match (&args.jwt_secret, args.dev_mode) {
        (Some(secret), _) => JwtManager::new(secret.clone(), access_ttl, refresh_ttl)?,
        (None, true) => {
            warn!("No JWT_SECRET set, using the built-in development secret");
            JwtManager::new_dev(access_ttl, refresh_ttl)
        }
        (None, false) => anyhow::bail!("JWT_SECRET is required in production mode"),
    };

    let db_path = args.database_path();
    let db = Database::open(&db_path).with_context(|| format!("opening database {}", db_path.display()))?;
    let counts = db.stats()?;
    info!(tenants = counts.tenants, animals = counts.animals, "Database ready at {}", db_path.display());

    let media_dir = args.media_path();
    let services = Services::new(
        db,
        jwt,
        &media_dir,
        &ServiceConfig {
            sync_strategy: args.sync_strategy,
            max_sync_batch: args.max_sync_batch,
            max_upload_bytes: args.max_upload_bytes(),
        },
    );
    services.media.init().await?;
    info!("Media directory: {}", media_dir.display());

    let state = Arc::new(AppState {
        services,
        cors_origin: args.cors_origin.clone(),
        environment: args.environment.clone(),
        max_upload_bytes: args.max_upload_bytes(),
    });

    tokio::select! {
        result = http::run(state, args.listen) => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
