//! Configuration for hato
//!
//! CLI arguments and environment variable handling using clap.
//! A `.env` file in the working directory is loaded before parsing.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::sync::ConflictStrategy;

/// Minimum accepted length for the token signing secret
pub const MIN_SECRET_LEN: usize = 32;

/// Hato - livestock management backend with offline sync
#[derive(Parser, Debug, Clone)]
#[command(name = "hato")]
#[command(about = "Multi-tenant livestock management backend")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// SQLite database file (defaults to <data dir>/hato.db)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<PathBuf>,

    /// Directory for uploaded media (defaults to <data dir>/media)
    #[arg(long, env = "MEDIA_DIR")]
    pub media_dir: Option<PathBuf>,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Access token lifetime in minutes
    #[arg(long, env = "ACCESS_TOKEN_EXPIRE_MINUTES", default_value = "30")]
    pub access_token_minutes: u64,

    /// Refresh token lifetime in days
    #[arg(long, env = "REFRESH_TOKEN_EXPIRE_DAYS", default_value = "7")]
    pub refresh_token_days: u64,

    /// Conflict resolution strategy for sync (server_wins, client_wins, last_write_wins)
    #[arg(long, env = "SYNC_STRATEGY", default_value = "server_wins")]
    pub sync_strategy: ConflictStrategy,

    /// Maximum operations accepted in a single sync batch
    #[arg(long, env = "MAX_SYNC_BATCH", default_value = "500")]
    pub max_sync_batch: usize,

    /// Maximum photo upload size in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value = "5")]
    pub max_upload_mb: usize,

    /// Value for Access-Control-Allow-Origin
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    pub cors_origin: String,

    /// Deployment environment name reported by /health
    #[arg(long, env = "ENVIRONMENT", default_value = "production")]
    pub environment: String,

    /// Enable development mode (allows a built-in signing secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Default data directory (~/.local/share/hato on Linux)
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hato")
    }

    /// Effective database path
    pub fn database_path(&self) -> PathBuf {
        self.database_url
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("hato.db"))
    }

    /// Effective media directory
    pub fn media_path(&self) -> PathBuf {
        self.media_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("media"))
    }

    /// Upload limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                Some(s) if s.len() < MIN_SECRET_LEN => {
                    return Err(format!(
                        "JWT_SECRET must be at least {} characters",
                        MIN_SECRET_LEN
                    ))
                }
                Some(_) => {}
            }
        }

        if self.max_sync_batch == 0 {
            return Err("MAX_SYNC_BATCH must be greater than zero".to_string());
        }

        if self.access_token_minutes == 0 || self.refresh_token_days == 0 {
            return Err("Token lifetimes must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["hato"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--dev-mode"]);
        assert_eq!(args.access_token_minutes, 30);
        assert_eq!(args.refresh_token_days, 7);
        assert_eq!(args.sync_strategy, ConflictStrategy::ServerWins);
        assert_eq!(args.max_upload_bytes(), 5 * 1024 * 1024);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_secret_required_outside_dev_mode() {
        let args = parse(&[]);
        assert!(args.validate().is_err());

        let args = parse(&["--jwt-secret", "short"]);
        assert!(args.validate().is_err());

        let args = parse(&["--jwt-secret", "a-secret-that-is-long-enough-for-hs256"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_strategy_flag() {
        let args = parse(&["--dev-mode", "--sync-strategy", "last_write_wins"]);
        assert_eq!(args.sync_strategy, ConflictStrategy::LastWriteWins);
    }

    #[test]
    fn test_zero_batch_rejected() {
        let args = parse(&["--dev-mode", "--max-sync-batch", "0"]);
        assert!(args.validate().is_err());
    }
}
