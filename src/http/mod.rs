//! HTTP server
//!
//! ## Routes
//!
//! - `GET /health` - liveness and version (no auth)
//! - `GET /media/animals/{file}` - stored animal photos (no auth)
//! - `/api/v1/auth/*` - register, login, refresh, me, change-password
//! - `/api/v1/tenant`, `/api/v1/animals`, `/api/v1/health-records`,
//!   `/api/v1/reproduction-records`, `/api/v1/production-records`,
//!   `/api/v1/transactions`, `/api/v1/dashboard` - tenant-scoped REST
//! - `/api/v1/sync`, `/api/v1/sync/stats`, `/api/v1/sync/mark-synced`
//! - `OPTIONS *` - CORS preflight
//!
//! Every response carries CORS headers for the configured origin.

pub mod api;
pub mod records;
pub mod request;
pub mod response;

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::services::media_service::PHOTO_URL_PREFIX;
use crate::services::Services;
use response::HttpResponse;

/// Shared state handed to every request
pub struct AppState {
    pub services: Services,
    pub cors_origin: String,
    pub environment: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Serialize)]
struct HealthResponse<'a> {
    status: &'static str,
    version: &'static str,
    environment: &'a str,
}

/// Accept connections until the listener fails
pub async fn run(state: Arc<AppState>, listen: SocketAddr) -> Result<(), AppError> {
    let listener = TcpListener::bind(listen).await?;
    info!(addr = %listen, "HTTP server listening");

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Error accepting connection");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { Ok::<_, hyper::Error>(handle_request(state, req).await) }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(addr = %remote_addr, error = %err, "Connection error");
            }
        });
    }
}

/// Route a request and stamp CORS headers on whatever comes back
pub async fn handle_request(state: Arc<AppState>, req: Request<Incoming>) -> HttpResponse {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(method = %method, path = %path, "Incoming request");

    let response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => response::preflight(),
        (&Method::GET, "/health") => response::ok(&HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            environment: &state.environment,
        }),
        (&Method::GET, p) if p.starts_with(PHOTO_URL_PREFIX) => {
            let file = p.strip_prefix(PHOTO_URL_PREFIX).unwrap_or("");
            match state.services.media.read_photo(file).await {
                Ok((bytes, content_type)) => response::binary_response(content_type, bytes),
                Err(e) => response::error_response(e),
            }
        }
        (_, p) if p.starts_with("/api/v1/") => match api::route(&state, req).await {
            Ok(resp) => resp,
            Err(e) => response::error_response(e),
        },
        _ => response::not_found(&path),
    };

    response::with_cors(response, &state.cors_origin)
}
