//! `/api/v1` dispatch plus the account, tenant, dashboard and sync handlers

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Method, Request};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::records;
use super::request::{authenticate, blocking, parse_json, parse_json_or_form, parse_patch, parse_query, read_body};
use super::request::{JSON_BODY_LIMIT, SYNC_BODY_LIMIT};
use super::response::{created, method_not_allowed, not_found, ok, HandlerResult};
use super::AppState;
use crate::auth::AuthUser;
use crate::db::models::today;
use crate::error::AppError;
use crate::services::auth_service::{ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest};
use crate::sync::{MarkSyncedRequest, SyncRequest};

#[derive(Debug, Deserialize)]
struct SyncStatsQuery {
    #[serde(default)]
    device_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    message: &'static str,
}

/// Read a JSON body and hand it to blocking service work
pub(super) async fn with_body<I, T, F>(req: Request<Incoming>, f: F) -> Result<T, AppError>
where
    I: DeserializeOwned + Send + 'static,
    T: Send + 'static,
    F: FnOnce(I) -> Result<T, AppError> + Send + 'static,
{
    let (_, body) = read_body(req, JSON_BODY_LIMIT).await?;
    let input: I = parse_json(&body)?;
    blocking(move || f(input)).await
}

/// Read a partial-update body and hand it to blocking service work
pub(super) async fn with_patch<T, F>(req: Request<Incoming>, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(Map<String, Value>) -> Result<T, AppError> + Send + 'static,
{
    let (_, body) = read_body(req, JSON_BODY_LIMIT).await?;
    let patch = parse_patch(&body)?;
    blocking(move || f(patch)).await
}

pub async fn route(state: &Arc<AppState>, req: Request<Incoming>) -> HandlerResult {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path
        .trim_start_matches("/api/v1/")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let services = &state.services;

    // Routes that issue tokens
    match (&method, segments.as_slice()) {
        (&Method::POST, ["auth", "register"]) => {
            let auth = Arc::clone(&services.auth);
            let registered = with_body(req, move |input: RegisterRequest| auth.register(input)).await?;
            return Ok(created(&registered));
        }
        (&Method::POST, ["auth", "login"]) => {
            let (headers, body) = read_body(req, JSON_BODY_LIMIT).await?;
            let input: LoginRequest = parse_json_or_form(&headers, &body)?;
            let auth = Arc::clone(&services.auth);
            return Ok(ok(&blocking(move || auth.login(&input)).await?));
        }
        (&Method::POST, ["auth", "refresh"]) => {
            let auth = Arc::clone(&services.auth);
            let refreshed = with_body(req, move |input: RefreshRequest| auth.refresh(&input)).await?;
            return Ok(ok(&refreshed));
        }
        _ => {}
    }

    let caller = authenticate(services, req.headers()).await?;

    match segments.as_slice() {
        ["auth", rest @ ..] => account(state, caller, &method, rest, req).await,
        ["tenant", rest @ ..] => tenant(state, caller, &method, rest, req).await,
        ["dashboard", rest @ ..] => dashboard(state, caller, &method, rest).await,
        ["sync", rest @ ..] => sync(state, caller, &method, rest, req).await,
        ["animals", rest @ ..] => records::animals(state, caller, &method, rest, req).await,
        ["health-records", rest @ ..] => records::health(state, caller, &method, rest, req).await,
        ["reproduction-records", rest @ ..] => records::reproduction(state, caller, &method, rest, req).await,
        ["production-records", rest @ ..] => records::production(state, caller, &method, rest, req).await,
        ["transactions", rest @ ..] => records::transactions(state, caller, &method, rest, req).await,
        _ => Ok(not_found(&path)),
    }
}

async fn account(
    state: &AppState,
    caller: AuthUser,
    method: &Method,
    rest: &[&str],
    req: Request<Incoming>,
) -> HandlerResult {
    let auth = Arc::clone(&state.services.auth);
    match (method, rest) {
        (&Method::GET, ["me"]) => Ok(ok(&blocking(move || auth.me(&caller)).await?)),
        (&Method::POST, ["change-password"]) => {
            with_body(req, move |input: ChangePasswordRequest| auth.change_password(&caller, &input)).await?;
            Ok(ok(&Message {
                message: "Password updated",
            }))
        }
        _ => Ok(method_not_allowed()),
    }
}

async fn tenant(
    state: &AppState,
    caller: AuthUser,
    method: &Method,
    rest: &[&str],
    req: Request<Incoming>,
) -> HandlerResult {
    let service = Arc::clone(&state.services.tenant);
    match (method, rest) {
        (&Method::GET, []) => Ok(ok(&blocking(move || service.get(&caller)).await?)),
        (&Method::PUT, []) => Ok(ok(&with_patch(req, move |patch| service.update(&caller, &patch)).await?)),
        (&Method::GET, ["stats"]) => Ok(ok(&blocking(move || service.stats(&caller)).await?)),
        _ => Ok(method_not_allowed()),
    }
}

async fn dashboard(state: &AppState, caller: AuthUser, method: &Method, rest: &[&str]) -> HandlerResult {
    let service = Arc::clone(&state.services.dashboard);
    let ctx = caller.tenant;
    match (method, rest) {
        (&Method::GET, []) => Ok(ok(&blocking(move || service.dashboard(&ctx, today())).await?)),
        (&Method::GET, ["alerts"]) => Ok(ok(&blocking(move || service.alerts(&ctx, today())).await?)),
        _ => Ok(method_not_allowed()),
    }
}

async fn sync(
    state: &AppState,
    caller: AuthUser,
    method: &Method,
    rest: &[&str],
    req: Request<Incoming>,
) -> HandlerResult {
    let engine = Arc::clone(&state.services.sync);
    let ctx = caller.tenant;
    match (method, rest) {
        (&Method::POST, []) => {
            let (_, body) = read_body(req, SYNC_BODY_LIMIT).await?;
            let request: SyncRequest = parse_json(&body)?;
            Ok(ok(&blocking(move || engine.process(&ctx, &request)).await?))
        }
        (&Method::GET, ["stats"]) => {
            let query: SyncStatsQuery = parse_query(req.uri())?;
            Ok(ok(&blocking(move || engine.stats(&ctx, query.device_id.as_deref())).await?))
        }
        (&Method::POST, ["mark-synced"]) => {
            let marked = with_body(req, move |input: MarkSyncedRequest| engine.mark_synced(&ctx, &input)).await?;
            Ok(ok(&marked))
        }
        _ => Ok(method_not_allowed()),
    }
}
