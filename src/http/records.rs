//! Animal registry, per-animal logs and transactions

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Method, Request};

use super::api::{with_body, with_patch};
use super::request::{blocking, content_type, parse_id, parse_query, read_body};
use super::response::{created, method_not_allowed, no_content, ok, HandlerResult};
use super::AppState;
use crate::auth::AuthUser;
use crate::db::animals::AnimalQuery;
use crate::db::health_records::HealthQuery;
use crate::db::models::{
    today, NewAnimal, NewHealthRecord, NewProductionRecord, NewReproductionRecord, NewTransaction,
};
use crate::db::production_records::ProductionQuery;
use crate::db::reproduction_records::ReproductionQuery;
use crate::db::transactions::TransactionQuery;
use crate::services::transaction_service::PurchaseAnimalRequest;

pub async fn animals(
    state: &AppState,
    caller: AuthUser,
    method: &Method,
    rest: &[&str],
    req: Request<Incoming>,
) -> HandlerResult {
    let service = Arc::clone(&state.services.animals);
    let ctx = caller.tenant;
    match (method, rest) {
        (&Method::GET, []) => {
            let query: AnimalQuery = parse_query(req.uri())?;
            Ok(ok(&blocking(move || service.list(&ctx, &query)).await?))
        }
        (&Method::POST, []) => {
            let animal = with_body(req, move |input: NewAnimal| service.create(&ctx, input)).await?;
            Ok(created(&animal))
        }
        (&Method::GET, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&blocking(move || service.get(&ctx, id)).await?))
        }
        (&Method::PUT, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&with_patch(req, move |patch| service.update(&ctx, id, &patch)).await?))
        }
        (&Method::DELETE, [id]) => {
            let id = parse_id(id)?;
            blocking(move || service.delete(&ctx, id)).await?;
            Ok(no_content())
        }
        (&Method::GET, [id, "pedigree"]) => {
            let id = parse_id(id)?;
            Ok(ok(&blocking(move || service.pedigree(&ctx, id)).await?))
        }
        (&Method::PUT, [id, "photo"]) => {
            let id = parse_id(id)?;
            let (headers, body) = read_body(req, state.max_upload_bytes).await?;
            let mime = content_type(&headers).to_string();
            let animal = state.services.media.upload_photo(ctx, id, &mime, body.to_vec()).await?;
            Ok(ok(&animal))
        }
        (&Method::DELETE, [id, "photo"]) => {
            let id = parse_id(id)?;
            Ok(ok(&state.services.media.delete_photo(ctx, id).await?))
        }
        _ => Ok(method_not_allowed()),
    }
}

pub async fn health(
    state: &AppState,
    caller: AuthUser,
    method: &Method,
    rest: &[&str],
    req: Request<Incoming>,
) -> HandlerResult {
    let service = Arc::clone(&state.services.health);
    let ctx = caller.tenant;
    match (method, rest) {
        (&Method::GET, []) => {
            let query: HealthQuery = parse_query(req.uri())?;
            Ok(ok(&blocking(move || service.list(&ctx, &query)).await?))
        }
        (&Method::POST, []) => {
            let record = with_body(req, move |input: NewHealthRecord| service.create(&caller, input)).await?;
            Ok(created(&record))
        }
        (&Method::GET, ["animal", animal_id]) => {
            let animal_id = parse_id(animal_id)?;
            Ok(ok(&blocking(move || service.animal_history(&ctx, animal_id)).await?))
        }
        (&Method::GET, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&blocking(move || service.get(&ctx, id)).await?))
        }
        (&Method::PUT, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&with_patch(req, move |patch| service.update(&ctx, id, &patch)).await?))
        }
        (&Method::DELETE, [id]) => {
            let id = parse_id(id)?;
            blocking(move || service.delete(&ctx, id)).await?;
            Ok(no_content())
        }
        _ => Ok(method_not_allowed()),
    }
}

pub async fn reproduction(
    state: &AppState,
    caller: AuthUser,
    method: &Method,
    rest: &[&str],
    req: Request<Incoming>,
) -> HandlerResult {
    let service = Arc::clone(&state.services.reproduction);
    let ctx = caller.tenant;
    match (method, rest) {
        (&Method::GET, []) => {
            let query: ReproductionQuery = parse_query(req.uri())?;
            Ok(ok(&blocking(move || service.list(&ctx, &query)).await?))
        }
        (&Method::POST, []) => {
            let record = with_body(req, move |input: NewReproductionRecord| service.create(&caller, input)).await?;
            Ok(created(&record))
        }
        (&Method::GET, ["stats"]) => Ok(ok(&blocking(move || service.stats(&ctx, today())).await?)),
        (&Method::GET, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&blocking(move || service.get(&ctx, id)).await?))
        }
        (&Method::PUT, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&with_patch(req, move |patch| service.update(&ctx, id, &patch)).await?))
        }
        (&Method::DELETE, [id]) => {
            let id = parse_id(id)?;
            blocking(move || service.delete(&ctx, id)).await?;
            Ok(no_content())
        }
        _ => Ok(method_not_allowed()),
    }
}

pub async fn production(
    state: &AppState,
    caller: AuthUser,
    method: &Method,
    rest: &[&str],
    req: Request<Incoming>,
) -> HandlerResult {
    let service = Arc::clone(&state.services.production);
    let ctx = caller.tenant;
    match (method, rest) {
        (&Method::GET, []) => {
            let query: ProductionQuery = parse_query(req.uri())?;
            Ok(ok(&blocking(move || service.list(&ctx, &query)).await?))
        }
        (&Method::POST, []) => {
            let record = with_body(req, move |input: NewProductionRecord| service.create(&caller, input)).await?;
            Ok(created(&record))
        }
        (&Method::GET, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&blocking(move || service.get(&ctx, id)).await?))
        }
        (&Method::PUT, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&with_patch(req, move |patch| service.update(&ctx, id, &patch)).await?))
        }
        (&Method::DELETE, [id]) => {
            let id = parse_id(id)?;
            blocking(move || service.delete(&ctx, id)).await?;
            Ok(no_content())
        }
        _ => Ok(method_not_allowed()),
    }
}

pub async fn transactions(
    state: &AppState,
    caller: AuthUser,
    method: &Method,
    rest: &[&str],
    req: Request<Incoming>,
) -> HandlerResult {
    let service = Arc::clone(&state.services.transactions);
    let ctx = caller.tenant;
    match (method, rest) {
        (&Method::GET, []) => {
            let query: TransactionQuery = parse_query(req.uri())?;
            Ok(ok(&blocking(move || service.list(&ctx, &query)).await?))
        }
        (&Method::POST, []) => {
            let txn = with_body(req, move |input: NewTransaction| service.create(&caller, input)).await?;
            Ok(created(&txn))
        }
        (&Method::POST, ["purchase-animal"]) => {
            let bought =
                with_body(req, move |input: PurchaseAnimalRequest| service.purchase_animal(&caller, input)).await?;
            Ok(created(&bought))
        }
        (&Method::GET, ["summary"]) => Ok(ok(&blocking(move || service.summary(&ctx, today())).await?)),
        (&Method::GET, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&blocking(move || service.get(&ctx, id)).await?))
        }
        (&Method::PUT, [id]) => {
            let id = parse_id(id)?;
            Ok(ok(&with_patch(req, move |patch| service.update(&ctx, id, &patch)).await?))
        }
        (&Method::DELETE, [id]) => {
            let id = parse_id(id)?;
            blocking(move || service.delete(&ctx, id)).await?;
            Ok(no_content())
        }
        _ => Ok(method_not_allowed()),
    }
}
