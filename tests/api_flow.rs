//! End-to-end REST flow over a real socket

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;

use hato::auth::JwtManager;
use hato::http::{self, AppState};
use hato::{ConflictStrategy, Database, ServiceConfig, Services};

struct TestServer {
    _dir: TempDir,
    addr: SocketAddr,
}

async fn start_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("hato.db")).unwrap();
    let media_dir = dir.path().join("media");
    let services = Services::new(
        db,
        JwtManager::new_dev(1800, 604_800),
        &media_dir,
        &ServiceConfig {
            sync_strategy: ConflictStrategy::ServerWins,
            max_sync_batch: 50,
            max_upload_bytes: 1024 * 1024,
        },
    );
    services.media.init().await.unwrap();
    let state = Arc::new(AppState {
        services,
        cors_origin: "https://campo.example.com".into(),
        environment: "test".into(),
        max_upload_bytes: 1024 * 1024,
    });

    let addr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };
    tokio::spawn(http::run(state, addr));

    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    TestServer { _dir: dir, addr }
}

async fn send(
    addr: SocketAddr,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, hyper::HeaderMap, Value) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await.unwrap();
    tokio::spawn(conn);

    let mut builder = Request::builder().method(method).uri(path).header(HOST, "localhost");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Full::new(Bytes::from(value.to_string()))
        }
        None => Full::new(Bytes::new()),
    };

    let resp = sender.send_request(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, json)
}

async fn register(addr: SocketAddr) -> String {
    let (status, _, body) = send(
        addr,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({
            "tenant": {"name": "Santa Rita", "department": "Córdoba", "municipality": "Montería"},
            "user": {"full_name": "Luis Mora", "email": "luis@example.com", "password": "ganado-123"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_cors_and_auth_gate() {
    let server = start_server().await;

    let (status, headers, body) = send(server.addr, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");
    assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "https://campo.example.com");

    let (status, _, _) = send(server.addr, Method::OPTIONS, "/api/v1/animals", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = send(server.addr, Method::GET, "/api/v1/animals", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _, _) = send(server.addr, Method::GET, "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sale_flow_updates_animal_and_dashboard() {
    let server = start_server().await;
    let addr = server.addr;
    let token = register(addr).await;
    let token = Some(token.as_str());
    let today = chrono::Utc::now().date_naive().to_string();

    let (status, _, animal) = send(
        addr,
        Method::POST,
        "/api/v1/animals",
        token,
        Some(json!({"tag_number": "SR-01", "sex": "male", "entry_date": "2024-03-01", "category": "steer"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", animal);
    let id = animal["id"].as_i64().unwrap();

    let (status, _, duplicate) = send(
        addr,
        Method::POST,
        "/api/v1/animals",
        token,
        Some(json!({"tag_number": "SR-01", "sex": "male", "entry_date": "2024-03-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", duplicate);

    let (status, _, sale) = send(
        addr,
        Method::POST,
        "/api/v1/transactions",
        token,
        Some(json!({"kind": "sale", "date": today, "concept": "Feria", "amount": 2500000.0, "animal_id": id})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", sale);
    assert_eq!(sale["animal_tag"], "SR-01");

    let (_, _, sold) = send(addr, Method::GET, &format!("/api/v1/animals/{}", id), token, None).await;
    assert_eq!(sold["status"], "sold");

    let (status, _, dashboard) = send(addr, Method::GET, "/api/v1/dashboard", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["inventory"]["sold"], 1);
    assert_eq!(dashboard["finance"]["sales_this_month"], 2500000.0);

    let sale_id = sale["id"].as_i64().unwrap();
    let (status, _, _) = send(addr, Method::DELETE, &format!("/api/v1/transactions/{}", sale_id), token, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, _, restored) = send(addr, Method::GET, &format!("/api/v1/animals/{}", id), token, None).await;
    assert_eq!(restored["status"], "active");
    assert!(restored["exit_date"].is_null());
}

#[tokio::test]
async fn test_rest_update_then_stale_sync_conflicts() {
    let server = start_server().await;
    let addr = server.addr;
    let token = register(addr).await;
    let token = Some(token.as_str());

    let (_, _, animal) = send(
        addr,
        Method::POST,
        "/api/v1/animals",
        token,
        Some(json!({"tag_number": "SR-02", "sex": "female", "entry_date": "2024-03-01"})),
    )
    .await;
    let id = animal["id"].as_i64().unwrap();

    let (status, _, updated) = send(
        addr,
        Method::PUT,
        &format!("/api/v1/animals/{}", id),
        token,
        Some(json!({"name": "Manchas"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    assert_eq!(updated["sync_version"], 2);

    let (status, _, synced) = send(
        addr,
        Method::POST,
        "/api/v1/sync",
        token,
        Some(json!({
            "device_id": "celular-1",
            "last_sync": "2000-01-01T00:00:00Z",
            "operations": [{
                "entity_type": "animal",
                "entity_id": id,
                "operation": "update",
                "data": {"name": "Pintada"},
                "device_id": "celular-1",
                "local_timestamp": "2024-03-02T10:00:00Z",
                "sync_version": 1
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", synced);
    assert_eq!(synced["conflicts"].as_array().unwrap().len(), 1);
    assert_eq!(synced["conflicts"][0]["resolution"], "server_wins");
    let updates = synced["updates_from_server"].as_array().unwrap();
    assert!(updates.iter().any(|u| u["entity_id"] == id && u["data"]["name"] == "Manchas"));

    let (status, _, _) = send(addr, Method::DELETE, &format!("/api/v1/animals/{}", id), token, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(addr, Method::GET, &format!("/api/v1/animals/{}", id), token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
