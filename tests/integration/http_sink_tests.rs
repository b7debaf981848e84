//! Integration tests for the REST sink against a local mock backend.
//!
//! The mock binds an ephemeral port, records every insert request, and
//! answers with a status the test can change between requests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tasting_sync::config::SinkConfig;
use tasting_sync::models::QueuedFeedbackItem;
use tasting_sync::persistence::MemoryStore;
use tasting_sync::sink::http::row_body;
use tasting_sync::sink::{FeedbackSink, HttpSink};
use tasting_sync::AppError;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{memory_queue, pending_ids};

const API_KEY: &str = "test-anon-key";

#[derive(Debug, Clone)]
struct Captured {
    headers: HeaderMap,
    body: Value,
}

#[derive(Clone)]
struct Backend {
    status: Arc<AtomicU16>,
    requests: Arc<Mutex<Vec<Captured>>>,
    rows: Arc<Mutex<HashMap<String, Value>>>,
}

impl Backend {
    fn new(status: u16) -> Self {
        Self {
            status: Arc::new(AtomicU16::new(status)),
            requests: Arc::new(Mutex::new(Vec::new())),
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn respond_with(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }

    fn row(&self, id: &str) -> Option<Value> {
        self.rows.lock().unwrap().get(id).cloned()
    }
}

async fn insert_row(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    backend.requests.lock().unwrap().push(Captured {
        headers,
        body: body.clone(),
    });

    let status = StatusCode::from_u16(backend.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_success() {
        if let Some(id) = body.get("id").and_then(Value::as_str) {
            // ignore-duplicates: first write wins
            backend
                .rows
                .lock()
                .unwrap()
                .entry(id.to_owned())
                .or_insert(body);
        }
    }
    status
}

/// Serve the mock backend until `ct` is cancelled.
async fn spawn_backend(backend: Backend) -> (SocketAddr, CancellationToken) {
    let app = Router::new()
        .route("/rest/v1/feedback_items", post(insert_row))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");

    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_ct.cancelled().await })
            .await;
    });

    (addr, ct)
}

fn sink_config(endpoint: String) -> SinkConfig {
    SinkConfig {
        endpoint,
        table: "feedback_items".into(),
        request_timeout_seconds: 5,
        api_key: API_KEY.into(),
    }
}

fn feedback(id: &str) -> QueuedFeedbackItem {
    QueuedFeedbackItem::new(id, json!({ "category": "bug", "title": "grinder jams" }))
}

#[test]
fn row_merges_payload_fields_with_id() {
    let row = row_body(&feedback("f1"));
    assert_eq!(
        row,
        json!({ "id": "f1", "isOffline": false, "category": "bug", "title": "grinder jams" })
    );
}

#[test]
fn replayed_row_is_marked_offline() {
    let mut item = feedback("f3");
    item.offline_flag = true;
    assert_eq!(row_body(&item)["isOffline"], true);
}

#[test]
fn scalar_payload_is_nested() {
    let row = row_body(&QueuedFeedbackItem::new("f2", json!("just text")));
    assert_eq!(
        row,
        json!({ "id": "f2", "isOffline": false, "payload": "just text" })
    );
}

#[test]
fn url_trims_trailing_slash() {
    let sink = HttpSink::new(&sink_config("https://example.test/".into())).expect("sink");
    assert_eq!(sink.url(), "https://example.test/rest/v1/feedback_items");
}

#[tokio::test]
async fn send_posts_row_with_auth_and_idempotency_headers() {
    let backend = Backend::new(201);
    let (addr, ct) = spawn_backend(backend.clone()).await;
    let sink = HttpSink::new(&sink_config(format!("http://{addr}/"))).expect("sink");

    sink.send(&feedback("f1")).await.expect("accepted");

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.body["id"], "f1");
    assert_eq!(request.body["title"], "grinder jams");
    assert_eq!(request.headers["apikey"], API_KEY);
    assert_eq!(
        request.headers["authorization"],
        format!("Bearer {API_KEY}").as_str()
    );
    let prefer = request.headers["prefer"].to_str().expect("ascii");
    assert!(prefer.contains("resolution=ignore-duplicates"), "{prefer}");

    ct.cancel();
}

#[tokio::test]
async fn server_error_maps_to_network_error() {
    let backend = Backend::new(500);
    let (addr, ct) = spawn_backend(backend.clone()).await;
    let sink = HttpSink::new(&sink_config(format!("http://{addr}"))).expect("sink");

    let err = sink.send(&feedback("f1")).await.unwrap_err();

    match err {
        AppError::Network(msg) => {
            assert!(msg.contains("f1"), "{msg}");
            assert!(msg.contains("500"), "{msg}");
        }
        other => panic!("expected network error, got {other:?}"),
    }
    assert!(backend.row("f1").is_none());

    ct.cancel();
}

#[tokio::test]
async fn unreachable_backend_maps_to_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let sink = HttpSink::new(&sink_config(format!("http://{addr}"))).expect("sink");
    let err = sink.send(&feedback("f1")).await.unwrap_err();

    assert!(err.is_network(), "got {err:?}");
}

#[tokio::test]
async fn resend_of_stored_id_is_accepted_without_duplicate_row() {
    let backend = Backend::new(201);
    let (addr, ct) = spawn_backend(backend.clone()).await;
    let sink = HttpSink::new(&sink_config(format!("http://{addr}"))).expect("sink");

    sink.send(&feedback("dup")).await.expect("first");
    sink.send(&feedback("dup")).await.expect("resend");

    assert_eq!(backend.requests().len(), 2);
    assert_eq!(backend.rows.lock().unwrap().len(), 1);

    ct.cancel();
}

#[tokio::test]
async fn outage_then_recovery_through_the_queue() {
    let backend = Backend::new(503);
    let (addr, ct) = spawn_backend(backend.clone()).await;
    let sink = HttpSink::new(&sink_config(format!("http://{addr}"))).expect("sink");
    let store = Arc::new(MemoryStore::new());
    let queue = memory_queue(&store, Arc::new(sink));

    let err = queue.submit(feedback("f1")).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(pending_ids(&queue).await, ["f1"]);

    backend.respond_with(201);
    let report = queue.drain().await.expect("drain");

    assert_eq!(report.delivered, 1);
    assert!(pending_ids(&queue).await.is_empty());
    let row = backend.row("f1").expect("row stored");
    assert_eq!(row["title"], "grinder jams");
    assert_eq!(row["isOffline"], true, "replayed from the durable queue");
    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body["isOffline"], false, "live attempt");

    ct.cancel();
}
