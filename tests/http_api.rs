use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use ulid::Ulid;

use ambulance_webapi::api::{self, AppState};
use ambulance_webapi::model::Ambulance;
use ambulance_webapi::observability::WaitingListGauges;
use ambulance_webapi::store::{DocumentStore, LogStore, MemoryStore, StoreError};
use ambulance_webapi::updater::{AmbulanceUpdater, SharedStore};

// ── Test infrastructure ──────────────────────────────────────

struct TestServer {
    base: String,
    client: Client,
    gauges: Arc<WaitingListGauges>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base)
    }

    async fn create_ambulance(&self, id: &str) -> Value {
        let resp = self
            .client
            .post(self.url("/ambulance"))
            .json(&json!({
                "id": id,
                "name": "Central",
                "predefinedConditions": [
                    {"value": "Flu", "code": "flu", "typicalDurationMinutes": 15}
                ]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self.client.put(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, path: &str) -> (StatusCode, String) {
        let resp = self.client.delete(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.text().await.unwrap())
    }
}

async fn start_with_store(store: SharedStore) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let gauges = Arc::new(WaitingListGauges::new());
    let app = api::router(AppState::new(AmbulanceUpdater::new(store, gauges.clone())));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        client: Client::new(),
        gauges,
    }
}

async fn start_test_server() -> TestServer {
    start_with_store(Arc::new(MemoryStore::<Ambulance>::new())).await
}

fn room(id: &str) -> Value {
    json!({"id": id, "width": "3", "height": "2", "equipment": "xray"})
}

/// Store whose reads always fail with an I/O error.
struct BrokenStore;

#[async_trait]
impl DocumentStore<Ambulance> for BrokenStore {
    async fn create(&self, _id: &str, _document: &Ambulance) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn find(&self, _id: &str) -> Result<Ambulance, StoreError> {
        Err(StoreError::Io(std::io::Error::other("read timed out")))
    }

    async fn update(&self, _id: &str, _document: &Ambulance) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _id: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

// ── Ambulances ───────────────────────────────────────────────

#[tokio::test]
async fn create_ambulance_with_sentinel() {
    let server = start_test_server().await;
    let created = server.create_ambulance("@new").await;
    let id = created["id"].as_str().unwrap();
    assert!(!id.is_empty());
    assert_ne!(id, "@new");
    assert_eq!(created["name"], "Central");

    let (status, body) = server
        .post("/ambulance", json!({"id": id, "name": "Again"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Ambulance already exists");
}

#[tokio::test]
async fn delete_ambulance_then_operations_404() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;
    assert_eq!(server.gauges.waiting("amb-1"), Some(0));

    let (status, body) = server.delete("/ambulance/amb-1").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert_eq!(server.gauges.waiting("amb-1"), None);

    let (status, _) = server.delete("/ambulance/amb-1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = server.get("/rooms/amb-1/entries").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Ambulance not found");
}

// ── Rooms ────────────────────────────────────────────────────

#[tokio::test]
async fn room_create_then_list() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;

    let (status, created) = server.post("/rooms/amb-1/entries", room("@new")).await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());
    assert_ne!(id, "@new");
    assert_eq!(created["width"], "3");
    assert_eq!(created["height"], "2");
    assert_eq!(created["equipment"], "xray");

    let (status, rooms) = server.get("/rooms/amb-1/entries").await;
    assert_eq!(status, StatusCode::OK);
    let rooms = rooms.as_array().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["id"], id.as_str());

    let (status, single) = server.get(&format!("/rooms/amb-1/entries/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(single, created);
}

#[tokio::test]
async fn room_list_empty_is_array() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;
    let (status, rooms) = server.get("/rooms/amb-1/entries").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rooms, json!([]));
}

#[tokio::test]
async fn room_duplicate_conflicts() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;

    let (status, _) = server.post("/rooms/amb-1/entries", room("r1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = server.post("/rooms/amb-1/entries", room("r1")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "Conflict");
    assert_eq!(body["message"], "Entry already exists");

    let (_, rooms) = server.get("/rooms/amb-1/entries").await;
    assert_eq!(rooms.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn room_delete_then_delete_again() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;
    server.post("/rooms/amb-1/entries", room("r1")).await;

    let (status, body) = server.delete("/rooms/amb-1/entries/r1").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, body) = server.delete("/rooms/amb-1/entries/r1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Room not found"));
}

#[tokio::test]
async fn room_partial_update() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;
    server.post("/rooms/amb-1/entries", room("r1")).await;

    let (status, updated) = server
        .put("/rooms/amb-1/entries/r1", json!({"equipment": "mri"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated, json!({"id": "r1", "width": "3", "height": "2", "equipment": "mri"}));

    let (status, _) = server.put("/rooms/amb-1/entries/r9", json!({"width": "1"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn room_missing_field_is_bad_request() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;
    let (status, body) = server
        .post("/rooms/amb-1/entries", json!({"id": "r1", "width": "3", "height": "2"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "Bad Request");
    assert_eq!(body["message"], "Room equipment is required");
}

#[tokio::test]
async fn malformed_body_reports_parser_error() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;
    let resp = server
        .client
        .post(server.url("/rooms/amb-1/entries"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Invalid request body");
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn missing_ambulance_wins_over_bad_body() {
    let server = start_test_server().await;
    let resp = server
        .client
        .post(server.url("/rooms/does-not-exist/entries"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Ambulance not found");
}

#[tokio::test]
async fn every_route_reports_missing_ambulance() {
    let server = start_test_server().await;
    for path in [
        "/rooms/does-not-exist/entries",
        "/rooms/does-not-exist/entries/r1",
        "/schedules/does-not-exist/entries",
        "/schedules/does-not-exist/entries/s1",
        "/waiting-list/does-not-exist/entries",
        "/waiting-list/does-not-exist/entries/e1",
        "/waiting-list/does-not-exist/condition",
    ] {
        let (status, body) = server.get(path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(body["message"], "Ambulance not found", "{path}");
    }
}

// ── Schedules ────────────────────────────────────────────────

#[tokio::test]
async fn schedule_lifecycle() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;

    let (status, created) = server
        .post(
            "/schedules/amb-1/entries",
            json!({"id": "@new", "patientId": "p-1", "roomId": "r-unknown", "start": 1_700_000_000_000i64}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, updated) = server
        .put(&format!("/schedules/amb-1/entries/{id}"), json!({"note": "fasting"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["note"], "fasting");
    assert_eq!(updated["patientId"], "p-1");

    let (_, listed) = server.get("/schedules/amb-1/entries").await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, rooms) = server.get("/rooms/amb-1/entries").await;
    assert_eq!(rooms, json!([]));

    let (status, _) = server.delete(&format!("/schedules/amb-1/entries/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = server.get(&format!("/schedules/amb-1/entries/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Waiting list ─────────────────────────────────────────────

#[tokio::test]
async fn waiting_list_orders_and_counts() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;

    let (status, conditions) = server.get("/waiting-list/amb-1/condition").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conditions[0]["code"], "flu");

    let (status, second) = server
        .post(
            "/waiting-list/amb-1/entries",
            json!({"id": "@new", "patientId": "p-2", "waitingSince": 2_000, "condition": {"code": "flu"}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["estimatedDurationMinutes"], 15);
    assert_eq!(second["condition"]["value"], "Flu");

    let (status, _) = server
        .post(
            "/waiting-list/amb-1/entries",
            json!({"id": "e1", "patientId": "p-1", "waitingSince": 1_000, "estimatedDurationMinutes": 10}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(server.gauges.waiting("amb-1"), Some(2));

    let (_, list) = server.get("/waiting-list/amb-1/entries").await;
    let list = list.as_array().unwrap();
    assert_eq!(list[0]["id"], "e1");
    let first_end = list[0]["estimatedStart"].as_i64().unwrap() + 10 * 60_000;
    assert!(list[1]["estimatedStart"].as_i64().unwrap() >= first_end);

    let (status, body) = server
        .post("/waiting-list/amb-1/entries", json!({"id": "@new", "patientId": "p-1"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Patient already exists in the waiting list");

    let (status, _) = server.delete("/waiting-list/amb-1/entries/e1").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(server.gauges.waiting("amb-1"), Some(1));
}

#[tokio::test]
async fn reads_leave_gauge_untouched() {
    let server = start_test_server().await;
    server.create_ambulance("amb-1").await;
    server.gauges.clear();

    server.get("/waiting-list/amb-1/entries").await;
    server.get("/rooms/amb-1/entries").await;
    assert_eq!(server.gauges.waiting("amb-1"), None);
}

// ── Store failures ───────────────────────────────────────────

#[tokio::test]
async fn store_read_failure_is_bad_gateway() {
    let server = start_with_store(Arc::new(BrokenStore)).await;
    let (status, body) = server.get("/rooms/amb-1/entries").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "Bad Gateway");
    assert_eq!(body["message"], "Failed to load ambulance from database");
    assert!(body["error"].as_str().unwrap().contains("read timed out"));

    let (status, body) = server.post("/ambulance", json!({"id": "amb-1"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "Failed to create ambulance in database");
}

#[tokio::test]
async fn durable_store_serves_after_restart() {
    let dir = std::env::temp_dir().join(format!("ambulance_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("ambulances.wal");

    {
        let server = start_with_store(Arc::new(LogStore::<Ambulance>::open(&path).unwrap())).await;
        server.create_ambulance("amb-1").await;
        server.post("/rooms/amb-1/entries", room("r1")).await;
    }

    let server = start_with_store(Arc::new(LogStore::<Ambulance>::open(&path).unwrap())).await;
    let (status, rooms) = server.get("/rooms/amb-1/entries").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rooms, json!([room("r1")]));
}

// ── Concurrency ──────────────────────────────────────────────

#[tokio::test]
async fn concurrent_creates_on_distinct_ambulances() {
    let server = start_test_server().await;
    for i in 0..8 {
        server.create_ambulance(&format!("amb-{i}")).await;
    }

    let paths: Vec<String> = (0..8).map(|i| format!("/rooms/amb-{i}/entries")).collect();
    let requests = paths.iter().map(|path| server.post(path, room("@new")));
    let results = futures::future::join_all(requests).await;
    assert!(results.iter().all(|(status, _)| *status == StatusCode::OK));

    for i in 0..8 {
        let (_, rooms) = server.get(&format!("/rooms/amb-{i}/entries")).await;
        assert_eq!(rooms.as_array().unwrap().len(), 1);
    }
}
