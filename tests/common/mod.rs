//! Fake Marathon and Mesos master served by axum on localhost

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::time::sleep;

/// Find an available port for testing
pub fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to address")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

pub struct FakeCluster {
    pub apps: BTreeMap<String, Value>,
    /// `force` query values seen on DELETE and PUT
    pub forces: Vec<String>,
    /// Node records served from `/master/state.json`
    pub slaves: Vec<Value>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self {
            apps: BTreeMap::new(),
            forces: vec![],
            slaves: vec![
                node("worker", "10.0.1.1", 4.0, 8192.0),
                node("worker", "10.0.1.2", 4.0, 8192.0),
                node("master", "10.0.0.1", 2.0, 4096.0),
                json!({"hostname": "10.0.9.9", "attributes": {}, "resources": {"cpus": 1.0, "mem": 512.0}}),
            ],
        }
    }
}

pub type Shared = Arc<Mutex<FakeCluster>>;

/// A Mesos node record
pub fn node(machine: &str, hostname: &str, cpus: f64, mem: f64) -> Value {
    json!({
        "hostname": hostname,
        "attributes": {"name": machine},
        "resources": {"cpus": cpus, "mem": mem, "disk": 1000.0}
    })
}

fn started_tasks(id: &str, count: u64) -> Vec<Value> {
    (0..count)
        .map(|i| json!({"id": format!("{}.{}", id, i), "startedAt": "2015-08-06T08:14:31.370Z"}))
        .collect()
}

async fn list_apps(State(state): State<Shared>) -> Json<Value> {
    let state = state.lock().unwrap();
    Json(json!({ "apps": state.apps.values().cloned().collect::<Vec<_>>() }))
}

async fn create_app(State(state): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    let mut state = state.lock().unwrap();
    let id = body["id"]
        .as_str()
        .unwrap_or_default()
        .trim_matches('/')
        .to_string();
    if state.apps.contains_key(&id) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"message": format!("An app with id [/{}] already exists.", id)})),
        );
    }

    let instances = body["instances"].as_u64().unwrap_or(1);
    let app = json!({
        "id": format!("/{}", id),
        "instances": instances,
        "constraints": body["constraints"].clone(),
        "container": body["container"].clone(),
        "tasks": started_tasks(&id, instances),
    });
    state.apps.insert(id, app.clone());
    (StatusCode::CREATED, Json(app))
}

async fn get_app(State(state): State<Shared>, Path(id): Path<String>) -> impl IntoResponse {
    let state = state.lock().unwrap();
    match state.apps.get(&id) {
        Some(app) => (StatusCode::OK, Json(json!({ "app": app }))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": format!("App '/{}' does not exist", id)})),
        ),
    }
}

async fn update_app(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut state = state.lock().unwrap();
    state
        .forces
        .push(query.get("force").cloned().unwrap_or_default());
    let instances = body["instances"].as_u64().unwrap_or(0);
    match state.apps.get_mut(&id) {
        Some(app) => {
            app["instances"] = json!(instances);
            app["tasks"] = json!(started_tasks(&id, instances));
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn delete_app(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    let mut state = state.lock().unwrap();
    state
        .forces
        .push(query.get("force").cloned().unwrap_or_default());
    match state.apps.remove(&id) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn mesos_state(State(state): State<Shared>) -> Json<Value> {
    let state = state.lock().unwrap();
    Json(json!({ "slaves": state.slaves.clone() }))
}

/// Start a fake Marathon and Mesos master on a free port
pub async fn spawn_fake_cluster() -> (String, Shared) {
    let port = find_available_port();
    let state: Shared = Arc::new(Mutex::new(FakeCluster::default()));

    let app = Router::new()
        .route("/v2/apps", get(list_apps).post(create_app))
        .route(
            "/v2/apps/{id}",
            get(get_app).put(update_app).delete(delete_app),
        )
        .route("/master/state.json", get(mesos_state))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .expect("Failed to bind fake cluster");

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    sleep(Duration::from_millis(100)).await;

    (format!("http://127.0.0.1:{}", port), state)
}
