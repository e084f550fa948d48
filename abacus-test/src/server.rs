//! Exposes an in-process counter service for use in integration tests.
//!
//! ```
//! use abacus_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/get/test/counter-0");
//!    // use the URL in tests...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// An in-process counter service for use in integration tests.
///
/// This server implements the full counter contract (create / hit / get /
/// info / set / delete) in memory. It listens on a random available port on
/// localhost and is torn down when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl TestServer {
    /// Starts a server that answers immediately.
    pub async fn new() -> Self {
        Self::start(None).await
    }

    /// Starts a server that stalls every response by `delay`.
    ///
    /// Useful to simulate a slow backend for overload tests.
    pub async fn with_response_delay(delay: Duration) -> Self {
        Self::start(Some(delay)).await
    }

    async fn start(response_delay: Option<Duration>) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = AppState {
            registry: Default::default(),
            response_delay,
        };
        let app = Router::new()
            .route("/create/{namespace}/{key}", post(create))
            .route("/hit/{namespace}/{key}", get(hit))
            .route("/get/{namespace}/{key}", get(get_value))
            .route("/info/{namespace}/{key}", get(info))
            .route("/set/{namespace}/{key}", post(set_value))
            .route("/delete/{namespace}/{key}", post(delete))
            .with_state(state);

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Clone, Default)]
struct AppState {
    registry: Arc<Mutex<Registry>>,
    response_delay: Option<Duration>,
}

impl AppState {
    async fn stall(&self) {
        if let Some(delay) = self.response_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    counters: HashMap<(String, String), Counter>,
}

#[derive(Debug)]
struct Counter {
    value: i64,
    admin_key: String,
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    initializer: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SetParams {
    value: Option<i64>,
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "Key not found"})),
    )
        .into_response()
}

async fn create(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    Query(params): Query<CreateParams>,
) -> Response {
    state.stall().await;
    let mut registry = state.registry.lock().unwrap();
    if registry
        .counters
        .contains_key(&(namespace.clone(), key.clone()))
    {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "Key already exists, please use a different key."})),
        )
            .into_response();
    }

    let admin_key = Uuid::new_v4().to_string();
    let value = params.initializer.unwrap_or(0);
    registry.counters.insert(
        (namespace.clone(), key.clone()),
        Counter {
            value,
            admin_key: admin_key.clone(),
        },
    );

    (
        StatusCode::CREATED,
        Json(json!({
            "key": key,
            "namespace": namespace,
            "admin_key": admin_key,
            "value": value,
        })),
    )
        .into_response()
}

async fn hit(State(state): State<AppState>, Path((namespace, key)): Path<(String, String)>) -> Response {
    state.stall().await;
    let mut registry = state.registry.lock().unwrap();
    match registry.counters.get_mut(&(namespace, key)) {
        Some(counter) => {
            counter.value += 1;
            Json(json!({"value": counter.value})).into_response()
        }
        None => not_found(),
    }
}

async fn get_value(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> Response {
    state.stall().await;
    let registry = state.registry.lock().unwrap();
    match registry.counters.get(&(namespace, key)) {
        Some(counter) => Json(json!({"value": counter.value})).into_response(),
        None => not_found(),
    }
}

async fn info(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> Response {
    state.stall().await;
    let registry = state.registry.lock().unwrap();
    match registry.counters.get(&(namespace.clone(), key.clone())) {
        Some(counter) => Json(json!({
            "exists": true,
            "value": counter.value,
            "full_key": format!("{namespace}/{key}"),
        }))
        .into_response(),
        None => Json(json!({"exists": false})).into_response(),
    }
}

async fn set_value(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    Query(params): Query<SetParams>,
    headers: HeaderMap,
) -> Response {
    state.stall().await;
    let Some(value) = params.value else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "value is required, please provide a number in the fmt of ?value=NEW_VALUE"})),
        )
            .into_response();
    };

    let mut registry = state.registry.lock().unwrap();
    match registry.counters.get_mut(&(namespace, key)) {
        Some(counter) => {
            if bearer(&headers) != Some(counter.admin_key.as_str()) {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Invalid or missing admin key"})),
                )
                    .into_response();
            }
            counter.value = value;
            Json(json!({"value": counter.value})).into_response()
        }
        None => not_found(),
    }
}

async fn delete(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state.stall().await;
    let mut registry = state.registry.lock().unwrap();
    let Some(counter) = registry.counters.get(&(namespace.clone(), key.clone())) else {
        return not_found();
    };
    if bearer(&headers) != Some(counter.admin_key.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid or missing admin key"})),
        )
            .into_response();
    }

    registry.counters.remove(&(namespace.clone(), key.clone()));
    Json(json!({"status": "ok", "message": format!("Deleted key: {namespace}/{key}")})).into_response()
}
