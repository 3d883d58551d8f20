//! Purpose: In-process stub of the TamTam Bot API for integration tests.
//! Exports: `StubServer`, `Recorded`.
//! Role: Serves canned (status, body) pairs per (verb, path) and records every request.
//! Invariants: Loopback only; the tokio runtime lives as long as the `StubServer`.
//! Invariants: Unrouted requests answer 404 with a TamTam-style error body.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::IntoResponse;

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: String,
}

impl Recorded {
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Default)]
struct StubState {
    routes: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    seen: Arc<Mutex<Vec<Recorded>>>,
}

pub struct StubServer {
    runtime: tokio::runtime::Runtime,
    base_url: String,
    state: StubState,
}

impl StubServer {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("runtime");
        let state = StubState::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        runtime.spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            runtime,
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn route(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        self.state
            .routes
            .lock()
            .expect("routes")
            .insert((method.to_string(), path.to_string()), (status, body.into()));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.seen.lock().expect("seen").clone()
    }

    pub fn last_request(&self) -> Recorded {
        self.requests().pop().expect("at least one request")
    }
}

async fn handle(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let query = url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.seen.lock().expect("seen").push(Recorded {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query,
        content_type,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let key = (method.as_str().to_string(), uri.path().to_string());
    let (status, body) = state
        .routes
        .lock()
        .expect("routes")
        .get(&key)
        .cloned()
        .unwrap_or_else(|| {
            (
                404,
                r#"{"code":"not.found","message":"no stub route"}"#.to_string(),
            )
        });
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], body)
}
