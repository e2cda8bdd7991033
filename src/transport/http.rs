//! HTTP channel: a push endpoint and a call endpoint.
//!
//! - `GET /sse` sends the server descriptor, then a keep-alive frame on a
//!   fixed interval until the client goes away or the server shuts down.
//! - `POST /tools` takes one request envelope and answers with one response
//!   envelope.
//!
//! Both routes allow any origin.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{
        HeaderValue, Method,
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::RpcError;
use crate::protocol::RpcResponse;

pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Open push connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    inner: Arc<Mutex<HashMap<Uuid, DateTime<Utc>>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection until the returned guard is dropped.
    pub fn open(&self) -> ConnectionGuard {
        let id = Uuid::new_v4();
        let open = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.insert(id, Utc::now());
            map.len()
        };
        info!(name: "sse.connected", connection_id = %id, open, "Push client connected");
        ConnectionGuard {
            id,
            table: self.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its connection from the table on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: Uuid,
    table: ConnectionTable,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let opened = self
            .table
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        if let Some(opened) = opened {
            let seconds = (Utc::now() - opened).num_seconds();
            info!(name: "sse.disconnected", connection_id = %self.id, seconds, "Push client gone");
        }
    }
}

/// Shared state of the HTTP routes.
#[derive(Debug, Clone)]
pub struct HttpState {
    pub dispatcher: Dispatcher,
    pub connections: ConnectionTable,
    pub keepalive: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl HttpState {
    pub fn new(dispatcher: Dispatcher, keepalive: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            dispatcher,
            connections: ConnectionTable::new(),
            keepalive,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Ends every open push stream.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }
}

/// One `data:` frame.
pub fn frame(payload: &Value) -> String {
    format!("data: {payload}\n\n")
}

pub fn router(state: HttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/sse", get(push))
        .route("/tools", axum::routing::post(call))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn push(State(state): State<HttpState>) -> Response {
    let guard = state.connections.open();
    let descriptor = state.dispatcher.server_info();
    let period = state.keepalive.max(Duration::from_secs(1));
    let mut shutdown = state.shutdown.subscribe();

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<String, Infallible>(frame(&descriptor));

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        // Cleared once every sender is gone; only an explicit close ends the stream.
        let mut watching = true;
        loop {
            let keepalive = tokio::select! {
                _ = ticker.tick() => Some(true),
                changed = shutdown.changed(), if watching => match changed {
                    Ok(()) if *shutdown.borrow() => None,
                    Ok(()) => Some(false),
                    Err(_) => {
                        watching = false;
                        Some(false)
                    }
                },
            };
            match keepalive {
                None => break,
                Some(true) => {
                    yield Ok::<String, Infallible>(frame(&json!({"type": "keepalive"})));
                }
                Some(false) => {}
            }
        }
    };

    event_stream(Body::from_stream(stream))
}

fn event_stream(body: Body) -> Response {
    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    resp
}

async fn call(State(state): State<HttpState>, body: Bytes) -> impl IntoResponse {
    let response = match std::str::from_utf8(&body) {
        Ok(text) => state.dispatcher.dispatch_text(text).await,
        Err(e) => {
            warn!(name: "http.parse_error", error = %e, "Request body is not UTF-8");
            RpcResponse::failure(
                None,
                &RpcError::Parse {
                    message: format!("request body is not valid UTF-8: {e}"),
                },
            )
        }
    };
    Json(response)
}

/// Binds and serves until Ctrl-C.
pub async fn serve(dispatcher: Dispatcher, settings: &ServerConfig) -> anyhow::Result<()> {
    let state = HttpState::new(dispatcher, Duration::from_secs(settings.keepalive_secs));
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        name: "server.started",
        address = %addr,
        push = %format!("http://{addr}/sse"),
        "HTTP channel listening"
    );

    let closer = state.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(name: "server.signal_error", error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!(name: "server.shutdown", "Shutting down");
            closer.close();
        })
        .await?;
    Ok(())
}
