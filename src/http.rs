//! HTTP control surface.
//!
//! Runs beside the chat listener and exposes:
//! - `GET /ping` - fixed liveness acknowledgment
//! - `GET /health_check` - whether the chat accept loop is live
//! - `POST /send_msg/:username` - broadcast the request body as `username`
//! - `GET /metrics` - Prometheus metrics
//!
//! Message injection does not negotiate a name or open a session: the
//! registry is only used to check that `username` is connected.

use crate::error::BroadcastError;
use crate::state::Matrix;
use axum::Router;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const TIMEOUT_BODY: &str = "client server timeout";

/// Limits applied to every control request.
#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    pub max_body: usize,
    pub timeout: Duration,
}

/// Build the control router.
pub fn router(matrix: Arc<Matrix>, limits: HttpLimits) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health_check", get(health_check))
        .route("/send_msg/", post(send_msg_blank))
        .route("/send_msg/:username", post(send_msg))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(limits.max_body))
        .layer(middleware::from_fn_with_state(limits.timeout, timeout))
        .with_state(matrix)
}

/// Bound HTTP listener, ready to serve.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    pub async fn bind(addr: SocketAddr, matrix: Arc<Matrix>, limits: HttpLimits) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "HTTP control listener bound");
        Ok(Self {
            listener,
            router: router(matrix, limits),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the listener fails.
    pub async fn run(self) -> anyhow::Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}

fn reply(route: &'static str, status: StatusCode, body: impl Into<String>) -> Response {
    crate::metrics::record_http_request(route, status.as_u16());
    (status, body.into()).into_response()
}

/// Handler for GET /ping.
async fn ping() -> Response {
    reply("ping", StatusCode::OK, "pong")
}

/// Handler for GET /health_check.
async fn health_check(State(matrix): State<Arc<Matrix>>) -> Response {
    if matrix.is_listening() {
        reply("health_check", StatusCode::OK, "ok")
    } else {
        reply("health_check", StatusCode::INTERNAL_SERVER_ERROR, "chat server is down\n")
    }
}

/// Handler for POST /send_msg/ with no username.
async fn send_msg_blank() -> Response {
    reply("send_msg", StatusCode::BAD_REQUEST, "username cannot be blank\n")
}

/// Handler for POST /send_msg/:username.
async fn send_msg(
    State(matrix): State<Arc<Matrix>>,
    Path(username): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if username.trim().is_empty() {
        return send_msg_blank().await;
    }

    let body = match body {
        Ok(body) => body,
        Err(e) => {
            return reply(
                "send_msg",
                StatusCode::BAD_REQUEST,
                format!("unable to read request body, error: {}\n", e.body_text()),
            );
        }
    };
    let text = match std::str::from_utf8(&body) {
        Ok(text) => text.trim_end_matches(['\r', '\n']),
        Err(e) => {
            return reply(
                "send_msg",
                StatusCode::BAD_REQUEST,
                format!("unable to read request body, error: {e}\n"),
            );
        }
    };

    // One request is one transcript record.
    if text.contains(['\r', '\n']) {
        return reply(
            "send_msg",
            StatusCode::BAD_REQUEST,
            "message must be a single line\n",
        );
    }

    match matrix.broadcaster.inject(&username, text) {
        Ok(_) => reply("send_msg", StatusCode::OK, "ok"),
        Err(e) => {
            warn!(user = %username, error = %e, code = e.error_code(), "Injected message failed");
            reply(
                "send_msg",
                StatusCode::INTERNAL_SERVER_ERROR,
                send_failure_body(&username, &e),
            )
        }
    }
}

fn send_failure_body(username: &str, e: &BroadcastError) -> String {
    format!("unable to send msg from user: {username}, error: {e}\n")
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Bound the whole request, body read included.
async fn timeout(State(limit): State<Duration>, req: Request, next: Next) -> Response {
    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(response) => response,
        Err(_) => reply("timeout", StatusCode::SERVICE_UNAVAILABLE, TIMEOUT_BODY),
    }
}
