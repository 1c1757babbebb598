// src/server.rs
// Transports: line-delimited JSON-RPC over stdio, and HTTP via axum

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::config::{ServerConfig, Transport};
use crate::errors::ServerError;
use crate::mcp::{Dispatcher, SERVER_NAME};

pub async fn serve(dispatcher: Arc<Dispatcher>, config: &ServerConfig) -> Result<(), ServerError> {
    match config.transport {
        Transport::Stdio => {
            info!("Serving MCP over stdio");
            serve_stdio(&dispatcher, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
        }
        Transport::Http => serve_http(dispatcher, &config.bind).await,
    }
}

/// One request per line in, one response per line out. Requests are handled
/// in arrival order, so replies come back in the same order. Returns at EOF.
pub async fn serve_stdio<R, W>(dispatcher: &Dispatcher, mut reader: R, mut writer: W) -> Result<(), ServerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        // undecoded; invalid UTF-8 is answered with a parse error
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let Some(response) = dispatcher.handle_payload(&line).await else {
            continue;
        };
        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;
        writer.flush().await?;
    }
    info!("stdin closed, shutting down");
    Ok(())
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/mcp", post(handle_rpc))
        .route("/health", get(handle_health))
        .with_state(dispatcher)
}

pub async fn serve_http(dispatcher: Arc<Dispatcher>, bind: &str) -> Result<(), ServerError> {
    let addr: SocketAddr = bind.parse().map_err(|_| ServerError::InvalidBind(bind.to_string()))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving MCP over HTTP on http://{}/mcp", addr);
    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C ({}); running until killed", e);
            std::future::pending::<()>().await;
        }
    }
}

async fn handle_rpc(State(dispatcher): State<Arc<Dispatcher>>, body: Bytes) -> Response {
    match dispatcher.handle_payload(&body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok", "server": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }))
}
