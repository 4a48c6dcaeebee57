//! Pull-based metrics exposition: `GET /metrics` over plain HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::metrics::PrometheusSink;

/// Axum handler for `GET /metrics`.
async fn metrics_handler(State(sink): State<Arc<PrometheusSink>>) -> Response {
	match sink.encode() {
		Ok(body) => ([(header::CONTENT_TYPE, sink.content_type())], body).into_response(),
		Err(e) => {
			error!("failed to encode metrics: {:#}", e);
			(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
		}
	}
}

async fn fallback() -> (StatusCode, &'static str) {
	(StatusCode::NOT_FOUND, "not found")
}

/// Build the exposition router.
pub fn router(sink: Arc<PrometheusSink>) -> Router {
	Router::new()
		.route("/metrics", get(metrics_handler))
		.fallback(fallback)
		.with_state(sink)
}

/// Bind the metrics listener on all interfaces.
///
/// Kept separate from [`serve`] so that a port that is already taken fails
/// startup before any probing begins.
pub async fn bind(port: u16) -> Result<TcpListener> {
	let addr = SocketAddr::from(([0, 0, 0, 0], port));
	TcpListener::bind(addr)
		.await
		.with_context(|| format!("failed to bind metrics listener on {}", addr))
}

/// Serve the router until `cancel` fires.
pub async fn serve(
	listener: TcpListener,
	sink: Arc<PrometheusSink>,
	cancel: CancellationToken,
) -> Result<()> {
	let addr = listener.local_addr()?;
	info!(%addr, "exporter running, metrics at /metrics");
	axum::serve(listener, router(sink))
		.with_graceful_shutdown(async move { cancel.cancelled().await })
		.await
		.context("metrics server failed")
}
