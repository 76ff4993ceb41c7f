//! Minimal HTTP responder so hosting platforms see a bound port.
//!
//! Shares nothing with the polling loop.

use anyhow::Result;
use axum::{Json, Router, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

/// Health check endpoint
#[tracing::instrument]
async fn index() -> &'static str {
    "KMRB Monitor is running!"
}

#[tracing::instrument]
async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        timestamp: Utc::now(),
    })
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
}

pub async fn serve(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(addr = %listener.local_addr()?, "health endpoint listening");
    axum::serve(listener, router()).await?;
    Ok(())
}
