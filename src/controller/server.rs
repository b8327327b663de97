//! Controller HTTP server (axum)

use crate::partition::{RangeAssignment, RangePartitioner};
use crate::rotation::IpAuthority;
use crate::storage::{run_blocking, Record, SharedStorage};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;

/// Shared state behind every controller route
#[derive(Clone)]
pub struct ControllerState {
    partitioner: Arc<Mutex<RangePartitioner>>,
    authority: Arc<IpAuthority>,
    storage: SharedStorage,
}

impl ControllerState {
    /// Creates the state
    ///
    /// `storage` must be a local backend; the controller is where remote
    /// records end up.
    pub fn new(partitioner: RangePartitioner, authority: Arc<IpAuthority>, storage: SharedStorage) -> Self {
        Self {
            partitioner: Arc::new(Mutex::new(partitioner)),
            authority,
            storage,
        }
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }
}

/// Body of `GET /ip-safe/:address`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyResponse {
    pub safe: bool,
}

/// Builds the controller router
pub fn router(state: ControllerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/list-range", get(list_range))
        .route("/ip-safe/:address", get(ip_safe))
        .route("/records", post(insert_record))
        .route("/commit", get(commit))
        .with_state(state)
}

/// Serves the controller until `shutdown` resolves, then commits pending records
pub async fn serve(
    listener: TcpListener,
    state: ControllerState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> crate::Result<()> {
    let storage = state.storage.clone();

    tracing::info!("Controller listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    run_blocking(storage, |storage| storage.commit()).await?;
    tracing::info!("Controller stopped");
    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_range(State(state): State<ControllerState>) -> Json<RangeAssignment> {
    let range = state
        .partitioner
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .next_range();

    tracing::info!("Handing out range ({}, {})", range.start, range.end);
    Json(range)
}

async fn ip_safe(State(state): State<ControllerState>, Path(address): Path<String>) -> Json<SafetyResponse> {
    let safe = match address.parse::<IpAddr>() {
        Ok(candidate) => state.authority.check_and_record(candidate),
        Err(_) => {
            tracing::warn!("Rejecting malformed address {:?}", address);
            false
        }
    };

    tracing::debug!("Address {} safe: {}", address, safe);
    Json(SafetyResponse { safe })
}

async fn insert_record(State(state): State<ControllerState>, Json(record): Json<Record>) -> (StatusCode, String) {
    match run_blocking(state.storage, move |storage| storage.insert_record(&record)).await {
        Ok(()) => (StatusCode::CREATED, String::new()),
        Err(e) => {
            tracing::error!("Failed to store remote record: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn commit(State(state): State<ControllerState>) -> (StatusCode, String) {
    match run_blocking(state.storage, |storage| storage.commit()).await {
        Ok(()) => (StatusCode::NO_CONTENT, String::new()),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
