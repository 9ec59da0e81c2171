//! HTTP endpoint hosting a worker for [`crate::worker::HttpWorker`]
//!
//! Text payloads are always accepted. File-range payloads name a path on
//! this host, so they are refused unless the server was started with an
//! allowed root and the path resolves inside it.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::WorkerError;
use crate::reduce::PartialResult;
use crate::worker::{map_payload, SegmentPayload, SegmentSource};

#[derive(Debug, Clone, Default)]
pub struct ServerState {
    allowed_root: Option<PathBuf>,
}

impl ServerState {
    /// Accept text payloads only.
    pub fn text_only() -> Self {
        Self::default()
    }

    /// Also accept file ranges whose path resolves inside `root`.
    pub async fn confined_to(root: &Path) -> std::io::Result<Self> {
        let root = tokio::fs::canonicalize(root).await?;
        Ok(Self {
            allowed_root: Some(root),
        })
    }

    pub fn allowed_root(&self) -> Option<&Path> {
        self.allowed_root.as_deref()
    }

    async fn check_range(&self, path: &Path) -> Result<(), (StatusCode, String)> {
        let Some(root) = self.allowed_root() else {
            return Err((
                StatusCode::FORBIDDEN,
                "file ranges are not accepted by this worker".to_string(),
            ));
        };

        // Symlinks and `..` are resolved before the prefix check
        let resolved = tokio::fs::canonicalize(path).await.ok();
        match resolved {
            Some(resolved) if resolved.starts_with(root) => Ok(()),
            _ => Err((
                StatusCode::FORBIDDEN,
                format!("{} is not a readable file under the allowed root", path.display()),
            )),
        }
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/map", post(handle_map))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn handle_health() -> &'static str {
    "ok"
}

async fn handle_map(
    State(state): State<ServerState>,
    Json(payload): Json<SegmentPayload>,
) -> Result<Json<PartialResult>, (StatusCode, String)> {
    tracing::debug!("Mapping {} ({:?})", payload.segment, payload.policy);

    if let SegmentSource::FileRange { path, .. } = &payload.source {
        if let Err(refusal) = state.check_range(path).await {
            tracing::warn!("Refused file range: {}", refusal.1);
            return Err(refusal);
        }
    }

    match map_payload(payload).await {
        Ok(partial) => Ok(Json(partial)),
        Err(e) => {
            tracing::error!("Map request failed: {}", e);
            let status = match e {
                WorkerError::Read(_) | WorkerError::Malformed(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((status, e.to_string()))
        }
    }
}

/// Serve until the process is stopped.
pub async fn serve(addr: SocketAddr, allowed_root: Option<PathBuf>) -> anyhow::Result<()> {
    let state = match allowed_root {
        Some(root) => ServerState::confined_to(&root)
            .await
            .map_err(|e| anyhow::anyhow!("cannot use {} as allowed root: {e}", root.display()))?,
        None => ServerState::text_only(),
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    match state.allowed_root() {
        Some(root) => tracing::info!(
            "Worker endpoint listening on {}, file ranges allowed under {}",
            listener.local_addr()?,
            root.display()
        ),
        None => tracing::info!("Worker endpoint listening on {}", listener.local_addr()?),
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}
