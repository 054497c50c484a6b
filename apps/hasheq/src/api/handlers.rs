//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! The ledger is synchronous, so every handler hands its work to the
//! blocking pool together with a `Context` whose deadline is the request
//! timeout. If the client goes away the handler future is dropped, which
//! cancels the context and stops the ledger at its next store call.

use super::{
    AppState, Ledger,
    types::{
        ArtifactRequest, ArtifactResponse, BulkIngestRequest, HashEqualsResponse, HealthResponse,
        IngestRequest, IngestResponse, QueryRequest, StatusResponse,
    },
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use hasheq_core::{Context, HashEqError};
use std::sync::Arc;

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// HTTP status for a ledger error.
pub fn status_for(err: &HashEqError) -> StatusCode {
    match err {
        HashEqError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        HashEqError::NotFound { .. } => StatusCode::NOT_FOUND,
        HashEqError::TransientStore { .. } | HashEqError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        HashEqError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        HashEqError::IntegrityViolation { .. }
        | HashEqError::Store { .. }
        | HashEqError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        HashEqError::BatchItem { source, .. } => status_for(source),
    }
}

/// Cancels the request context when the handler future is dropped.
struct CancelOnDrop(Context);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run `op` against the ledger on the blocking pool.
async fn with_ledger<T, F>(state: &AppState, op: F) -> Result<T, HashEqError>
where
    T: Send + 'static,
    F: FnOnce(&Ledger, &Context) -> Result<T, HashEqError> + Send + 'static,
{
    let ctx = Context::with_timeout(state.request_timeout);
    let _cancel = CancelOnDrop(ctx.clone());
    let ledger = Arc::clone(&state.ledger);

    tokio::task::spawn_blocking(move || op(&ledger, &ctx))
        .await
        .map_err(|e| HashEqError::Store {
            operation: "spawn_blocking".to_string(),
            message: e.to_string(),
        })?
}

fn log_failure(operation: &str, err: &HashEqError) {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(operation, error = %err, "request failed");
    } else {
        tracing::debug!(operation, error = %err, "request rejected");
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get ledger status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.ledger.store().kind().to_string();
    match with_ledger(&state, |ledger, ctx| ledger.status(ctx)).await {
        Ok(counts) => (
            StatusCode::OK,
            Json(StatusResponse {
                success: true,
                backend,
                artifacts: counts.artifacts,
                hash_equals: counts.hash_equals,
                edges: counts.edges,
                error: None,
            }),
        ),
        Err(e) => {
            log_failure("status", &e);
            (status_for(&e), Json(StatusResponse::error(e.to_string())))
        }
    }
}

// =============================================================================
// ARTIFACT HANDLER
// =============================================================================

/// Register an artifact.
pub async fn artifact_handler(
    State(state): State<AppState>,
    Json(request): Json<ArtifactRequest>,
) -> impl IntoResponse {
    match with_ledger(&state, move |ledger, ctx| {
        ledger.register_artifact(ctx, &request)
    })
    .await
    {
        Ok(artifact) => (StatusCode::OK, Json(ArtifactResponse::success(artifact))),
        Err(e) => {
            log_failure("register_artifact", &e);
            (status_for(&e), Json(ArtifactResponse::error(e.to_string())))
        }
    }
}

// =============================================================================
// INGEST HANDLERS
// =============================================================================

/// Ingest one HashEqual claim.
pub async fn ingest_handler(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> impl IntoResponse {
    match with_ledger(&state, move |ledger, ctx| {
        ledger.ingest_hash_equal(
            ctx,
            &request.artifact,
            &request.equal_artifact,
            &request.hash_equal,
        )
    })
    .await
    {
        Ok(record) => (StatusCode::OK, Json(IngestResponse::success(record))),
        Err(e) => {
            log_failure("ingest_hash_equal", &e);
            (status_for(&e), Json(IngestResponse::error(e.to_string())))
        }
    }
}

/// Ingest a batch of HashEqual claims.
pub async fn bulk_ingest_handler(
    State(state): State<AppState>,
    Json(request): Json<BulkIngestRequest>,
) -> impl IntoResponse {
    match with_ledger(&state, move |ledger, ctx| {
        ledger.ingest_hash_equals(
            ctx,
            &request.artifacts,
            &request.equal_artifacts,
            &request.hash_equals,
        )
    })
    .await
    {
        Ok(records) => (StatusCode::OK, Json(HashEqualsResponse::success(records))),
        Err(e) => {
            log_failure("ingest_hash_equals", &e);
            (status_for(&e), Json(HashEqualsResponse::error(e.to_string())))
        }
    }
}

// =============================================================================
// QUERY HANDLER
// =============================================================================

/// Query HashEqual claims.
pub async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    match with_ledger(&state, move |ledger, ctx| ledger.hash_equal(ctx, &request)).await {
        Ok(records) => (StatusCode::OK, Json(HashEqualsResponse::success(records))),
        Err(e) => {
            log_failure("hash_equal", &e);
            (status_for(&e), Json(HashEqualsResponse::error(e.to_string())))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_http_statuses() {
        assert_eq!(
            status_for(&HashEqError::InvalidInput("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&HashEqError::NotFound {
                algorithm: "sha256".to_string(),
                digest: "00".to_string(),
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&HashEqError::TransientStore {
                operation: "begin".to_string(),
                message: "io".to_string(),
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&HashEqError::DeadlineExceeded),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&HashEqError::IntegrityViolation {
                operation: "upsert".to_string(),
                key: "k".to_string(),
                rows: 2,
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn batch_item_uses_inner_status() {
        let err = HashEqError::BatchItem {
            index: 1,
            source: Box::new(HashEqError::NotFound {
                algorithm: "sha1".to_string(),
                digest: "00".to_string(),
            }),
        };
        assert_eq!(status_for(&err), StatusCode::NOT_FOUND);
    }
}
