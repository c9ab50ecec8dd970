//! Duplicate review endpoints.
//!
//! Review is strictly one-at-a-time: GET exposes the head of the tenant's
//! queue, POST resolves that head and reveals the next item. Resolving an
//! empty queue is a 404, not an error state.

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use crate::api::types::run_blocking;
use crate::api::{ApiContext, ApiError, TenantContext};
use crate::pipeline::dedup::{apply_resolution, MergeOptions, ResolutionDecision};

/// GET /api/import/duplicates/next
pub async fn next_pending(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The queue lock is taken on the blocking pool because a concurrent
    // resolve may hold it across its database write.
    let response = run_blocking(move || {
        let queues = ctx
            .duplicate_queues
            .lock()
            .map_err(|_| ApiError::Internal("duplicate queue lock poisoned".into()))?;

        let queue = queues
            .get(&tenant.tenant_id)
            .filter(|queue| !queue.is_empty())
            .ok_or_else(|| ApiError::NotFound("no pending duplicates".into()))?;

        Ok(json!({
            "item": queue.current(),
            "remaining": queue.len(),
        }))
    })
    .await?;

    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    #[serde(flatten)]
    decision: ResolutionDecision,
    #[serde(flatten)]
    options: MergeOptions,
}

/// POST /api/import/duplicates/resolve
pub async fn resolve(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The queue lock is held across apply and pop so two concurrent
    // resolves cannot both act on the same head item. The head is only
    // popped once the decision has been applied successfully.
    let response = run_blocking(move || {
        let mut queues = ctx
            .duplicate_queues
            .lock()
            .map_err(|_| ApiError::Internal("duplicate queue lock poisoned".into()))?;
        let queue = queues
            .get_mut(&tenant.tenant_id)
            .ok_or_else(|| ApiError::NotFound("no pending duplicates".into()))?;
        let pending = queue
            .current()
            .cloned()
            .ok_or_else(|| ApiError::NotFound("no pending duplicates".into()))?;

        let conn = ctx.open_db()?;
        let resolution = apply_resolution(
            &conn,
            tenant.tenant_id,
            &pending,
            request.decision,
            request.options,
        )?;
        queue.pop_current();

        Ok(json!({
            "resolution": resolution,
            "remaining": queue.len(),
            "next": queue.current(),
        }))
    })
    .await?;

    Ok(Json(response))
}
