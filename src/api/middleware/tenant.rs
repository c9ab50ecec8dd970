//! Tenant identification middleware.
//!
//! Every protected route requires an `X-Tenant-Id` header carrying the
//! tenant's numeric id (upstream authentication resolves accounts to ids
//! before requests reach this service). The parsed identity is attached
//! as a [`TenantContext`] request extension.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::{ApiError, TenantContext};

pub const TENANT_HEADER: &str = "X-Tenant-Id";

pub async fn require_tenant(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let tenant_id = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or(ApiError::TenantRequired)?;

    request.extensions_mut().insert(TenantContext { tenant_id });
    Ok(next.run(request).await)
}
