//! HTTP router.
//!
//! Routes nest under `/api/`. Everything except the health probe sits
//! behind the tenant middleware.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::endpoints;
use super::middleware;
use super::types::ApiContext;
use crate::api::endpoints::import::MAX_FILES;
use crate::pipeline::ocr::MAX_IMAGE_BYTES;

/// Whole-request body cap: a full image batch plus multipart overhead.
const MAX_BODY_BYTES: usize = MAX_FILES * MAX_IMAGE_BYTES + 4 * 1024 * 1024;

pub fn api_router(ctx: ApiContext) -> Router {
    let protected = Router::new()
        .route("/import/images", post(endpoints::import::import_images))
        .route("/import/xlsx", post(endpoints::import::import_xlsx))
        .route("/import/preview", post(endpoints::import::preview))
        .route("/import/test-ocr", post(endpoints::import::test_ocr))
        .route(
            "/import/duplicates/next",
            get(endpoints::duplicates::next_pending),
        )
        .route(
            "/import/duplicates/resolve",
            post(endpoints::duplicates::resolve),
        )
        .route("/billing/usage", get(endpoints::billing::usage))
        .route("/billing/report", get(endpoints::billing::report))
        .route("/billing/invoices", get(endpoints::billing::invoices))
        .route(
            "/billing/invoices/:id/pay",
            post(endpoints::billing::pay_invoice),
        )
        .route("/billing/packages", post(endpoints::billing::buy_package))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::tenant::require_tenant));

    let open = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    Router::new()
        .nest("/api", protected)
        .nest("/api", open)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
}
