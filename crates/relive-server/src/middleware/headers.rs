//! Response headers and request tracing.
//!
//! Adds to every response:
//! - X-Content-Type-Options
//! - Access-Control-Allow-Origin (pages served elsewhere may subscribe)

use axum::http::HeaderValue;
use axum::http::header::HeaderName;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Create layer that adds X-Content-Type-Options header.
pub(crate) fn content_type_options_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    )
}

/// Create layer that allows cross-origin live subscriptions.
///
/// Existing values set by a handler are kept.
pub(crate) fn allow_origin_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    )
}

/// Create layer that logs each request through `tracing`.
pub(crate) fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}
