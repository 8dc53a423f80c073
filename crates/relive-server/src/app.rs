//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;

use crate::live;
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
/// * `route` - Live channel path (`None` disables the endpoint)
pub(crate) fn create_router(state: Arc<AppState>, route: Option<&str>) -> Router {
    let mut router = Router::new();

    // Live channel, development only
    if let Some(route) = route
        && !state.live.mode().is_production()
    {
        router = router.route(route, get(live::live_handler));
    }

    // Static files and templates
    router = router.merge(static_files::static_router());

    router
        .layer(
            ServiceBuilder::new()
                .layer(headers::trace_layer())
                .layer(headers::content_type_options_layer())
                .layer(headers::allow_origin_layer()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use crate::live::{LiveRegistry, Mode};

    fn state(web_root: &Path, mode: Mode, view: Option<&str>) -> Arc<AppState> {
        Arc::new(AppState {
            live: Arc::new(LiveRegistry::new(web_root, mode)),
            web_root: web_root.to_path_buf(),
            view: view.map(str::to_owned),
        })
    }

    async fn get_path(router: Router, path: &str) -> axum::response::Response {
        router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_template_is_rendered_through_registry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.html"),
            "<script data-live-src='main.js'></script>",
        )
        .unwrap();
        std::fs::write(dir.path().join("main.js.lnk"), "main.7f3a.js").unwrap();
        let state = state(dir.path(), Mode::Development, Some("html"));
        state
            .live
            .update_watched_lnk(Path::new("main.js.lnk"))
            .await;
        let router = create_router(state, Some("/__live__"));

        let response = get_path(router, "/").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        assert_eq!(
            body_text(response).await,
            "<script src='main.7f3a.js' data-live='src main.js'></script>"
        );
    }

    #[tokio::test]
    async fn test_static_file_served_with_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.css"), "body {}").unwrap();
        let router = create_router(state(dir.path(), Mode::Development, Some("html")), None);

        let response = get_path(router, "/app.css").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(body_text(response).await, "body {}");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(state(dir.path(), Mode::Development, Some("html")), None);

        let response = get_path(router, "/nope.js").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_escaping_web_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let web_root = dir.path().join("public");
        std::fs::create_dir(&web_root).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "secret").unwrap();
        let router = create_router(state(&web_root, Mode::Development, Some("html")), None);

        let response = get_path(router, "/../secret.txt").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_live_route_streams_current_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Mode::Development, Some("html"));
        let live = Arc::clone(&state.live);
        let router = create_router(state, Some("/__live__"));

        let response = get_path(router, "/__live__").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(live.subscribers().len(), 1);

        let mut body = response.into_body().into_data_stream();
        let preamble = body.next().await.unwrap().unwrap();
        assert_eq!(&preamble[..], b":\n\n");
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"data: {\"live\":{},\"errors\":[]}\n\n");

        drop(body);
        assert!(live.subscribers().is_empty());
    }

    #[tokio::test]
    async fn test_live_route_disabled_in_production() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(
            state(dir.path(), Mode::Production, Some("html")),
            Some("/__live__"),
        );

        let response = get_path(router, "/__live__").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
