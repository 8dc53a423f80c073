//! Static file serving.
//!
//! Serves files from the web root. Templates (files with the configured view
//! extension) are passed through the live registry before being returned.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{Uri, header};
use axum::response::{Html, IntoResponse, Response};

use crate::error::ServerError;
use crate::live::request_path;
use crate::state::AppState;

/// Create router for static file serving.
pub(crate) fn static_router() -> Router<Arc<AppState>> {
    Router::new().fallback(serve_file)
}

/// Serve a file or rendered template from the web root.
async fn serve_file(
    State(state): State<Arc<AppState>>,
    uri: Uri,
) -> Result<Response, ServerError> {
    let request = uri.path();
    let Some(relative) = request_path(request) else {
        return Err(ServerError::NotFound(request.to_owned()));
    };

    let mut file = state.web_root.join(&relative);
    if tokio::fs::metadata(&file)
        .await
        .is_ok_and(|meta| meta.is_dir())
    {
        file = file.join(state.index_file());
    }

    let content = match tokio::fs::read(&file).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ServerError::NotFound(request.to_owned()));
        }
        Err(err) if err.kind() == std::io::ErrorKind::IsADirectory => {
            return Err(ServerError::NotFound(request.to_owned()));
        }
        Err(err) => return Err(err.into()),
    };

    if is_template(&state, &file) {
        let source = String::from_utf8(content)
            .map_err(|_| ServerError::InvalidTemplate(request.to_owned()))?;
        return Ok(Html(state.live.replace_data_live(&source)).into_response());
    }

    let mime = mime_guess::from_path(&file).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.as_ref().to_owned())], content).into_response())
}

fn is_template(state: &AppState, file: &Path) -> bool {
    file.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| state.is_template(ext))
}
