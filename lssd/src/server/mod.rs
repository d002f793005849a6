pub mod browse;

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub record_dir: Arc<PathBuf>,
}

/// Read-only browser over the record directory.
pub fn router(record_dir: PathBuf) -> Router {
    let state = AppState {
        record_dir: Arc::new(record_dir),
    };

    Router::new()
        .route("/", get(browse_root))
        .route("/{*path}", get(browse_path))
        .with_state(state)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until `shutdown` fires.
pub async fn run_server(
    addr: SocketAddr,
    record_dir: PathBuf,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(record_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "file browser listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn browse_root(State(state): State<AppState>, request: Request) -> Response {
    serve_path(&state, "", request).await
}

async fn browse_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request,
) -> Response {
    serve_path(&state, &path, request).await
}

async fn serve_path(state: &AppState, path: &str, request: Request) -> Response {
    let Some(target) = browse::resolve(&state.record_dir, path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let metadata = match tokio::fs::metadata(&target).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            error!(path = %target.display(), error = %e, "failed to stat path");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !metadata.is_dir() {
        return match ServeFile::new(&target).oneshot(request).await {
            Ok(response) => response.into_response(),
            Err(never) => match never {},
        };
    }

    // Relative links in the index need the trailing slash.
    let uri_path = request.uri().path();
    if !uri_path.ends_with('/') {
        return Redirect::permanent(&format!("{uri_path}/")).into_response();
    }

    match browse::read_listing(&target).await {
        Ok(entries) => Html(browse::render_index(path, &entries)).into_response(),
        Err(e) => {
            error!(path = %target.display(), error = %e, "failed to read directory");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
