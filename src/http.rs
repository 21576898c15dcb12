// HTTP front-end
//
// `POST /pi` with `{"content": "<command line>"}` enqueues the line for the
// dispatcher. Static files under `/public/` are served from a directory.

use std::path::Path;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::messages::CommandRequest;
use crate::runtime::Shutdown;

#[derive(Clone)]
struct AppState {
    commands: mpsc::UnboundedSender<String>,
}

/// Build the router: every request handler is another producer on `commands`
pub fn router(commands: mpsc::UnboundedSender<String>, public_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/pi", post(handle_command))
        .nest_service("/public", ServeDir::new(public_dir))
        .with_state(AppState { commands })
}

async fn handle_command(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            error!("Error reading request body: {}", e);
            return (StatusCode::BAD_REQUEST, e.body_text()).into_response();
        }
    };
    info!("Body received: {}", String::from_utf8_lossy(&body));

    let request: CommandRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Error parsing command request: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    if state.commands.send(request.content).is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "dispatcher has stopped").into_response();
    }
    StatusCode::OK.into_response()
}

/// Serve until the shutdown token fires
pub async fn serve(
    listener: TcpListener,
    commands: mpsc::UnboundedSender<String>,
    public_dir: impl AsRef<Path>,
    shutdown: Shutdown,
) -> std::io::Result<()> {
    let app = router(commands, public_dir);
    info!("HTTP front-end listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}
