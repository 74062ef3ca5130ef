//! Strata Server Library
//!
//! Exposes a workspace's stacks, config, tags and state over a JSON API.

pub mod error;
pub mod routes;
pub mod state;

use axum::{
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Once;
use strata_core::WorkspaceManager;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing subscriber (only once)
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG")
                    .unwrap_or_else(|_| "strata_server=info,strata_core=info,tower_http=info".into()),
            ))
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}

/// Build the Axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        // Stacks
        .route(
            "/api/stacks",
            get(routes::list_stacks).post(routes::create_stack),
        )
        .route("/api/stacks/current", get(routes::current_stack))
        .route("/api/stacks/:name", axum::routing::delete(routes::remove_stack))
        .route("/api/stacks/:name/select", post(routes::select_stack))
        // Config
        .route(
            "/api/stacks/:name/config",
            get(routes::get_all_config).put(routes::set_all_config),
        )
        .route("/api/stacks/:name/config/refresh", post(routes::refresh_config))
        .route("/api/stacks/:name/config/remove", post(routes::remove_all_config))
        .route(
            "/api/stacks/:name/config/:key",
            get(routes::get_config)
                .put(routes::set_config)
                .delete(routes::remove_config),
        )
        // Tags
        .route("/api/stacks/:name/tags", get(routes::list_tags))
        .route(
            "/api/stacks/:name/tags/:key",
            get(routes::get_tag)
                .put(routes::set_tag)
                .delete(routes::remove_tag),
        )
        // State
        .route("/api/stacks/:name/export", get(routes::export_stack))
        .route("/api/stacks/:name/import", post(routes::import_stack))
        .route("/api/stacks/:name/outputs", get(routes::stack_outputs))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve a workspace on the given port until Ctrl-C
pub async fn run_server(manager: WorkspaceManager, port: u16) -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        project = %manager.project_name(),
        work_dir = %manager.work_dir().display(),
        "Starting Strata Server..."
    );

    let app = build_router(AppState::new(manager));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": strata_core::version()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use strata_core::WorkspaceOptions;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_app(dir: &TempDir) -> Router {
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();

        let mut options = WorkspaceOptions::new(work_dir)
            .with_project("web")
            .with_passphrase("server-tests");
        options.backend.url = Some(dir.path().join("state").display().to_string());
        options.secrets.iterations = Some(16);

        build_router(AppState::new(WorkspaceManager::open(options).unwrap()))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let (status, body) = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_stack_config_and_tags() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let (status, _) = send(&app, Method::POST, "/api/stacks", Some(json!({ "name": "dev" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/stacks/dev/config/db.password",
            Some(json!({ "value": "hunter2", "secret": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/api/stacks/dev/config/db.password", None).await;
        assert_eq!(body["value"]["value"], "[secret]");

        let (_, body) = send(
            &app,
            Method::GET,
            "/api/stacks/dev/config/db.password?show_secrets=true",
            None,
        )
        .await;
        assert_eq!(body["value"]["value"], "hunter2");

        send(&app, Method::PUT, "/api/stacks/dev/tags/owner", Some(json!({ "value": "ops" }))).await;
        let (_, body) = send(&app, Method::GET, "/api/stacks/dev/tags", None).await;
        assert_eq!(body["tags"], json!({ "owner": "ops" }));

        let (_, body) = send(&app, Method::GET, "/api/stacks", None).await;
        assert_eq!(body["current"], "dev");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let (status, body) = send(&app, Method::POST, "/api/stacks/ghost/select", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        send(&app, Method::POST, "/api/stacks", Some(json!({ "name": "dev" }))).await;
        let (status, _) = send(&app, Method::POST, "/api/stacks", Some(json!({ "name": "dev" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, Method::GET, "/api/stacks/dev/config/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::POST, "/api/stacks", Some(json!({ "name": "bad name" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        send(&app, Method::POST, "/api/stacks", Some(json!({ "name": "dev" }))).await;
        send(&app, Method::POST, "/api/stacks", Some(json!({ "name": "prod" }))).await;
        send(
            &app,
            Method::PUT,
            "/api/stacks/dev/config/region",
            Some(json!({ "value": "us-west" })),
        )
        .await;

        let (status, exported) = send(&app, Method::GET, "/api/stacks/dev/export", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(exported["version"], 3);

        let (status, _) = send(&app, Method::POST, "/api/stacks/prod/import", Some(exported)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/api/stacks/prod/config/region", None).await;
        assert_eq!(body["value"]["value"], "us-west");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/stacks/prod/import",
            Some(json!({ "version": 42, "deployment": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_import_into_missing_stack_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/stacks/ghost/import",
            Some(json!({ "version": 99 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/stacks/ghost/import")
            .body(Body::from("not json at all"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_remove_dirty_stack() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        send(&app, Method::POST, "/api/stacks", Some(json!({ "name": "dev" }))).await;
        send(&app, Method::PUT, "/api/stacks/dev/config/a", Some(json!({ "value": "1" }))).await;

        let (status, _) = send(&app, Method::DELETE, "/api/stacks/dev", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, Method::DELETE, "/api/stacks/dev?force=true", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/api/stacks", None).await;
        assert_eq!(body["stacks"], json!([]));
    }
}
