pub mod error;
pub mod hub;
pub mod kubernetes;
pub mod labs;
pub mod ledger;
pub mod logstream;
pub mod middleware;
pub mod orchestrator;
pub mod reaper;
pub mod routes;
pub mod state;
pub mod storage;
pub mod subprocess;
pub mod tool;
pub mod workspaces;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Provisioning workflows and workspace changes: one at a time, gated.
    let gated = Router::new()
        .route("/api/terraform/init", post(routes::terraform::init))
        .route("/api/terraform/plan", post(routes::terraform::plan))
        .route("/api/terraform/apply", post(routes::terraform::apply))
        .route("/api/terraform/destroy", post(routes::terraform::destroy))
        .route(
            "/api/terraform/extend/{mode}",
            post(routes::terraform::extend),
        )
        .route(
            "/api/workspaces/{name}",
            put(routes::workspaces::add_workspace).delete(routes::workspaces::delete_workspace),
        )
        .route(
            "/api/workspaces/{name}/select",
            post(routes::workspaces::select_workspace),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            middleware::claim_gate,
        ));

    Router::new()
        .route("/status", get(routes::status::get_status))
        // Operator
        .route(
            "/api/actionstatus",
            get(routes::status::get_action_status).delete(routes::status::reset_action_status),
        )
        .route("/api/logs", get(routes::logs::get_logs))
        .route("/api/cache", delete(routes::cache::reset_cache))
        // Current lab
        .route(
            "/api/lab",
            get(routes::lab::get_lab)
                .put(routes::lab::put_lab)
                .delete(routes::lab::delete_lab),
        )
        .route("/api/workspaces", get(routes::workspaces::list_workspaces))
        .route("/api/resources", get(routes::workspaces::list_resources))
        .route(
            "/api/kubernetes/versions",
            get(routes::kubernetes::get_versions),
        )
        // Deployments
        .route(
            "/api/deployments",
            get(routes::deployments::list_deployments)
                .put(routes::deployments::register_deployment),
        )
        .route(
            "/api/deployments/{workspace}",
            get(routes::deployments::get_deployment)
                .delete(routes::deployments::delete_deployment),
        )
        .route(
            "/api/storage/lease/{workspace}",
            put(routes::storage::break_lease),
        )
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the reaper and serve on a pre-bound listener.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port
/// before starting (useful when `port = 0` and the OS picks a free port).
pub async fn serve_on(
    app_state: state::AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let reaper = Arc::new(app_state.reaper()).spawn();
    let app = build_router(app_state);

    tracing::info!("labrig server listening on http://localhost:{actual_port}");

    let served = axum::serve(listener, app).await;
    reaper.abort();
    served?;
    Ok(())
}

/// Bind `0.0.0.0:{port}` and serve.
pub async fn serve(app_state: state::AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}
