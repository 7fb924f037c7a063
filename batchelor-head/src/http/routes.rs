//! Router assembly: 7 routes, with auth middleware applied to every route
//! except `/alive`.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use batchelor_shared::config::HeadConfig;
use tower_http::trace::TraceLayer;

use crate::dispatch::DispatchService;
use crate::http::{auth_middleware, handlers};

#[derive(Clone)]
pub struct AppState {
    pub dispatch: Arc<DispatchService>,
    pub config: Arc<HeadConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/tasks", post(handlers::run_task).get(handlers::get_tasks))
        .route("/tasks/:task_id", get(handlers::get_task))
        .route("/tasks/:task_id/signal", post(handlers::send_signal))
        .route("/worker/fetch", post(handlers::fetch_task))
        .route("/event-types", get(handlers::get_event_types))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware::require_auth));

    Router::new()
        .route("/alive", get(handlers::alive))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
