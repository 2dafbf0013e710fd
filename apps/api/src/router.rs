use axum::{routing::get, Router};

use appointment_cell::{appointment_routes, directory_routes, queue_routes, AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "HospEase API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/queue", queue_routes(state.clone()))
        .nest("/directory", directory_routes(state))
}
