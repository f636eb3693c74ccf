//! API module for handling HTTP requests and responses

#[cfg(feature = "web")]
pub(crate) mod extract;
#[cfg(feature = "web")]
pub(crate) mod handlers;
#[cfg(feature = "web")]
pub(crate) mod responses;

#[cfg(feature = "web")]
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
#[cfg(feature = "web")]
use std::sync::Arc;
#[cfg(feature = "web")]
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};
#[cfg(feature = "web")]
use crate::state::AppState;

#[cfg(feature = "web")]
pub use handlers::health_check;

#[cfg(feature = "web")]
/// Create the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_files = ServeDir::new(&state.config.static_dir);
    let template_files = ServeDir::new(&state.config.template_dir);
    let body_limit = state.config.max_upload_size;

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(health_check))
        // Template management
        .route("/add_template", post(handlers::add_template))
        .route("/delete_template/:dish/:filename", delete(handlers::delete_template))
        .route("/delete_dish/:dish", delete(handlers::delete_dish))
        .route("/list_templates", get(handlers::list_templates))
        // Threshold
        .route("/set_threshold", post(handlers::set_threshold))
        .route("/get_threshold", get(handlers::get_threshold))
        // Recognition
        .route("/predict", post(handlers::predict))
        .nest_service("/static", static_files)
        .nest_service("/templates_store", template_files)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
