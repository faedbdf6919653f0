pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
pub use state::AppState;

/// All application routes with state applied. CORS and Swagger UI are layered
/// on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/api/enhanced/details/{id}", get(rest::enhanced_details_handler))
        .route("/api/enhanced/trending", get(rest::enhanced_trending_handler))
        .route("/api/enhanced/popular", get(rest::enhanced_popular_handler))
        .route(
            "/api/enhanced/recommendations/{id}",
            get(rest::enhanced_recommendations_handler),
        )
        .route("/api/enhanced/reviews/{id}", get(rest::reviews_handler))
        .route("/api/search", get(rest::search_handler))
        .route("/api/manga/{id}/chapters", get(rest::chapters_handler))
        .route("/api/chapter/{id}/pages", get(rest::chapter_pages_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
