//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints for the CourseHub system.
//! It includes:
//! - Course API endpoints
//! - Category API endpoints
//! - User/Auth API endpoints
//! - Admin user-export endpoints
//! - Site info API endpoints

pub mod auth;
pub mod categories;
pub mod courses;
pub mod export;
pub mod middleware;
pub mod site;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::CorsLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, SessionToken};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin/categories", categories::admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Export routes (need auth; the required role is checked per handler
    // against the configured export role)
    let export_routes = export::router()
        .merge(export::admin_post_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/courses", courses::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/courses", courses::public_router())
        .nest("/categories", categories::router())
        .nest("/auth", auth::public_router())
        .nest("/site", site::router())
        .merge(admin_routes)
        .merge(export_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:3000"));
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .with_state(state)
}
