//! Public site information API
//!
//! Exposes the registered content types and taxonomies (no authentication
//! required) so clients can discover identifiers and permalink slugs.

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::AppState;
use crate::registration::{course_category_taxonomy, course_content_type, ContentType, Taxonomy};

/// Response for registered content types
#[derive(Debug, Serialize)]
pub struct TypesResponse {
    pub version: &'static str,
    pub content_types: Vec<ContentType>,
    pub taxonomies: Vec<Taxonomy>,
}

/// Build the public site router
pub fn router() -> Router<AppState> {
    Router::new().route("/types", get(get_types))
}

/// GET /api/v1/site/types - Registered content types and taxonomies
async fn get_types() -> Json<TypesResponse> {
    Json(TypesResponse {
        version: env!("CARGO_PKG_VERSION"),
        content_types: vec![course_content_type()],
        taxonomies: vec![course_category_taxonomy()],
    })
}
