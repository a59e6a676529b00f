//! Category API endpoints
//!
//! Handles HTTP requests for the course category taxonomy:
//! - GET /api/v1/categories - Get category tree
//! - GET /api/v1/categories/{slug} - Get one category term
//! - POST /api/v1/categories - Create a term (admin)
//! - DELETE /api/v1/categories/{id} - Delete a term (admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::services::category::{CategoryServiceError, CreateCategoryInput};

/// Response for category tree
#[derive(Debug, Serialize)]
pub struct CategoryTreeResponse {
    pub categories: Vec<CategoryNodeResponse>,
}

/// Response for a category node in the tree
#[derive(Debug, Serialize)]
pub struct CategoryNodeResponse {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub children: Vec<CategoryNodeResponse>,
}

impl From<crate::models::CategoryTree> for CategoryNodeResponse {
    fn from(tree: crate::models::CategoryTree) -> Self {
        Self {
            id: tree.category.id,
            slug: tree.category.slug,
            name: tree.category.name,
            children: tree.children.into_iter().map(Into::into).collect(),
        }
    }
}

/// Response for a single category term
#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub parent_id: Option<i64>,
}

impl From<crate::models::CourseCategory> for CategoryResponse {
    fn from(c: crate::models::CourseCategory) -> Self {
        Self {
            id: c.id,
            slug: c.slug,
            name: c.name,
            parent_id: c.parent_id,
        }
    }
}

/// Request body for creating a category term
#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: Option<String>,
    pub parent_id: Option<i64>,
}

/// Build the public categories router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_category_tree))
        .route("/{slug}", get(get_category))
}

/// Build the admin categories router
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_category))
        .route("/{id}", delete(delete_category))
}

fn map_category_error(e: CategoryServiceError) -> ApiError {
    match e {
        CategoryServiceError::NotFound(msg) => ApiError::not_found(msg),
        CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
        CategoryServiceError::DuplicateSlug(slug) => {
            ApiError::with_details("CONFLICT", format!("Slug already exists: {}", slug), serde_json::json!({}))
        }
        CategoryServiceError::ParentNotFound(id) => {
            ApiError::validation_error(format!("Parent category not found: {}", id))
        }
        CategoryServiceError::InternalError(e) => ApiError::internal_error(e.to_string()),
    }
}

/// GET /api/v1/categories - Get category tree
async fn get_category_tree(
    State(state): State<AppState>,
) -> Result<Json<CategoryTreeResponse>, ApiError> {
    let tree = state
        .category_service
        .list_tree()
        .await
        .map_err(map_category_error)?;

    let categories: Vec<CategoryNodeResponse> = tree.into_iter().map(Into::into).collect();

    Ok(Json(CategoryTreeResponse { categories }))
}

/// GET /api/v1/categories/{slug} - Get one category term
async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let category = state
        .category_service
        .get_by_slug(&slug)
        .await
        .map_err(map_category_error)?
        .ok_or_else(|| ApiError::not_found(format!("Category not found: {}", slug)))?;

    Ok(Json(category.into()))
}

/// POST /api/v1/categories - Create a category term (admin)
async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    let mut input = CreateCategoryInput::new(body.name);
    if let Some(slug) = body.slug {
        input = input.with_slug(slug);
    }
    if let Some(parent_id) = body.parent_id {
        input = input.with_parent(parent_id);
    }

    let category = state
        .category_service
        .create(input)
        .await
        .map_err(map_category_error)?;

    Ok((StatusCode::CREATED, Json(category.into())))
}

/// DELETE /api/v1/categories/{id} - Delete a category term (admin)
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .category_service
        .delete(id)
        .await
        .map_err(map_category_error)?;

    Ok(StatusCode::NO_CONTENT)
}
