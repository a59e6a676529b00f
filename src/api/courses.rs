//! Course API endpoints
//!
//! Public:
//! - GET /api/v1/courses - List recent courses
//! - GET /api/v1/courses/:slug - Get one course, body rendered
//!
//! Protected:
//! - POST /api/v1/courses - Create a course
//! - PUT /api/v1/courses/:id - Update a course (metadata via the validated
//!   save path: nonce-protected, silently skipped when the token is bad)
//! - DELETE /api/v1/courses/:id - Delete a course
//!
//! `duration` and `level` are exposed as read-only strings; an unset field
//! reads as the empty string. They are only written through the metadata
//! portion of an update.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, SessionToken};
use crate::models::{
    Course, CourseCategory, CourseMetaForm, CreateCourseInput, UpdateCourseInput,
};
use crate::services::course::CourseServiceError;

/// Category info embedded in course responses
#[derive(Debug, Serialize)]
pub struct CategoryInfo {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub parent_id: Option<i64>,
}

impl From<CourseCategory> for CategoryInfo {
    fn from(c: CourseCategory) -> Self {
        Self {
            id: c.id,
            slug: c.slug,
            name: c.name,
            parent_id: c.parent_id,
        }
    }
}

/// Full course response
#[derive(Debug, Serialize)]
pub struct CourseResponse {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub thumbnail: Option<String>,
    pub author_id: i64,
    pub permalink: String,
    /// Stored duration in hours, empty string when unset (read-only)
    pub duration: String,
    /// Stored difficulty level, empty string when unset (read-only)
    pub level: String,
    pub categories: Vec<CategoryInfo>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a course
#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub slug: String,
    pub title: String,
    pub body: String,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

/// Request body for updating a course.
///
/// The metadata fields ride along with their nonce; an invalid or missing
/// nonce leaves stored metadata untouched without failing the update.
#[derive(Debug, Deserialize)]
pub struct UpdateCourseRequest {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub thumbnail: Option<String>,
    pub category_ids: Option<Vec<i64>>,
    pub meta_nonce: Option<String>,
    #[serde(default)]
    pub autosave: bool,
    pub duration: Option<String>,
    pub level: Option<String>,
}

/// Query parameters for the course list
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

/// Build public course routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_courses))
        .route("/{slug}", get(get_course))
}

/// Build protected course routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_course))
        .route("/{slug}", put(update_course).delete(delete_course))
}

fn map_course_error(e: CourseServiceError) -> ApiError {
    match e {
        CourseServiceError::NotFound => ApiError::not_found("Course not found"),
        CourseServiceError::Forbidden => ApiError::forbidden("Permission denied"),
        CourseServiceError::ValidationError(msg) => ApiError::validation_error(msg),
        CourseServiceError::SlugExists(slug) => {
            ApiError::with_details("CONFLICT", format!("Slug already exists: {}", slug), serde_json::json!({}))
        }
        CourseServiceError::InternalError(e) => ApiError::internal_error(e.to_string()),
    }
}

async fn course_response(
    state: &AppState,
    course: Course,
    rendered_body: String,
) -> Result<CourseResponse, ApiError> {
    let duration = state
        .course_service
        .duration(course.id)
        .await
        .map_err(map_course_error)?;
    let level = state
        .course_service
        .level(course.id)
        .await
        .map_err(map_course_error)?;
    let categories = state
        .course_service
        .categories(course.id)
        .await
        .map_err(map_course_error)?
        .into_iter()
        .map(CategoryInfo::from)
        .collect();

    Ok(CourseResponse {
        id: course.id,
        permalink: course.permalink(),
        slug: course.slug,
        title: course.title,
        body: rendered_body,
        thumbnail: course.thumbnail,
        author_id: course.author_id,
        duration,
        level,
        categories,
        created_at: course.created_at.to_rfc3339(),
        updated_at: course.updated_at.to_rfc3339(),
    })
}

/// GET /api/v1/courses - List recent courses
async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CourseResponse>>, ApiError> {
    let entries = state
        .course_service
        .list_entries(query.limit.max(0))
        .await
        .map_err(map_course_error)?;

    let mut courses = Vec::with_capacity(entries.len());
    for entry in entries {
        courses.push(CourseResponse {
            id: entry.course.id,
            permalink: entry.course.permalink(),
            slug: entry.course.slug,
            title: entry.course.title,
            body: entry.course.body,
            thumbnail: entry.course.thumbnail,
            author_id: entry.course.author_id,
            duration: entry.duration.unwrap_or_default(),
            level: entry.level.as_str().to_string(),
            categories: entry.categories.into_iter().map(CategoryInfo::from).collect(),
            created_at: entry.course.created_at.to_rfc3339(),
            updated_at: entry.course.updated_at.to_rfc3339(),
        });
    }

    Ok(Json(courses))
}

/// GET /api/v1/courses/:slug - Get one course with its body rendered
async fn get_course(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CourseResponse>, ApiError> {
    let course = state
        .course_service
        .get_by_slug(&slug)
        .await
        .map_err(map_course_error)?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;

    let rendered = state
        .course_service
        .render_body(&course.body)
        .await
        .map_err(map_course_error)?;

    let response = course_response(&state, course, rendered).await?;
    Ok(Json(response))
}

/// POST /api/v1/courses - Create a course
async fn create_course(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = CreateCourseInput {
        slug: body.slug,
        title: body.title,
        body: body.body,
        thumbnail: body.thumbnail,
        author_id: user.0.id,
        category_ids: body.category_ids,
    };

    let course = state
        .course_service
        .create(&user.0, input)
        .await
        .map_err(map_course_error)?;

    let body = course.body.clone();
    let response = course_response(&state, course, body).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// PUT /api/v1/courses/:id - Update a course
async fn update_course(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(token): Extension<SessionToken>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCourseRequest>,
) -> Result<Json<CourseResponse>, ApiError> {
    let input = UpdateCourseInput {
        slug: body.slug,
        title: body.title,
        body: body.body,
        thumbnail: body.thumbnail,
        category_ids: body.category_ids,
        meta: CourseMetaForm {
            nonce: body.meta_nonce,
            autosave: body.autosave,
            duration: body.duration,
            level: body.level,
        },
    };

    let course = state
        .course_service
        .update(&user.0, &token.0, id, input)
        .await
        .map_err(map_course_error)?;

    let rendered = course.body.clone();
    let response = course_response(&state, course, rendered).await?;
    Ok(Json(response))
}

/// DELETE /api/v1/courses/:id - Delete a course
async fn delete_course(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .course_service
        .delete(&user.0, id)
        .await
        .map_err(map_course_error)?;

    Ok(StatusCode::NO_CONTENT)
}
