//! Course service
//!
//! Implements business logic for the course catalog:
//! - Course CRUD with edit-permission checks
//! - The validated metadata save path (duration and level)
//! - Course body rendering, expanding the `[courses_list]` directive
//!
//! The metadata portion of a save is deliberately forgiving: an autosave
//! pass, a missing or invalid nonce, or a user without edit permission all
//! leave stored metadata untouched without surfacing an error. Only the
//! core update itself rejects unauthorized users.

use crate::db::repositories::CourseRepository;
use crate::models::{
    Course, CourseLevel, CourseMetaForm, CreateCourseInput, UpdateCourseInput, User,
    META_DURATION, META_LEVEL,
};
use crate::services::nonce::NonceService;
use crate::shortcode::{
    render_courses_list, CourseListEntry, ShortcodeManager, COURSES_LIST,
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Nonce action protecting the course metadata save
pub const SAVE_META_ACTION: &str = "courses_save_meta";

/// Error types for course service operations
#[derive(Debug, thiserror::Error)]
pub enum CourseServiceError {
    /// Course not found
    #[error("Course not found")]
    NotFound,

    /// User is not allowed to perform the operation
    #[error("Permission denied")]
    Forbidden,

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Slug already taken
    #[error("Course slug already exists: {0}")]
    SlugExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Course service
pub struct CourseService {
    course_repo: Arc<dyn CourseRepository>,
    nonce_service: Arc<NonceService>,
    shortcodes: ShortcodeManager,
}

impl CourseService {
    /// Create a new course service
    pub fn new(course_repo: Arc<dyn CourseRepository>, nonce_service: Arc<NonceService>) -> Self {
        Self {
            course_repo,
            nonce_service,
            shortcodes: ShortcodeManager::new(),
        }
    }

    /// Create a new course.
    ///
    /// Requires the author role or better.
    pub async fn create(
        &self,
        user: &User,
        input: CreateCourseInput,
    ) -> Result<Course, CourseServiceError> {
        if !user.can_edit(user.id) {
            return Err(CourseServiceError::Forbidden);
        }

        if input.slug.trim().is_empty() {
            return Err(CourseServiceError::ValidationError(
                "Slug cannot be empty".to_string(),
            ));
        }
        if input.title.trim().is_empty() {
            return Err(CourseServiceError::ValidationError(
                "Title cannot be empty".to_string(),
            ));
        }

        if self
            .course_repo
            .get_by_slug(&input.slug)
            .await
            .context("Failed to check slug")?
            .is_some()
        {
            return Err(CourseServiceError::SlugExists(input.slug));
        }

        let course = Course {
            thumbnail: input.thumbnail,
            ..Course::new(input.slug, input.title, input.body, user.id)
        };

        let created = self
            .course_repo
            .create(&course)
            .await
            .context("Failed to create course")?;

        if !input.category_ids.is_empty() {
            self.course_repo
                .set_categories(created.id, &input.category_ids)
                .await
                .context("Failed to assign categories")?;
        }

        tracing::info!(course_id = created.id, slug = %created.slug, "Course created");

        Ok(created)
    }

    /// Update a course.
    ///
    /// The core fields are updated only for users with edit permission on
    /// the course. The metadata portion of the form runs through
    /// `save_meta` and never fails the update.
    pub async fn update(
        &self,
        user: &User,
        session_id: &str,
        course_id: i64,
        input: UpdateCourseInput,
    ) -> Result<Course, CourseServiceError> {
        let mut course = self
            .course_repo
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .ok_or(CourseServiceError::NotFound)?;

        if !user.can_edit(course.author_id) {
            return Err(CourseServiceError::Forbidden);
        }

        if let Some(slug) = input.slug {
            if slug.trim().is_empty() {
                return Err(CourseServiceError::ValidationError(
                    "Slug cannot be empty".to_string(),
                ));
            }
            course.slug = slug;
        }
        if let Some(title) = input.title {
            course.title = title;
        }
        if let Some(body) = input.body {
            course.body = body;
        }
        if input.thumbnail.is_some() {
            course.thumbnail = input.thumbnail;
        }

        let updated = self
            .course_repo
            .update(&course)
            .await
            .context("Failed to update course")?;

        if let Some(category_ids) = input.category_ids {
            self.course_repo
                .set_categories(updated.id, &category_ids)
                .await
                .context("Failed to update categories")?;
        }

        self.save_meta(user, session_id, updated.id, &input.meta)
            .await?;

        Ok(updated)
    }

    /// Apply the metadata portion of a save form.
    ///
    /// Silent no-op when the save is an autosave pass, the nonce is missing
    /// or invalid, or the user lacks edit permission on the course. When the
    /// save is accepted, each field present in the form is sanitized and
    /// upserted, and each absent field's stored row is deleted.
    pub async fn save_meta(
        &self,
        user: &User,
        session_id: &str,
        course_id: i64,
        form: &CourseMetaForm,
    ) -> Result<(), CourseServiceError> {
        if form.autosave {
            return Ok(());
        }

        let nonce_ok = form
            .nonce
            .as_deref()
            .map(|nonce| self.nonce_service.verify(nonce, SAVE_META_ACTION, session_id))
            .unwrap_or(false);
        if !nonce_ok {
            tracing::debug!(course_id, "Metadata save skipped: invalid or missing nonce");
            return Ok(());
        }

        let course = match self
            .course_repo
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
        {
            Some(c) => c,
            None => return Ok(()),
        };
        if !user.can_edit(course.author_id) {
            tracing::debug!(course_id, user_id = user.id, "Metadata save skipped: no permission");
            return Ok(());
        }

        match &form.duration {
            Some(raw) => {
                let value = sanitize_text_field(raw);
                self.course_repo
                    .upsert_meta(course_id, META_DURATION, &value)
                    .await
                    .context("Failed to save duration")?;
            }
            None => {
                self.course_repo
                    .delete_meta(course_id, META_DURATION)
                    .await
                    .context("Failed to clear duration")?;
            }
        }

        match &form.level {
            Some(raw) => {
                let value = sanitize_text_field(raw);
                self.course_repo
                    .upsert_meta(course_id, META_LEVEL, &value)
                    .await
                    .context("Failed to save level")?;
            }
            None => {
                self.course_repo
                    .delete_meta(course_id, META_LEVEL)
                    .await
                    .context("Failed to clear level")?;
            }
        }

        Ok(())
    }

    /// Delete a course
    pub async fn delete(&self, user: &User, course_id: i64) -> Result<(), CourseServiceError> {
        let course = self
            .course_repo
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .ok_or(CourseServiceError::NotFound)?;

        if !user.can_edit(course.author_id) {
            return Err(CourseServiceError::Forbidden);
        }

        self.course_repo
            .delete(course_id)
            .await
            .context("Failed to delete course")?;

        Ok(())
    }

    /// Get a course by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Course>, CourseServiceError> {
        let course = self
            .course_repo
            .get_by_id(id)
            .await
            .context("Failed to get course")?;
        Ok(course)
    }

    /// Get a course by slug
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>, CourseServiceError> {
        let course = self
            .course_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get course")?;
        Ok(course)
    }

    /// Stored duration for a course, empty string when unset
    pub async fn duration(&self, course_id: i64) -> Result<String, CourseServiceError> {
        let value = self
            .course_repo
            .get_meta(course_id, META_DURATION)
            .await
            .context("Failed to read duration")?;
        Ok(value.unwrap_or_default())
    }

    /// Stored level for a course, empty string when unset
    pub async fn level(&self, course_id: i64) -> Result<String, CourseServiceError> {
        let value = self
            .course_repo
            .get_meta(course_id, META_LEVEL)
            .await
            .context("Failed to read level")?;
        Ok(value.unwrap_or_default())
    }

    /// Categories assigned to a course, ordered by name
    pub async fn categories(
        &self,
        course_id: i64,
    ) -> Result<Vec<crate::models::CourseCategory>, CourseServiceError> {
        let categories = self
            .course_repo
            .get_categories(course_id)
            .await
            .context("Failed to read categories")?;
        Ok(categories)
    }

    /// The most recent courses with listing extras attached
    pub async fn list_entries(&self, limit: i64) -> Result<Vec<CourseListEntry>, CourseServiceError> {
        let courses = self
            .course_repo
            .list_recent(limit)
            .await
            .context("Failed to list courses")?;

        let mut entries = Vec::with_capacity(courses.len());
        for course in courses {
            let duration = self
                .course_repo
                .get_meta(course.id, META_DURATION)
                .await
                .context("Failed to read duration")?;
            let level = self
                .course_repo
                .get_meta(course.id, META_LEVEL)
                .await
                .context("Failed to read level")?
                .map(|raw| CourseLevel::parse(&raw))
                .unwrap_or_default();
            let categories = self
                .course_repo
                .get_categories(course.id)
                .await
                .context("Failed to read categories")?;

            entries.push(CourseListEntry {
                course,
                duration,
                level,
                categories,
            });
        }

        Ok(entries)
    }

    /// Render a course body, expanding any `[courses_list]` directives.
    ///
    /// Other shortcodes are left as plain text.
    pub async fn render_body(&self, body: &str) -> Result<String, CourseServiceError> {
        let mut result = body.to_string();

        for shortcode in self.shortcodes.parse(body) {
            if shortcode.name != COURSES_LIST {
                continue;
            }
            let entries = self.list_entries(shortcode.posts_per_page()).await?;
            let rendered = render_courses_list(&entries);
            result = result.replace(&shortcode.original, &rendered);
        }

        Ok(result)
    }
}

/// Sanitize a submitted value as plain text.
///
/// Strips tags and control characters, collapses whitespace runs to a
/// single space, and trims the ends.
pub fn sanitize_text_field(input: &str) -> String {
    let mut stripped = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if in_tag => {
                let _ = c;
            }
            c if c.is_control() => stripped.push(' '),
            c => stripped.push(c),
        }
    }

    let mut out = String::with_capacity(stripped.len());
    let mut prev_space = false;
    for c in stripped.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NonceConfig;
    use crate::db::repositories::{
        CategoryRepository, SqlxCategoryRepository, SqlxCourseRepository, SqlxUserRepository,
        UserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{CourseCategory, UserRole};

    struct TestContext {
        pool: DynDatabasePool,
        service: CourseService,
        course_repo: Arc<dyn CourseRepository>,
        nonce_service: Arc<NonceService>,
        admin: User,
    }

    async fn setup() -> TestContext {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let admin = users
            .create(&User::new(
                "admin".to_string(),
                "admin@example.com".to_string(),
                "hash".to_string(),
                vec![UserRole::Administrator],
            ))
            .await
            .expect("Failed to create admin");

        let nonce_service = Arc::new(NonceService::new(&NonceConfig {
            secret: "test-secret".to_string(),
            lifetime_seconds: 86400,
        }));
        let course_repo: Arc<dyn CourseRepository> =
            Arc::new(SqlxCourseRepository::new(pool.clone()));
        let service = CourseService::new(course_repo.clone(), nonce_service.clone());

        TestContext {
            pool,
            service,
            course_repo,
            nonce_service,
            admin,
        }
    }

    fn create_input(slug: &str) -> CreateCourseInput {
        CreateCourseInput {
            slug: slug.to_string(),
            title: format!("Course {}", slug),
            body: "Body".to_string(),
            thumbnail: None,
            author_id: 0,
            category_ids: Vec::new(),
        }
    }

    fn meta_form(nonce: Option<String>, duration: Option<&str>, level: Option<&str>) -> CourseMetaForm {
        CourseMetaForm {
            nonce,
            autosave: false,
            duration: duration.map(str::to_string),
            level: level.map(str::to_string),
        }
    }

    async fn subscriber(ctx: &TestContext) -> User {
        let users = SqlxUserRepository::new(ctx.pool.clone());
        users
            .create(&User::new(
                "member".to_string(),
                "member@example.com".to_string(),
                "hash".to_string(),
                vec![UserRole::Subscriber],
            ))
            .await
            .expect("Failed to create subscriber")
    }

    #[tokio::test]
    async fn test_create_course() {
        let ctx = setup().await;

        let course = ctx
            .service
            .create(&ctx.admin, create_input("intro"))
            .await
            .expect("Failed to create course");

        assert!(course.id > 0);
        assert_eq!(course.author_id, ctx.admin.id);
    }

    #[tokio::test]
    async fn test_create_duplicate_slug_fails() {
        let ctx = setup().await;
        ctx.service
            .create(&ctx.admin, create_input("dup"))
            .await
            .expect("Failed to create course");

        let result = ctx.service.create(&ctx.admin, create_input("dup")).await;

        assert!(matches!(result, Err(CourseServiceError::SlugExists(_))));
    }

    #[tokio::test]
    async fn test_create_requires_edit_permission() {
        let ctx = setup().await;
        let member = subscriber(&ctx).await;

        let result = ctx.service.create(&member, create_input("nope")).await;

        assert!(matches!(result, Err(CourseServiceError::Forbidden)));
    }

    #[tokio::test]
    async fn test_update_by_unauthorized_user_rejected() {
        let ctx = setup().await;
        let member = subscriber(&ctx).await;
        let course = ctx
            .service
            .create(&ctx.admin, create_input("locked"))
            .await
            .expect("Failed to create course");

        let result = ctx
            .service
            .update(
                &member,
                "session-1",
                course.id,
                UpdateCourseInput {
                    title: Some("Hijacked".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(CourseServiceError::Forbidden)));
    }

    #[tokio::test]
    async fn test_save_meta_with_valid_nonce_persists() {
        let ctx = setup().await;
        let course = ctx
            .service
            .create(&ctx.admin, create_input("with-meta"))
            .await
            .expect("Failed to create course");

        let nonce = ctx
            .nonce_service
            .create(SAVE_META_ACTION, "session-1")
            .expect("Failed to mint nonce");
        ctx.service
            .save_meta(
                &ctx.admin,
                "session-1",
                course.id,
                &meta_form(Some(nonce), Some("8"), Some("beginner")),
            )
            .await
            .expect("save_meta failed");

        assert_eq!(ctx.service.duration(course.id).await.unwrap(), "8");
        assert_eq!(ctx.service.level(course.id).await.unwrap(), "beginner");
    }

    #[tokio::test]
    async fn test_save_meta_without_nonce_is_silent_noop() {
        let ctx = setup().await;
        let course = ctx
            .service
            .create(&ctx.admin, create_input("no-nonce"))
            .await
            .expect("Failed to create course");

        ctx.service
            .save_meta(
                &ctx.admin,
                "session-1",
                course.id,
                &meta_form(None, Some("8"), None),
            )
            .await
            .expect("save_meta should not error");

        assert_eq!(ctx.service.duration(course.id).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_save_meta_with_wrong_nonce_is_silent_noop() {
        let ctx = setup().await;
        let course = ctx
            .service
            .create(&ctx.admin, create_input("bad-nonce"))
            .await
            .expect("Failed to create course");

        ctx.service
            .save_meta(
                &ctx.admin,
                "session-1",
                course.id,
                &meta_form(Some("0000000000".to_string()), Some("8"), None),
            )
            .await
            .expect("save_meta should not error");

        assert_eq!(ctx.service.duration(course.id).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_save_meta_autosave_is_silent_noop() {
        let ctx = setup().await;
        let course = ctx
            .service
            .create(&ctx.admin, create_input("autosave"))
            .await
            .expect("Failed to create course");

        let nonce = ctx
            .nonce_service
            .create(SAVE_META_ACTION, "session-1")
            .expect("Failed to mint nonce");
        let form = CourseMetaForm {
            nonce: Some(nonce),
            autosave: true,
            duration: Some("8".to_string()),
            level: None,
        };
        ctx.service
            .save_meta(&ctx.admin, "session-1", course.id, &form)
            .await
            .expect("save_meta should not error");

        assert_eq!(ctx.service.duration(course.id).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_save_meta_absent_field_deletes_row() {
        let ctx = setup().await;
        let course = ctx
            .service
            .create(&ctx.admin, create_input("cleared"))
            .await
            .expect("Failed to create course");

        let nonce = ctx
            .nonce_service
            .create(SAVE_META_ACTION, "session-1")
            .expect("Failed to mint nonce");
        ctx.service
            .save_meta(
                &ctx.admin,
                "session-1",
                course.id,
                &meta_form(Some(nonce.clone()), Some("8"), Some("advanced")),
            )
            .await
            .expect("save_meta failed");

        // Absent duration in the next save removes the stored row
        ctx.service
            .save_meta(
                &ctx.admin,
                "session-1",
                course.id,
                &meta_form(Some(nonce), None, Some("advanced")),
            )
            .await
            .expect("save_meta failed");

        assert_eq!(ctx.service.duration(course.id).await.unwrap(), "");
        assert_eq!(ctx.service.level(course.id).await.unwrap(), "advanced");
        assert!(ctx
            .course_repo
            .get_meta(course.id, META_DURATION)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_save_meta_sanitizes_values() {
        let ctx = setup().await;
        let course = ctx
            .service
            .create(&ctx.admin, create_input("dirty"))
            .await
            .expect("Failed to create course");

        let nonce = ctx
            .nonce_service
            .create(SAVE_META_ACTION, "session-1")
            .expect("Failed to mint nonce");
        ctx.service
            .save_meta(
                &ctx.admin,
                "session-1",
                course.id,
                &meta_form(Some(nonce), Some("  8 <script>x</script>  hours "), None),
            )
            .await
            .expect("save_meta failed");

        assert_eq!(ctx.service.duration(course.id).await.unwrap(), "8 x hours");
    }

    #[tokio::test]
    async fn test_render_body_expands_courses_list() {
        let ctx = setup().await;
        ctx.service
            .create(&ctx.admin, create_input("listed"))
            .await
            .expect("Failed to create course");

        let html = ctx
            .service
            .render_body("Before [courses_list posts_per_page=\"5\" /] after")
            .await
            .expect("render failed");

        assert!(html.starts_with("Before <ul"));
        assert!(html.contains(r#"<a href="/courses/listed">Course listed</a>"#));
        assert!(html.ends_with(" after"));
    }

    #[tokio::test]
    async fn test_render_body_zero_matches_notice() {
        let ctx = setup().await;

        let html = ctx
            .service
            .render_body("[courses_list posts_per_page=\"0\" /]")
            .await
            .expect("render failed");

        assert_eq!(html, "<p>No courses found.</p>");
    }

    #[tokio::test]
    async fn test_render_body_at_most_n_entries() {
        let ctx = setup().await;
        for i in 1..=4 {
            ctx.service
                .create(&ctx.admin, create_input(&format!("c{}", i)))
                .await
                .expect("Failed to create course");
        }

        let html = ctx
            .service
            .render_body("[courses_list posts_per_page=\"2\" /]")
            .await
            .expect("render failed");

        assert_eq!(html.matches("<li>").count(), 2);
    }

    #[tokio::test]
    async fn test_list_entries_includes_categories() {
        let ctx = setup().await;
        let course = ctx
            .service
            .create(&ctx.admin, create_input("tagged"))
            .await
            .expect("Failed to create course");

        let categories = SqlxCategoryRepository::new(ctx.pool.clone());
        let web = categories
            .create(&CourseCategory::new("web".to_string(), "Web".to_string(), None))
            .await
            .expect("Failed to create category");
        ctx.course_repo
            .set_categories(course.id, &[web.id])
            .await
            .expect("Failed to assign category");

        let entries = ctx.service.list_entries(5).await.expect("list failed");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].categories.len(), 1);
        assert_eq!(entries[0].categories[0].slug, "web");
    }

    #[test]
    fn test_sanitize_text_field() {
        assert_eq!(sanitize_text_field("  plain  "), "plain");
        assert_eq!(sanitize_text_field("a\tb\nc"), "a b c");
        assert_eq!(sanitize_text_field("<b>bold</b> text"), "bold text");
        assert_eq!(sanitize_text_field("x\u{0007}y"), "x y");
        assert_eq!(sanitize_text_field("<script>"), "");
    }
}
