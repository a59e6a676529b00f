//! Category service
//!
//! Implements business logic for the course category taxonomy:
//! - Create, read, delete category terms
//! - Hierarchical term tree
//! - Slug generation from name

use crate::db::repositories::CategoryRepository;
use crate::models::{CategoryTree, CourseCategory};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    /// Category slug already exists
    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    /// Category not found
    #[error("Category not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Parent category not found
    #[error("Parent category not found: {0}")]
    ParentNotFound(i64),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service for managing the course taxonomy
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    /// Create a new category service
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    /// Create a new category term.
    ///
    /// The slug is generated from the name when not provided. The parent,
    /// when given, must already exist.
    pub async fn create(
        &self,
        input: CreateCategoryInput,
    ) -> Result<CourseCategory, CategoryServiceError> {
        if input.name.trim().is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name cannot be empty".to_string(),
            ));
        }

        let slug = match input.slug {
            Some(slug) if slug.trim().is_empty() => {
                return Err(CategoryServiceError::ValidationError(
                    "Category slug cannot be empty".to_string(),
                ));
            }
            Some(slug) => slug,
            None => generate_slug(&input.name),
        };

        if self
            .repo
            .get_by_slug(&slug)
            .await
            .context("Failed to check slug uniqueness")?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateSlug(slug));
        }

        if let Some(parent_id) = input.parent_id {
            if self
                .repo
                .get_by_id(parent_id)
                .await
                .context("Failed to get parent category")?
                .is_none()
            {
                return Err(CategoryServiceError::ParentNotFound(parent_id));
            }
        }

        let category = CourseCategory::new(slug, input.name, input.parent_id);
        let created = self
            .repo
            .create(&category)
            .await
            .context("Failed to create category")?;

        Ok(created)
    }

    /// Get a category by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<CourseCategory>, CategoryServiceError> {
        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category by ID")?;
        Ok(category)
    }

    /// Get a category by slug
    pub async fn get_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<CourseCategory>, CategoryServiceError> {
        let category = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?;
        Ok(category)
    }

    /// List all categories, ordered by name
    pub async fn list(&self) -> Result<Vec<CourseCategory>, CategoryServiceError> {
        let list = self.repo.list().await.context("Failed to list categories")?;
        Ok(list)
    }

    /// Category terms organized as a tree
    pub async fn list_tree(&self) -> Result<Vec<CategoryTree>, CategoryServiceError> {
        let tree = self
            .repo
            .list_tree()
            .await
            .context("Failed to get category tree")?;
        Ok(tree)
    }

    /// Delete a category term.
    ///
    /// Children of the deleted term become root terms.
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        if self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .is_none()
        {
            return Err(CategoryServiceError::NotFound(format!(
                "Category with ID {} not found",
                id
            )));
        }

        self.repo
            .delete(id)
            .await
            .context("Failed to delete category")?;

        Ok(())
    }
}

/// Input for creating a new category
#[derive(Debug, Clone)]
pub struct CreateCategoryInput {
    /// Category name (required)
    pub name: String,
    /// URL-friendly slug (optional, generated from name if not provided)
    pub slug: Option<String>,
    /// Parent category ID (optional, for hierarchical structure)
    pub parent_id: Option<i64>,
}

impl CreateCategoryInput {
    /// Create a new category input with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: None,
            parent_id: None,
        }
    }

    /// Set the slug
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// Set the parent category ID
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Generate a URL-friendly slug from a name
///
/// Converts the name to lowercase, replaces runs of other characters
/// with a single hyphen, and trims hyphens from the ends.
pub fn generate_slug(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut prev_hyphen = false;

    for c in name.chars() {
        if c.is_alphanumeric() {
            result.extend(c.to_lowercase());
            prev_hyphen = false;
        } else if !prev_hyphen && !result.is_empty() {
            result.push('-');
            prev_hyphen = true;
        }
    }

    result.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxCategoryRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, CategoryService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let repo = SqlxCategoryRepository::boxed(pool.clone());
        let service = CategoryService::new(repo);

        (pool, service)
    }

    // ========================================================================
    // Slug generation tests
    // ========================================================================

    #[test]
    fn test_generate_slug_simple() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
    }

    #[test]
    fn test_generate_slug_with_special_chars() {
        assert_eq!(generate_slug("Hello, World!"), "hello-world");
    }

    #[test]
    fn test_generate_slug_with_multiple_spaces() {
        assert_eq!(generate_slug("Hello   World"), "hello-world");
    }

    #[test]
    fn test_generate_slug_with_underscores() {
        assert_eq!(generate_slug("hello_world"), "hello-world");
    }

    // ========================================================================
    // Create category tests
    // ========================================================================

    #[tokio::test]
    async fn test_create_category_success() {
        let (_pool, service) = setup_test_service().await;

        let category = service
            .create(CreateCategoryInput::new("Web Development"))
            .await
            .expect("Failed to create category");

        assert!(category.id > 0);
        assert_eq!(category.name, "Web Development");
        assert_eq!(category.slug, "web-development");
        assert!(category.parent_id.is_none());
    }

    #[tokio::test]
    async fn test_create_category_with_custom_slug() {
        let (_pool, service) = setup_test_service().await;

        let category = service
            .create(CreateCategoryInput::new("Web Development").with_slug("webdev"))
            .await
            .expect("Failed to create category");

        assert_eq!(category.slug, "webdev");
    }

    #[tokio::test]
    async fn test_create_category_with_parent() {
        let (_pool, service) = setup_test_service().await;

        let parent = service
            .create(CreateCategoryInput::new("Programming"))
            .await
            .expect("Failed to create parent");
        let child = service
            .create(CreateCategoryInput::new("Rust").with_parent(parent.id))
            .await
            .expect("Failed to create child");

        assert_eq!(child.parent_id, Some(parent.id));
    }

    #[tokio::test]
    async fn test_create_category_duplicate_slug_fails() {
        let (_pool, service) = setup_test_service().await;

        service
            .create(CreateCategoryInput::new("One").with_slug("same-slug"))
            .await
            .expect("Failed to create first category");

        let result = service
            .create(CreateCategoryInput::new("Two").with_slug("same-slug"))
            .await;

        assert!(matches!(result, Err(CategoryServiceError::DuplicateSlug(_))));
    }

    #[tokio::test]
    async fn test_create_category_empty_name_fails() {
        let (_pool, service) = setup_test_service().await;

        let result = service.create(CreateCategoryInput::new("")).await;

        assert!(matches!(result, Err(CategoryServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_create_category_nonexistent_parent_fails() {
        let (_pool, service) = setup_test_service().await;

        let result = service
            .create(CreateCategoryInput::new("Orphan").with_parent(99999))
            .await;

        assert!(matches!(result, Err(CategoryServiceError::ParentNotFound(_))));
    }

    // ========================================================================
    // Get and list tests
    // ========================================================================

    #[tokio::test]
    async fn test_get_by_id_and_slug() {
        let (_pool, service) = setup_test_service().await;

        let created = service
            .create(CreateCategoryInput::new("Design"))
            .await
            .expect("Failed to create category");

        let by_id = service
            .get_by_id(created.id)
            .await
            .expect("Failed to get category")
            .expect("Category not found");
        assert_eq!(by_id.name, "Design");

        let by_slug = service
            .get_by_slug("design")
            .await
            .expect("Failed to get category")
            .expect("Category not found");
        assert_eq!(by_slug.id, created.id);
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let (_pool, service) = setup_test_service().await;

        let result = service.get_by_id(99999).await.expect("Failed to get category");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_ordered_by_name() {
        let (_pool, service) = setup_test_service().await;

        service
            .create(CreateCategoryInput::new("Zeta"))
            .await
            .expect("Failed to create");
        service
            .create(CreateCategoryInput::new("Alpha"))
            .await
            .expect("Failed to create");

        let categories = service.list().await.expect("Failed to list categories");

        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name, "Alpha");
        assert_eq!(categories[1].name, "Zeta");
    }

    #[tokio::test]
    async fn test_list_tree() {
        let (_pool, service) = setup_test_service().await;

        let parent = service
            .create(CreateCategoryInput::new("Parent"))
            .await
            .expect("Failed to create parent");
        service
            .create(CreateCategoryInput::new("Child 1").with_parent(parent.id))
            .await
            .expect("Failed to create child1");
        service
            .create(CreateCategoryInput::new("Child 2").with_parent(parent.id))
            .await
            .expect("Failed to create child2");

        let tree = service.list_tree().await.expect("Failed to get tree");

        let parent_tree = tree.iter().find(|t| t.category.name == "Parent");
        assert!(parent_tree.is_some());
        assert_eq!(parent_tree.map(|t| t.children.len()), Some(2));
    }

    // ========================================================================
    // Delete category tests
    // ========================================================================

    #[tokio::test]
    async fn test_delete_category_success() {
        let (_pool, service) = setup_test_service().await;

        let created = service
            .create(CreateCategoryInput::new("To Delete"))
            .await
            .expect("Failed to create category");

        service.delete(created.id).await.expect("Failed to delete category");

        let found = service.get_by_id(created.id).await.expect("Failed to get category");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_delete_category_not_found() {
        let (_pool, service) = setup_test_service().await;

        let result = service.delete(99999).await;
        assert!(matches!(result, Err(CategoryServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_parent_promotes_children_to_root() {
        let (_pool, service) = setup_test_service().await;

        let parent = service
            .create(CreateCategoryInput::new("Parent"))
            .await
            .expect("Failed to create parent");
        let child = service
            .create(CreateCategoryInput::new("Child").with_parent(parent.id))
            .await
            .expect("Failed to create child");

        service.delete(parent.id).await.expect("Failed to delete parent");

        let tree = service.list_tree().await.expect("Failed to get tree");
        assert!(tree.iter().any(|t| t.category.id == child.id));
    }
}
