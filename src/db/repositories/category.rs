//! Category repository
//!
//! Database operations for course categories.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL
//!
//! Categories are hierarchical. A category whose parent is deleted becomes a
//! root category (the parent reference is set to NULL by the schema).

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CategoryTree, CourseCategory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, category: &CourseCategory) -> Result<CourseCategory>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<CourseCategory>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<CourseCategory>>;

    /// List all categories (flat, by name)
    async fn list(&self) -> Result<Vec<CourseCategory>>;

    /// List all categories as a tree structure
    async fn list_tree(&self) -> Result<Vec<CategoryTree>>;

    /// Delete a category
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based category repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &CourseCategory) -> Result<CourseCategory> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_category_sqlite(self.pool.as_sqlite().unwrap(), category).await
            }
            DatabaseDriver::Mysql => {
                create_category_mysql(self.pool.as_mysql().unwrap(), category).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<CourseCategory>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_category_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_category_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<CourseCategory>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_category_by_slug_sqlite(self.pool.as_sqlite().unwrap(), slug).await
            }
            DatabaseDriver::Mysql => {
                get_category_by_slug_mysql(self.pool.as_mysql().unwrap(), slug).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<CourseCategory>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_categories_sqlite(self.pool.as_sqlite().unwrap()).await,
            DatabaseDriver::Mysql => list_categories_mysql(self.pool.as_mysql().unwrap()).await,
        }
    }

    async fn list_tree(&self) -> Result<Vec<CategoryTree>> {
        let flat = self.list().await?;
        Ok(build_tree(flat))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_category_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => delete_category_mysql(self.pool.as_mysql().unwrap(), id).await,
        }
    }
}

/// Assemble a flat category list into a forest of trees.
///
/// A category whose parent id points at a missing category is treated
/// as a root rather than dropped.
fn build_tree(flat: Vec<CourseCategory>) -> Vec<CategoryTree> {
    let known_ids: Vec<i64> = flat.iter().map(|c| c.id).collect();

    let mut roots = Vec::new();
    let mut children_of: Vec<(i64, CourseCategory)> = Vec::new();

    for category in flat {
        match category.parent_id {
            Some(parent_id) if known_ids.contains(&parent_id) => {
                children_of.push((parent_id, category));
            }
            _ => roots.push(CategoryTree {
                category,
                children: Vec::new(),
            }),
        }
    }

    fn attach(node: &mut CategoryTree, children_of: &mut Vec<(i64, CourseCategory)>) {
        let mut i = 0;
        while i < children_of.len() {
            if children_of[i].0 == node.category.id {
                let (_, child) = children_of.remove(i);
                node.children.push(CategoryTree {
                    category: child,
                    children: Vec::new(),
                });
            } else {
                i += 1;
            }
        }
        for child in &mut node.children {
            attach(child, children_of);
        }
    }

    for root in &mut roots {
        attach(root, &mut children_of);
    }

    roots
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(
    pool: &SqlitePool,
    category: &CourseCategory,
) -> Result<CourseCategory> {
    let result = sqlx::query(
        r#"
        INSERT INTO course_categories (slug, name, parent_id, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&category.slug)
    .bind(&category.name)
    .bind(category.parent_id)
    .bind(category.created_at)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    let id = result.last_insert_rowid();

    Ok(CourseCategory {
        id,
        ..category.clone()
    })
}

async fn get_category_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<CourseCategory>> {
    let row = sqlx::query(
        "SELECT id, slug, name, parent_id, created_at FROM course_categories WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get category by ID")?;

    Ok(row.map(|row| row_to_category_sqlite(&row)))
}

async fn get_category_by_slug_sqlite(
    pool: &SqlitePool,
    slug: &str,
) -> Result<Option<CourseCategory>> {
    let row = sqlx::query(
        "SELECT id, slug, name, parent_id, created_at FROM course_categories WHERE slug = ?",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
    .context("Failed to get category by slug")?;

    Ok(row.map(|row| row_to_category_sqlite(&row)))
}

async fn list_categories_sqlite(pool: &SqlitePool) -> Result<Vec<CourseCategory>> {
    let rows = sqlx::query(
        "SELECT id, slug, name, parent_id, created_at FROM course_categories ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list categories")?;

    Ok(rows.iter().map(row_to_category_sqlite).collect())
}

async fn delete_category_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM course_categories WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete category")?;

    Ok(())
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> CourseCategory {
    CourseCategory {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        parent_id: row.get("parent_id"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(
    pool: &MySqlPool,
    category: &CourseCategory,
) -> Result<CourseCategory> {
    let result = sqlx::query(
        r#"
        INSERT INTO course_categories (slug, name, parent_id, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&category.slug)
    .bind(&category.name)
    .bind(category.parent_id)
    .bind(category.created_at)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    let id = result.last_insert_id() as i64;

    Ok(CourseCategory {
        id,
        ..category.clone()
    })
}

async fn get_category_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<CourseCategory>> {
    let row = sqlx::query(
        "SELECT id, slug, name, parent_id, created_at FROM course_categories WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get category by ID")?;

    Ok(row.map(|row| row_to_category_mysql(&row)))
}

async fn get_category_by_slug_mysql(
    pool: &MySqlPool,
    slug: &str,
) -> Result<Option<CourseCategory>> {
    let row = sqlx::query(
        "SELECT id, slug, name, parent_id, created_at FROM course_categories WHERE slug = ?",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
    .context("Failed to get category by slug")?;

    Ok(row.map(|row| row_to_category_mysql(&row)))
}

async fn list_categories_mysql(pool: &MySqlPool) -> Result<Vec<CourseCategory>> {
    let rows = sqlx::query(
        "SELECT id, slug, name, parent_id, created_at FROM course_categories ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list categories")?;

    Ok(rows.iter().map(row_to_category_mysql).collect())
}

async fn delete_category_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM course_categories WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete category")?;

    Ok(())
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> CourseCategory {
    CourseCategory {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        parent_id: row.get("parent_id"),
        created_at: row.get("created_at"),
    }
}
