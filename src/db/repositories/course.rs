//! Course repository
//!
//! Database operations for courses, their metadata and category assignments.
//!
//! This module provides:
//! - `CourseRepository` trait defining the interface for course data access
//! - `SqlxCourseRepository` implementing the trait for SQLite and MySQL
//!
//! Course metadata is one row per (course, key). An absent value is an
//! absent row, never an empty string, so `delete_meta` is the way to clear
//! a field and `get_meta` returning `None` means "unset".

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Course, CourseCategory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Course repository trait
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Create a new course
    async fn create(&self, course: &Course) -> Result<Course>;

    /// Get course by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Course>>;

    /// Get course by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>>;

    /// Update a course
    async fn update(&self, course: &Course) -> Result<Course>;

    /// Delete a course
    async fn delete(&self, id: i64) -> Result<()>;

    /// List the most recent courses, newest first
    async fn list_recent(&self, limit: i64) -> Result<Vec<Course>>;

    /// Replace the category assignments of a course
    async fn set_categories(&self, course_id: i64, category_ids: &[i64]) -> Result<()>;

    /// Get the categories assigned to a course
    async fn get_categories(&self, course_id: i64) -> Result<Vec<CourseCategory>>;

    /// Insert or replace a metadata value
    async fn upsert_meta(&self, course_id: i64, key: &str, value: &str) -> Result<()>;

    /// Remove a metadata row if present
    async fn delete_meta(&self, course_id: i64, key: &str) -> Result<()>;

    /// Get a metadata value, `None` when the row is absent
    async fn get_meta(&self, course_id: i64, key: &str) -> Result<Option<String>>;
}

/// SQLx-based course repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxCourseRepository {
    pool: DynDatabasePool,
}

impl SqlxCourseRepository {
    /// Create a new SQLx course repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CourseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CourseRepository for SqlxCourseRepository {
    async fn create(&self, course: &Course) -> Result<Course> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_course_sqlite(self.pool.as_sqlite().unwrap(), course).await
            }
            DatabaseDriver::Mysql => {
                create_course_mysql(self.pool.as_mysql().unwrap(), course).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_course_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => get_course_by_id_mysql(self.pool.as_mysql().unwrap(), id).await,
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_course_by_slug_sqlite(self.pool.as_sqlite().unwrap(), slug).await
            }
            DatabaseDriver::Mysql => {
                get_course_by_slug_mysql(self.pool.as_mysql().unwrap(), slug).await
            }
        }
    }

    async fn update(&self, course: &Course) -> Result<Course> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_course_sqlite(self.pool.as_sqlite().unwrap(), course).await
            }
            DatabaseDriver::Mysql => {
                update_course_mysql(self.pool.as_mysql().unwrap(), course).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_course_sqlite(self.pool.as_sqlite().unwrap(), id).await,
            DatabaseDriver::Mysql => delete_course_mysql(self.pool.as_mysql().unwrap(), id).await,
        }
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Course>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_recent_sqlite(self.pool.as_sqlite().unwrap(), limit).await
            }
            DatabaseDriver::Mysql => list_recent_mysql(self.pool.as_mysql().unwrap(), limit).await,
        }
    }

    async fn set_categories(&self, course_id: i64, category_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_categories_sqlite(self.pool.as_sqlite().unwrap(), course_id, category_ids).await
            }
            DatabaseDriver::Mysql => {
                set_categories_mysql(self.pool.as_mysql().unwrap(), course_id, category_ids).await
            }
        }
    }

    async fn get_categories(&self, course_id: i64) -> Result<Vec<CourseCategory>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_categories_sqlite(self.pool.as_sqlite().unwrap(), course_id).await
            }
            DatabaseDriver::Mysql => {
                get_categories_mysql(self.pool.as_mysql().unwrap(), course_id).await
            }
        }
    }

    async fn upsert_meta(&self, course_id: i64, key: &str, value: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                upsert_meta_sqlite(self.pool.as_sqlite().unwrap(), course_id, key, value).await
            }
            DatabaseDriver::Mysql => {
                upsert_meta_mysql(self.pool.as_mysql().unwrap(), course_id, key, value).await
            }
        }
    }

    async fn delete_meta(&self, course_id: i64, key: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_meta_sqlite(self.pool.as_sqlite().unwrap(), course_id, key).await
            }
            DatabaseDriver::Mysql => {
                delete_meta_mysql(self.pool.as_mysql().unwrap(), course_id, key).await
            }
        }
    }

    async fn get_meta(&self, course_id: i64, key: &str) -> Result<Option<String>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_meta_sqlite(self.pool.as_sqlite().unwrap(), course_id, key).await
            }
            DatabaseDriver::Mysql => {
                get_meta_mysql(self.pool.as_mysql().unwrap(), course_id, key).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_course_sqlite(pool: &SqlitePool, course: &Course) -> Result<Course> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO courses (slug, title, body, thumbnail, author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&course.slug)
    .bind(&course.title)
    .bind(&course.body)
    .bind(&course.thumbnail)
    .bind(course.author_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create course")?;

    let id = result.last_insert_rowid();

    Ok(Course {
        id,
        created_at: now,
        updated_at: now,
        ..course.clone()
    })
}

async fn get_course_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Course>> {
    let row = sqlx::query(
        r#"
        SELECT id, slug, title, body, thumbnail, author_id, created_at, updated_at
        FROM courses
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get course by ID")?;

    Ok(row.map(|row| row_to_course_sqlite(&row)))
}

async fn get_course_by_slug_sqlite(pool: &SqlitePool, slug: &str) -> Result<Option<Course>> {
    let row = sqlx::query(
        r#"
        SELECT id, slug, title, body, thumbnail, author_id, created_at, updated_at
        FROM courses
        WHERE slug = ?
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
    .context("Failed to get course by slug")?;

    Ok(row.map(|row| row_to_course_sqlite(&row)))
}

async fn update_course_sqlite(pool: &SqlitePool, course: &Course) -> Result<Course> {
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE courses
        SET slug = ?, title = ?, body = ?, thumbnail = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&course.slug)
    .bind(&course.title)
    .bind(&course.body)
    .bind(&course.thumbnail)
    .bind(now)
    .bind(course.id)
    .execute(pool)
    .await
    .context("Failed to update course")?;

    get_course_by_id_sqlite(pool, course.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Course not found after update"))
}

async fn delete_course_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete course")?;

    Ok(())
}

async fn list_recent_sqlite(pool: &SqlitePool, limit: i64) -> Result<Vec<Course>> {
    let rows = sqlx::query(
        r#"
        SELECT id, slug, title, body, thumbnail, author_id, created_at, updated_at
        FROM courses
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list recent courses")?;

    Ok(rows.iter().map(row_to_course_sqlite).collect())
}

async fn set_categories_sqlite(
    pool: &SqlitePool,
    course_id: i64,
    category_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM course_category_assignments WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear category assignments")?;

    for category_id in category_ids {
        sqlx::query(
            "INSERT INTO course_category_assignments (course_id, category_id) VALUES (?, ?)",
        )
        .bind(course_id)
        .bind(category_id)
        .execute(&mut *tx)
        .await
        .context("Failed to assign category")?;
    }

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

async fn get_categories_sqlite(pool: &SqlitePool, course_id: i64) -> Result<Vec<CourseCategory>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.slug, c.name, c.parent_id, c.created_at
        FROM course_categories c
        JOIN course_category_assignments a ON a.category_id = c.id
        WHERE a.course_id = ?
        ORDER BY c.name
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .context("Failed to get course categories")?;

    Ok(rows.iter().map(row_to_category_sqlite).collect())
}

async fn upsert_meta_sqlite(
    pool: &SqlitePool,
    course_id: i64,
    key: &str,
    value: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO course_meta (course_id, meta_key, meta_value)
        VALUES (?, ?, ?)
        ON CONFLICT(course_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value
        "#,
    )
    .bind(course_id)
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .context("Failed to upsert course metadata")?;

    Ok(())
}

async fn delete_meta_sqlite(pool: &SqlitePool, course_id: i64, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM course_meta WHERE course_id = ? AND meta_key = ?")
        .bind(course_id)
        .bind(key)
        .execute(pool)
        .await
        .context("Failed to delete course metadata")?;

    Ok(())
}

async fn get_meta_sqlite(pool: &SqlitePool, course_id: i64, key: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT meta_value FROM course_meta WHERE course_id = ? AND meta_key = ?")
        .bind(course_id)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get course metadata")?;

    Ok(row.map(|r| r.get("meta_value")))
}

fn row_to_course_sqlite(row: &sqlx::sqlite::SqliteRow) -> Course {
    Course {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        body: row.get("body"),
        thumbnail: row.get("thumbnail"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
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

async fn create_course_mysql(pool: &MySqlPool, course: &Course) -> Result<Course> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO courses (slug, title, body, thumbnail, author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&course.slug)
    .bind(&course.title)
    .bind(&course.body)
    .bind(&course.thumbnail)
    .bind(course.author_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create course")?;

    let id = result.last_insert_id() as i64;

    Ok(Course {
        id,
        created_at: now,
        updated_at: now,
        ..course.clone()
    })
}

async fn get_course_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Course>> {
    let row = sqlx::query(
        r#"
        SELECT id, slug, title, body, thumbnail, author_id, created_at, updated_at
        FROM courses
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get course by ID")?;

    Ok(row.map(|row| row_to_course_mysql(&row)))
}

async fn get_course_by_slug_mysql(pool: &MySqlPool, slug: &str) -> Result<Option<Course>> {
    let row = sqlx::query(
        r#"
        SELECT id, slug, title, body, thumbnail, author_id, created_at, updated_at
        FROM courses
        WHERE slug = ?
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
    .context("Failed to get course by slug")?;

    Ok(row.map(|row| row_to_course_mysql(&row)))
}

async fn update_course_mysql(pool: &MySqlPool, course: &Course) -> Result<Course> {
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE courses
        SET slug = ?, title = ?, body = ?, thumbnail = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&course.slug)
    .bind(&course.title)
    .bind(&course.body)
    .bind(&course.thumbnail)
    .bind(now)
    .bind(course.id)
    .execute(pool)
    .await
    .context("Failed to update course")?;

    get_course_by_id_mysql(pool, course.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Course not found after update"))
}

async fn delete_course_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete course")?;

    Ok(())
}

async fn list_recent_mysql(pool: &MySqlPool, limit: i64) -> Result<Vec<Course>> {
    let rows = sqlx::query(
        r#"
        SELECT id, slug, title, body, thumbnail, author_id, created_at, updated_at
        FROM courses
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list recent courses")?;

    Ok(rows.iter().map(row_to_course_mysql).collect())
}

async fn set_categories_mysql(
    pool: &MySqlPool,
    course_id: i64,
    category_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM course_category_assignments WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear category assignments")?;

    for category_id in category_ids {
        sqlx::query(
            "INSERT INTO course_category_assignments (course_id, category_id) VALUES (?, ?)",
        )
        .bind(course_id)
        .bind(category_id)
        .execute(&mut *tx)
        .await
        .context("Failed to assign category")?;
    }

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

async fn get_categories_mysql(pool: &MySqlPool, course_id: i64) -> Result<Vec<CourseCategory>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.slug, c.name, c.parent_id, c.created_at
        FROM course_categories c
        JOIN course_category_assignments a ON a.category_id = c.id
        WHERE a.course_id = ?
        ORDER BY c.name
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .context("Failed to get course categories")?;

    Ok(rows.iter().map(row_to_category_mysql).collect())
}

async fn upsert_meta_mysql(pool: &MySqlPool, course_id: i64, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO course_meta (course_id, meta_key, meta_value)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE meta_value = VALUES(meta_value)
        "#,
    )
    .bind(course_id)
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .context("Failed to upsert course metadata")?;

    Ok(())
}

async fn delete_meta_mysql(pool: &MySqlPool, course_id: i64, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM course_meta WHERE course_id = ? AND meta_key = ?")
        .bind(course_id)
        .bind(key)
        .execute(pool)
        .await
        .context("Failed to delete course metadata")?;

    Ok(())
}

async fn get_meta_mysql(pool: &MySqlPool, course_id: i64, key: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT meta_value FROM course_meta WHERE course_id = ? AND meta_key = ?")
        .bind(course_id)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get course metadata")?;

    Ok(row.map(|r| r.get("meta_value")))
}

fn row_to_course_mysql(row: &sqlx::mysql::MySqlRow) -> Course {
    Course {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        body: row.get("body"),
        thumbnail: row.get("thumbnail"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
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
