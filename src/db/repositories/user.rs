//! User repository
//!
//! Database operations for users and their metadata rows.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL
//!
//! The export module depends on `list_export_page`, which returns a fixed-size
//! page of users with their metadata already attached so a full export never
//! holds more than one page in memory.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole, UserWithMeta};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by login name
    async fn get_by_login(&self, login: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Count total users
    async fn count(&self) -> Result<i64>;

    /// Fetch one page of users with metadata attached, ordered by id.
    ///
    /// Pages are 1-based. Returns an empty vec past the last page.
    async fn list_export_page(&self, page: i64, per_page: i64) -> Result<Vec<UserWithMeta>>;

    /// Append a metadata row for a user. Keys are an open multimap.
    async fn add_meta(&self, user_id: i64, key: &str, value: &str) -> Result<()>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.as_sqlite().unwrap(), user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.as_mysql().unwrap(), user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.as_mysql().unwrap(), id).await,
        }
    }

    async fn get_by_login(&self, login: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_login_sqlite(self.pool.as_sqlite().unwrap(), login).await
            }
            DatabaseDriver::Mysql => {
                get_user_by_login_mysql(self.pool.as_mysql().unwrap(), login).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_email_sqlite(self.pool.as_sqlite().unwrap(), email).await
            }
            DatabaseDriver::Mysql => {
                get_user_by_email_mysql(self.pool.as_mysql().unwrap(), email).await
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.as_sqlite().unwrap()).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.as_mysql().unwrap()).await,
        }
    }

    async fn list_export_page(&self, page: i64, per_page: i64) -> Result<Vec<UserWithMeta>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_export_page_sqlite(self.pool.as_sqlite().unwrap(), page, per_page).await
            }
            DatabaseDriver::Mysql => {
                list_export_page_mysql(self.pool.as_mysql().unwrap(), page, per_page).await
            }
        }
    }

    async fn add_meta(&self, user_id: i64, key: &str, value: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                add_meta_sqlite(self.pool.as_sqlite().unwrap(), user_id, key, value).await
            }
            DatabaseDriver::Mysql => {
                add_meta_mysql(self.pool.as_mysql().unwrap(), user_id, key, value).await
            }
        }
    }
}

/// Serialize the role list to its stored JSON form
fn roles_to_json(roles: &[UserRole]) -> Result<String> {
    serde_json::to_string(roles).context("Failed to serialize roles")
}

/// Parse the stored JSON role list
fn roles_from_json(raw: &str) -> Result<Vec<UserRole>> {
    serde_json::from_str(raw).with_context(|| format!("Invalid roles in database: {}", raw))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let roles_json = roles_to_json(&user.roles)?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (login, nicename, email, display_name, password_hash, roles, registered_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.login)
    .bind(&user.nicename)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(&user.password_hash)
    .bind(&roles_json)
    .bind(user.registered_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    let id = result.last_insert_rowid();

    Ok(User {
        id,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, login, nicename, email, display_name, password_hash, roles, registered_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_user_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn get_user_by_login_sqlite(pool: &SqlitePool, login: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, login, nicename, email, display_name, password_hash, roles, registered_at
        FROM users
        WHERE login = ?
        "#,
    )
    .bind(login)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by login")?;

    match row {
        Some(row) => Ok(Some(row_to_user_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, login, nicename, email, display_name, password_hash, roles, registered_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    match row {
        Some(row) => Ok(Some(row_to_user_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_export_page_sqlite(
    pool: &SqlitePool,
    page: i64,
    per_page: i64,
) -> Result<Vec<UserWithMeta>> {
    let offset = (page - 1) * per_page;

    let rows = sqlx::query(
        r#"
        SELECT id, login, nicename, email, display_name, password_hash, roles, registered_at
        FROM users
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        users.push(row_to_user_sqlite(&row)?);
    }

    attach_meta_sqlite(pool, users).await
}

/// Fetch metadata for a page of users in a single query and zip it back
/// onto the users, preserving stored row order per user.
async fn attach_meta_sqlite(pool: &SqlitePool, users: Vec<User>) -> Result<Vec<UserWithMeta>> {
    if users.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; users.len()].join(", ");
    let sql = format!(
        "SELECT user_id, meta_key, meta_value FROM user_meta WHERE user_id IN ({}) ORDER BY id",
        placeholders
    );

    let mut query = sqlx::query(&sql);
    for user in &users {
        query = query.bind(user.id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to fetch user metadata")?;

    let mut result: Vec<UserWithMeta> = users
        .into_iter()
        .map(|user| UserWithMeta {
            user,
            meta: Vec::new(),
        })
        .collect();

    for row in rows {
        let user_id: i64 = row.get("user_id");
        let key: String = row.get("meta_key");
        let value: String = row.get("meta_value");
        if let Some(entry) = result.iter_mut().find(|e| e.user.id == user_id) {
            entry.meta.push((key, value));
        }
    }

    Ok(result)
}

async fn add_meta_sqlite(pool: &SqlitePool, user_id: i64, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT INTO user_meta (user_id, meta_key, meta_value) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(key)
        .bind(value)
        .execute(pool)
        .await
        .context("Failed to add user metadata")?;

    Ok(())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let roles_raw: String = row.get("roles");

    Ok(User {
        id: row.get("id"),
        login: row.get("login"),
        nicename: row.get("nicename"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        password_hash: row.get("password_hash"),
        roles: roles_from_json(&roles_raw)?,
        registered_at: row.get("registered_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let roles_json = roles_to_json(&user.roles)?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (login, nicename, email, display_name, password_hash, roles, registered_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.login)
    .bind(&user.nicename)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(&user.password_hash)
    .bind(&roles_json)
    .bind(user.registered_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    let id = result.last_insert_id() as i64;

    Ok(User {
        id,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, login, nicename, email, display_name, password_hash, roles, registered_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_user_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn get_user_by_login_mysql(pool: &MySqlPool, login: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, login, nicename, email, display_name, password_hash, roles, registered_at
        FROM users
        WHERE login = ?
        "#,
    )
    .bind(login)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by login")?;

    match row {
        Some(row) => Ok(Some(row_to_user_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, login, nicename, email, display_name, password_hash, roles, registered_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    match row {
        Some(row) => Ok(Some(row_to_user_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_export_page_mysql(
    pool: &MySqlPool,
    page: i64,
    per_page: i64,
) -> Result<Vec<UserWithMeta>> {
    let offset = (page - 1) * per_page;

    let rows = sqlx::query(
        r#"
        SELECT id, login, nicename, email, display_name, password_hash, roles, registered_at
        FROM users
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        users.push(row_to_user_mysql(&row)?);
    }

    attach_meta_mysql(pool, users).await
}

async fn attach_meta_mysql(pool: &MySqlPool, users: Vec<User>) -> Result<Vec<UserWithMeta>> {
    if users.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; users.len()].join(", ");
    let sql = format!(
        "SELECT user_id, meta_key, meta_value FROM user_meta WHERE user_id IN ({}) ORDER BY id",
        placeholders
    );

    let mut query = sqlx::query(&sql);
    for user in &users {
        query = query.bind(user.id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to fetch user metadata")?;

    let mut result: Vec<UserWithMeta> = users
        .into_iter()
        .map(|user| UserWithMeta {
            user,
            meta: Vec::new(),
        })
        .collect();

    for row in rows {
        let user_id: i64 = row.get("user_id");
        let key: String = row.get("meta_key");
        let value: String = row.get("meta_value");
        if let Some(entry) = result.iter_mut().find(|e| e.user.id == user_id) {
            entry.meta.push((key, value));
        }
    }

    Ok(result)
}

async fn add_meta_mysql(pool: &MySqlPool, user_id: i64, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT INTO user_meta (user_id, meta_key, meta_value) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(key)
        .bind(value)
        .execute(pool)
        .await
        .context("Failed to add user metadata")?;

    Ok(())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let roles_raw: String = row.get("roles");

    Ok(User {
        id: row.get("id"),
        login: row.get("login"),
        nicename: row.get("nicename"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        password_hash: row.get("password_hash"),
        roles: roles_from_json(&roles_raw)?,
        registered_at: row.get("registered_at"),
    })
}
