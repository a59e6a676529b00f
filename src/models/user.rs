//! User model
//!
//! This module defines the User entity and related types.
//!
//! Users carry a role *list* rather than a single role: a user may be both
//! an editor and an author, and the export module emits the full list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing a registered user in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Login name (unique)
    pub login: String,
    /// URL-friendly variant of the login name
    pub nicename: String,
    /// Email address (unique)
    pub email: String,
    /// Public display name
    pub display_name: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Assigned roles
    pub roles: Vec<UserRole>,
    /// Registration timestamp
    pub registered_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// Note: The password should already be hashed before calling this function.
    /// Use `services::password::hash_password()` to hash the password.
    pub fn new(login: String, email: String, password_hash: String, roles: Vec<UserRole>) -> Self {
        let nicename = slugify(&login);
        Self {
            id: 0, // Will be set by the database
            display_name: login.clone(),
            login,
            nicename,
            email,
            password_hash,
            roles,
            registered_at: Utc::now(),
        }
    }

    /// Check if the user holds the given role
    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }

    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Administrator)
    }

    /// Check if the user can edit any content (administrator or editor)
    pub fn is_editor(&self) -> bool {
        self.is_admin() || self.has_role(UserRole::Editor)
    }

    /// Check if the user can edit the given content item.
    ///
    /// Administrators and editors can edit any item; authors only their own.
    pub fn can_edit(&self, author_id: i64) -> bool {
        self.is_editor() || (self.has_role(UserRole::Author) && self.id == author_id)
    }

    /// Serialize the role list for the export base columns, joined with `|`
    pub fn roles_joined(&self) -> String {
        self.roles
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// A user together with their metadata rows.
///
/// Metadata is an open multimap: a key may hold one or many stored values.
/// Values are kept in insertion order, raw (serialized) form; the export
/// module decides how to deserialize and flatten them.
#[derive(Debug, Clone)]
pub struct UserWithMeta {
    pub user: User,
    /// (meta_key, raw stored value), one entry per stored row
    pub meta: Vec<(String, String)>,
}

impl UserWithMeta {
    /// All raw values stored under the given key, in stored order
    pub fn values_for(&self, key: &str) -> Vec<&str> {
        self.meta
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// User role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full access, including user exports
    Administrator,
    /// Can edit all content
    Editor,
    /// Can edit own content
    Author,
    /// Read-only account
    Subscriber,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Subscriber
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Administrator => write!(f, "administrator"),
            UserRole::Editor => write!(f, "editor"),
            UserRole::Author => write!(f, "author"),
            UserRole::Subscriber => write!(f, "subscriber"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "administrator" => Ok(UserRole::Administrator),
            "editor" => Ok(UserRole::Editor),
            "author" => Ok(UserRole::Author),
            "subscriber" => Ok(UserRole::Subscriber),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Lowercase, dash-separated form of a name for URLs
pub(crate) fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            prev_dash = false;
        } else if !prev_dash && !out.is_empty() {
            out.push('-');
            prev_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
