//! Course category model
//!
//! This module defines the `course_category` taxonomy terms. The taxonomy is
//! hierarchical: terms may have a parent, forming a tree, and are assigned to
//! courses many-to-many.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A term of the `course_category` taxonomy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseCategory {
    /// Unique identifier
    pub id: i64,
    /// URL-friendly slug
    pub slug: String,
    /// Term name
    pub name: String,
    /// Parent term ID (for hierarchical structure)
    pub parent_id: Option<i64>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl CourseCategory {
    /// Create a new term with the given parameters
    pub fn new(slug: String, name: String, parent_id: Option<i64>) -> Self {
        Self {
            id: 0, // Will be set by the database
            slug,
            name,
            parent_id,
            created_at: Utc::now(),
        }
    }

    /// Check if this is a root term (no parent)
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Archive URL for this term
    pub fn permalink(&self) -> String {
        format!("/course-category/{}", self.slug)
    }

    /// Anchor linking to the term archive, name HTML-escaped
    pub fn link_html(&self) -> String {
        format!(
            r#"<a href="{}">{}</a>"#,
            self.permalink(),
            crate::shortcode::html_escape(&self.name)
        )
    }
}

/// Category term with its children for tree representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTree {
    /// The term itself
    #[serde(flatten)]
    pub category: CourseCategory,
    /// Child terms
    pub children: Vec<CategoryTree>,
}

impl CategoryTree {
    /// Create a new CategoryTree from a term with no children
    pub fn new(category: CourseCategory) -> Self {
        Self {
            category,
            children: Vec::new(),
        }
    }

    /// Create a CategoryTree with children
    pub fn with_children(category: CourseCategory, children: Vec<CategoryTree>) -> Self {
        Self { category, children }
    }

    /// Get the total count of this term and all descendants
    pub fn total_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.total_count()).sum::<usize>()
    }
}
