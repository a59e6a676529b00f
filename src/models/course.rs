//! Course model
//!
//! This module provides:
//! - `Course` entity representing a catalog course
//! - `CourseLevel` enum for the difficulty metadata field
//! - Input types for creating and updating courses
//!
//! Duration and level are *metadata*: they live in `course_meta` rows under
//! the keys below and are only ever written through the validated save path.
//! An unset field has no row at all; it is never stored as an empty string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata key for the duration (hours) field
pub const META_DURATION: &str = "_courses_duration";

/// Metadata key for the level field
pub const META_LEVEL: &str = "_courses_level";

/// Course entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier
    pub id: i64,
    /// URL-friendly slug
    pub slug: String,
    /// Course title
    pub title: String,
    /// Course body content
    pub body: String,
    /// Thumbnail image URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Author user ID
    pub author_id: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Create a new course with the given parameters
    pub fn new(slug: String, title: String, body: String, author_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by database
            slug,
            title,
            body,
            thumbnail: None,
            author_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Permanent URL for this course
    pub fn permalink(&self) -> String {
        format!("/courses/{}", self.slug)
    }
}

/// Course difficulty level
///
/// `Unset` is the absence of the metadata row, not a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    /// No level assigned
    #[default]
    Unset,
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    /// Stored string representation; `Unset` has none
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseLevel::Unset => "",
            CourseLevel::Beginner => "beginner",
            CourseLevel::Intermediate => "intermediate",
            CourseLevel::Advanced => "advanced",
        }
    }

    /// Parse a stored or submitted value; unknown strings map to `Unset`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "beginner" => CourseLevel::Beginner,
            "intermediate" => CourseLevel::Intermediate,
            "advanced" => CourseLevel::Advanced,
            _ => CourseLevel::Unset,
        }
    }

    /// Display form with the first letter capitalized, for listings
    pub fn capitalized(&self) -> &'static str {
        match self {
            CourseLevel::Unset => "",
            CourseLevel::Beginner => "Beginner",
            CourseLevel::Intermediate => "Intermediate",
            CourseLevel::Advanced => "Advanced",
        }
    }
}

impl std::fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for creating a new course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseInput {
    /// URL-friendly slug
    pub slug: String,
    /// Course title
    pub title: String,
    /// Course body content
    pub body: String,
    /// Thumbnail image URL (optional)
    pub thumbnail: Option<String>,
    /// Author user ID
    pub author_id: i64,
    /// Category IDs to assign
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

/// Input for updating an existing course
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCourseInput {
    /// New slug (optional)
    pub slug: Option<String>,
    /// New title (optional)
    pub title: Option<String>,
    /// New body (optional)
    pub body: Option<String>,
    /// New thumbnail URL (optional)
    pub thumbnail: Option<String>,
    /// New category assignments (optional; replaces the set)
    pub category_ids: Option<Vec<i64>>,
    /// Metadata portion of the save form
    #[serde(default)]
    pub meta: CourseMetaForm,
}

/// The metadata portion of a course save form.
///
/// `duration`/`level` being `None` means the field was absent from the form,
/// which deletes the stored row. `Some("")` is a present-but-empty field and
/// is stored after sanitization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseMetaForm {
    /// Anti-forgery token for the save action
    pub nonce: Option<String>,
    /// Whether this save is an autosave pass (skipped entirely)
    #[serde(default)]
    pub autosave: bool,
    /// Submitted duration value
    pub duration: Option<String>,
    /// Submitted level value
    pub level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_new() {
        let course = Course::new(
            "intro-to-rust".to_string(),
            "Intro to Rust".to_string(),
            "Welcome!".to_string(),
            1,
        );

        assert_eq!(course.id, 0);
        assert_eq!(course.slug, "intro-to-rust");
        assert_eq!(course.title, "Intro to Rust");
        assert!(course.thumbnail.is_none());
    }

    #[test]
    fn test_permalink() {
        let course = Course::new("abc".to_string(), "t".to_string(), "b".to_string(), 1);
        assert_eq!(course.permalink(), "/courses/abc");
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(CourseLevel::parse("beginner"), CourseLevel::Beginner);
        assert_eq!(CourseLevel::parse("ADVANCED"), CourseLevel::Advanced);
        assert_eq!(CourseLevel::parse(""), CourseLevel::Unset);
        assert_eq!(CourseLevel::parse("expert"), CourseLevel::Unset);
    }

    #[test]
    fn test_level_round_trip() {
        for level in [
            CourseLevel::Beginner,
            CourseLevel::Intermediate,
            CourseLevel::Advanced,
        ] {
            assert_eq!(CourseLevel::parse(level.as_str()), level);
        }
    }

    #[test]
    fn test_level_capitalized() {
        assert_eq!(CourseLevel::Intermediate.capitalized(), "Intermediate");
        assert_eq!(CourseLevel::Unset.capitalized(), "");
    }
}
