//! Content type registration
//!
//! Descriptors for the course content type and its category taxonomy.
//! These drive URL generation and the public API surface: the identifiers
//! and rewrite slugs here are the single source of truth for both.

use serde::Serialize;

/// Identifier of the course content type
pub const COURSE_TYPE: &str = "course";

/// Identifier of the course category taxonomy
pub const COURSE_CATEGORY_TAXONOMY: &str = "course_category";

/// Describes a registered content type
#[derive(Debug, Clone, Serialize)]
pub struct ContentType {
    /// Stable identifier
    pub identifier: &'static str,
    /// Singular display name
    pub singular_name: &'static str,
    /// Plural display name
    pub plural_name: &'static str,
    /// URL path segment for permalinks
    pub rewrite_slug: &'static str,
    /// Whether items are publicly browsable
    pub public: bool,
    /// Whether items appear in the public API
    pub show_in_api: bool,
    /// Whether items can be assigned taxonomy terms
    pub hierarchical_terms: bool,
}

/// Describes a registered taxonomy
#[derive(Debug, Clone, Serialize)]
pub struct Taxonomy {
    /// Stable identifier
    pub identifier: &'static str,
    /// Singular display name
    pub singular_name: &'static str,
    /// Plural display name
    pub plural_name: &'static str,
    /// URL path segment for term permalinks
    pub rewrite_slug: &'static str,
    /// Content type this taxonomy attaches to
    pub content_type: &'static str,
    /// Whether terms form a parent/child hierarchy
    pub hierarchical: bool,
    /// Whether terms appear in the public API
    pub show_in_api: bool,
}

/// The course content type
pub fn course_content_type() -> ContentType {
    ContentType {
        identifier: COURSE_TYPE,
        singular_name: "Course",
        plural_name: "Courses",
        rewrite_slug: "courses",
        public: true,
        show_in_api: true,
        hierarchical_terms: true,
    }
}

/// The course category taxonomy
pub fn course_category_taxonomy() -> Taxonomy {
    Taxonomy {
        identifier: COURSE_CATEGORY_TAXONOMY,
        singular_name: "Course Category",
        plural_name: "Course Categories",
        rewrite_slug: "course-category",
        content_type: COURSE_TYPE,
        hierarchical: true,
        show_in_api: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_content_type() {
        let ct = course_content_type();
        assert_eq!(ct.identifier, "course");
        assert_eq!(ct.rewrite_slug, "courses");
        assert!(ct.public);
        assert!(ct.show_in_api);
    }

    #[test]
    fn test_course_category_taxonomy() {
        let tax = course_category_taxonomy();
        assert_eq!(tax.identifier, "course_category");
        assert_eq!(tax.rewrite_slug, "course-category");
        assert_eq!(tax.content_type, "course");
        assert!(tax.hierarchical);
    }

    #[test]
    fn test_permalinks_use_rewrite_slug() {
        let course = crate::models::Course::new(
            "intro".to_string(),
            "Intro".to_string(),
            "Body".to_string(),
            1,
        );
        assert!(course
            .permalink()
            .starts_with(&format!("/{}/", course_content_type().rewrite_slug)));
    }
}
