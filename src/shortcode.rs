//! Shortcode parser and renderers
//!
//! Parses and renders shortcodes like [name attr="value"]content[/name].
//!
//! The parser is synchronous and data-free; handlers that need database
//! access (like the course listing) are rendered from prefetched data by
//! the service layer, which then substitutes the original shortcode text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Course, CourseCategory, CourseLevel};

/// Shortcode name of the course listing directive
pub const COURSES_LIST: &str = "courses_list";

/// Default entry count for `[courses_list]` when `posts_per_page` is absent
pub const DEFAULT_POSTS_PER_PAGE: i64 = 5;

/// Parsed shortcode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortcode {
    /// Shortcode name
    pub name: String,
    /// Attributes
    pub attrs: HashMap<String, String>,
    /// Inner content (between opening and closing tags)
    pub content: String,
    /// Original matched string
    pub original: String,
}

impl Shortcode {
    /// Resolve the `posts_per_page` attribute.
    ///
    /// An absent attribute means the default; a present but non-numeric
    /// value coerces to 0, which renders the empty notice.
    pub fn posts_per_page(&self) -> i64 {
        match self.attrs.get("posts_per_page") {
            None => DEFAULT_POSTS_PER_PAGE,
            Some(raw) => raw.trim().parse::<i64>().unwrap_or(0).max(0),
        }
    }
}

/// Shortcode handler function type
pub type ShortcodeHandler = Box<dyn Fn(&Shortcode) -> String + Send + Sync>;

/// Shortcode manager
pub struct ShortcodeManager {
    /// Registered handlers (name -> handler)
    handlers: HashMap<String, ShortcodeHandler>,
}

impl Default for ShortcodeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShortcodeManager {
    /// Create a new shortcode manager
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a shortcode handler
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&Shortcode) -> String + Send + Sync + 'static,
    {
        debug!("Registered shortcode: [{}]", name);
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    /// Unregister a shortcode handler
    pub fn unregister(&mut self, name: &str) {
        self.handlers.remove(name);
    }

    /// Check if a shortcode is registered
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Parse shortcodes from content
    pub fn parse(&self, content: &str) -> Vec<Shortcode> {
        let mut shortcodes = Vec::new();
        let chars: Vec<char> = content.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            if chars[i] == '[' {
                if let Some((shortcode, end_pos)) = self.parse_shortcode_at(&chars, i) {
                    shortcodes.push(shortcode);
                    i = end_pos;
                    continue;
                }
            }
            i += 1;
        }

        shortcodes
    }

    /// Try to parse a shortcode starting at position
    fn parse_shortcode_at(&self, chars: &[char], start: usize) -> Option<(Shortcode, usize)> {
        let len = chars.len();
        if start >= len || chars[start] != '[' {
            return None;
        }

        let mut i = start + 1;

        // Skip whitespace
        while i < len && chars[i].is_whitespace() {
            i += 1;
        }

        // Parse name
        let name_start = i;
        while i < len && (chars[i].is_alphanumeric() || chars[i] == '-' || chars[i] == '_') {
            i += 1;
        }

        if i == name_start {
            return None; // No name found
        }

        let name: String = chars[name_start..i].iter().collect();

        // Parse attributes until ] or /]
        let mut attrs = HashMap::new();
        let mut is_self_closing = false;

        while i < len && chars[i] != ']' {
            while i < len && chars[i].is_whitespace() {
                i += 1;
            }

            if i >= len {
                return None;
            }

            if chars[i] == '/' {
                is_self_closing = true;
                i += 1;
                continue;
            }

            if chars[i] == ']' {
                break;
            }

            // Parse attribute name
            let attr_name_start = i;
            while i < len && (chars[i].is_alphanumeric() || chars[i] == '-' || chars[i] == '_') {
                i += 1;
            }

            if i == attr_name_start {
                i += 1; // Skip unknown char
                continue;
            }

            let attr_name: String = chars[attr_name_start..i].iter().collect();

            // Skip whitespace and =
            while i < len && (chars[i].is_whitespace() || chars[i] == '=') {
                i += 1;
            }

            // Parse attribute value (quoted)
            if i < len && (chars[i] == '"' || chars[i] == '\'') {
                let quote = chars[i];
                i += 1;
                let value_start = i;
                while i < len && chars[i] != quote {
                    i += 1;
                }
                let attr_value: String = chars[value_start..i].iter().collect();
                attrs.insert(attr_name, attr_value);
                if i < len {
                    i += 1; // Skip closing quote
                }
            }
        }

        if i >= len {
            return None;
        }

        i += 1; // Skip ]

        let opening_tag_end = i;

        if is_self_closing {
            let original: String = chars[start..opening_tag_end].iter().collect();
            return Some((
                Shortcode {
                    name,
                    attrs,
                    content: String::new(),
                    original,
                },
                opening_tag_end,
            ));
        }

        // Find closing tag [/name]
        let closing_tag = format!("[/{}]", name);
        let content_start = i;

        while i < len {
            if chars[i] == '[' && chars.get(i + 1) == Some(&'/') {
                let remaining: String = chars[i..].iter().collect();
                if remaining.starts_with(&closing_tag) {
                    let content: String = chars[content_start..i].iter().collect();
                    let end_pos = i + closing_tag.len();
                    let original: String = chars[start..end_pos].iter().collect();

                    return Some((
                        Shortcode {
                            name,
                            attrs,
                            content,
                            original,
                        },
                        end_pos,
                    ));
                }
            }
            i += 1;
        }

        // No closing tag means the token is plain text, not a shortcode
        None
    }

    /// Render all shortcodes in content.
    ///
    /// Unregistered shortcodes are left as-is.
    pub fn render(&self, content: &str) -> String {
        let mut result = content.to_string();
        let shortcodes = self.parse(content);

        for shortcode in shortcodes {
            if let Some(handler) = self.handlers.get(&shortcode.name) {
                let rendered = handler(&shortcode);
                result = result.replace(&shortcode.original, &rendered);
            }
        }

        result
    }
}

/// One course with the extras the listing renders
#[derive(Debug, Clone)]
pub struct CourseListEntry {
    pub course: Course,
    /// Stored duration in hours, absent when the meta row is absent
    pub duration: Option<String>,
    /// Parsed level; `Unset` when the meta row is absent
    pub level: CourseLevel,
    pub categories: Vec<CourseCategory>,
}

/// Render the `[courses_list]` listing from prefetched entries.
///
/// Titles, durations and category names are escaped; the anchor markup
/// itself is trusted. Zero entries render the notice instead of an empty
/// list.
pub fn render_courses_list(entries: &[CourseListEntry]) -> String {
    if entries.is_empty() {
        return "<p>No courses found.</p>".to_string();
    }

    let mut out = String::from("<ul class=\"courses-list\">\n");

    for entry in entries {
        out.push_str("<li>");
        out.push_str(&format!(
            "<a href=\"{}\">{}</a>",
            entry.course.permalink(),
            html_escape(&entry.course.title)
        ));

        if let Some(duration) = &entry.duration {
            out.push_str(&format!(" — {}h", html_escape(duration)));
        }

        if entry.level != CourseLevel::Unset {
            out.push_str(&format!(" ({})", entry.level.capitalized()));
        }

        if !entry.categories.is_empty() {
            let links: Vec<String> = entry.categories.iter().map(|c| c.link_html()).collect();
            out.push_str(" in ");
            out.push_str(&links.join(", "));
        }

        out.push_str("</li>\n");
    }

    out.push_str("</ul>");
    out
}

/// HTML escape helper
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(title: &str, slug: &str) -> CourseListEntry {
        CourseListEntry {
            course: Course::new(slug.to_string(), title.to_string(), String::new(), 1),
            duration: None,
            level: CourseLevel::Unset,
            categories: Vec::new(),
        }
    }

    fn category(slug: &str, name: &str) -> CourseCategory {
        CourseCategory {
            id: 1,
            slug: slug.to_string(),
            name: name.to_string(),
            parent_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_shortcode() {
        let manager = ShortcodeManager::new();
        let content = r#"Hello [courses_list posts_per_page="3"]ignored[/courses_list] world"#;
        let shortcodes = manager.parse(content);

        assert_eq!(shortcodes.len(), 1);
        assert_eq!(shortcodes[0].name, "courses_list");
        assert_eq!(
            shortcodes[0].attrs.get("posts_per_page"),
            Some(&"3".to_string())
        );
    }

    #[test]
    fn test_parse_self_closing() {
        let manager = ShortcodeManager::new();
        let content = r#"Courses: [courses_list posts_per_page="10" /] done"#;
        let shortcodes = manager.parse(content);

        assert_eq!(shortcodes.len(), 1);
        assert_eq!(shortcodes[0].name, "courses_list");
        assert!(shortcodes[0].content.is_empty());
    }

    #[test]
    fn test_unclosed_shortcode_is_plain_text() {
        let manager = ShortcodeManager::new();
        let shortcodes = manager.parse("[courses_list]never closed");

        assert!(shortcodes.is_empty());
    }

    #[test]
    fn test_render_substitutes_registered_handlers() {
        let mut manager = ShortcodeManager::new();
        manager.register("upper", |sc| sc.content.to_uppercase());

        let result = manager.render("Hello [upper]world[/upper]!");

        assert_eq!(result, "Hello WORLD!");
    }

    #[test]
    fn test_render_leaves_unknown_shortcodes() {
        let manager = ShortcodeManager::new();
        let content = "Hello [mystery]x[/mystery]";

        assert_eq!(manager.render(content), content);
    }

    #[test]
    fn test_posts_per_page_default_and_coercion() {
        let manager = ShortcodeManager::new();

        let absent = &manager.parse("[courses_list /]")[0];
        assert_eq!(absent.posts_per_page(), DEFAULT_POSTS_PER_PAGE);

        let valid = &manager.parse(r#"[courses_list posts_per_page="12" /]"#)[0];
        assert_eq!(valid.posts_per_page(), 12);

        let invalid = &manager.parse(r#"[courses_list posts_per_page="lots" /]"#)[0];
        assert_eq!(invalid.posts_per_page(), 0);

        let negative = &manager.parse(r#"[courses_list posts_per_page="-3" /]"#)[0];
        assert_eq!(negative.posts_per_page(), 0);
    }

    #[test]
    fn test_render_courses_list_empty_notice() {
        assert_eq!(render_courses_list(&[]), "<p>No courses found.</p>");
    }

    #[test]
    fn test_render_courses_list_title_link_only() {
        let html = render_courses_list(&[entry("Intro to Rust", "intro-rust")]);

        assert!(html.contains(r#"<li><a href="/courses/intro-rust">Intro to Rust</a></li>"#));
        assert!(!html.contains(" — "));
        assert!(!html.contains(" in "));
    }

    #[test]
    fn test_render_courses_list_full_entry() {
        let mut e = entry("Web Basics", "web-basics");
        e.duration = Some("8".to_string());
        e.level = CourseLevel::Beginner;
        e.categories = vec![category("web", "Web")];

        let html = render_courses_list(&[e]);

        assert!(html.contains(
            r#"<a href="/courses/web-basics">Web Basics</a> — 8h (Beginner) in <a href="/course-category/web">Web</a>"#
        ));
    }

    #[test]
    fn test_render_courses_list_multiple_categories_comma_joined() {
        let mut e = entry("Multi", "multi");
        e.categories = vec![category("a", "Alpha"), category("b", "Beta")];

        let html = render_courses_list(&[e]);

        assert!(html.contains(
            r#" in <a href="/course-category/a">Alpha</a>, <a href="/course-category/b">Beta</a>"#
        ));
    }

    #[test]
    fn test_render_courses_list_escapes_title() {
        let html = render_courses_list(&[entry("Tags <b> & \"quotes\"", "tags")]);

        assert!(html.contains("Tags &lt;b&gt; &amp; &quot;quotes&quot;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }
}
