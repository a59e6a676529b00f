//! User export
//!
//! Streams the full user directory as JSON or CSV. Users are fetched in
//! fixed-size pages so an export never holds more than one page in memory
//! (plus, for CSV, the distinct meta-key set).
//!
//! The module is split into:
//! - `batch` - the lazy page-by-page user fetch stream
//! - `json` - the incremental JSON array writer
//! - `csv` - the two-pass CSV writer
//!
//! Programmatic extension points (filename and CSV-header hooks) live on
//! [`ExportConfig`]; the file-level knobs come from
//! [`crate::config::ExportSettings`].

pub mod batch;
pub mod csv;
pub mod json;

use crate::config::ExportSettings;
use crate::models::{UserRole, UserWithMeta};
use chrono::Utc;
use serde_json::Value;

pub use batch::user_batches;
pub use csv::write_csv;
pub use json::write_json;

/// Dispatch action name for the export endpoint
pub const EXPORT_ACTION: &str = "eum_export";

/// Meta keys starting with this prefix are internal and excluded from
/// exports unless explicitly requested
pub const HIDDEN_META_PREFIX: &str = "_";

/// The seven base columns every export record carries, in order
pub const BASE_COLUMNS: [&str; 7] = [
    "id",
    "login",
    "nicename",
    "email",
    "display_name",
    "registered",
    "roles",
];

/// Timestamp format for the `registered` column
pub const REGISTERED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rewrites the download filename before it is sent
pub type FilenameHook = Box<dyn Fn(String) -> String + Send + Sync>;

/// Rewrites the full CSV header list before it is written
pub type CsvHeadersHook = Box<dyn Fn(Vec<String>) -> Vec<String> + Send + Sync>;

/// Output format for an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// Normalize a submitted format value. Anything other than `csv`
    /// (case-insensitive) is JSON; unrecognized input is never an error.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("csv") {
            ExportFormat::Csv
        } else {
            ExportFormat::Json
        }
    }

    /// Response content type
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }

    /// File extension for the download filename
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Normalized options for one export run
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    /// Output format
    pub format: ExportFormat,
    /// Whether hidden-prefix meta keys are included
    pub include_hidden: bool,
}

impl ExportOptions {
    /// Build options from raw form values, silently defaulting.
    ///
    /// `include_hidden` follows checkbox semantics: an absent field or a
    /// falsy value means false.
    pub fn from_form(format: Option<&str>, include_hidden: Option<&str>) -> Self {
        Self {
            format: ExportFormat::parse(format.unwrap_or("")),
            include_hidden: include_hidden
                .map(|v| !matches!(v.trim(), "" | "0" | "false" | "no" | "off"))
                .unwrap_or(false),
        }
    }
}

/// Runtime export configuration.
///
/// Built from [`ExportSettings`] at startup; hooks are attached
/// programmatically and default to identity.
pub struct ExportConfig {
    /// Role required to run an export
    pub required_role: UserRole,
    /// Number of users fetched per batch
    pub page_size: i64,
    filename_hook: Option<FilenameHook>,
    csv_headers_hook: Option<CsvHeadersHook>,
}

impl ExportConfig {
    /// Build from file-level settings
    pub fn new(settings: &ExportSettings) -> Self {
        Self {
            required_role: settings.required_role,
            page_size: settings.page_size,
            filename_hook: None,
            csv_headers_hook: None,
        }
    }

    /// Attach a filename hook
    pub fn with_filename_hook(mut self, hook: FilenameHook) -> Self {
        self.filename_hook = Some(hook);
        self
    }

    /// Attach a CSV-header hook
    pub fn with_csv_headers_hook(mut self, hook: CsvHeadersHook) -> Self {
        self.csv_headers_hook = Some(hook);
        self
    }

    /// Download filename for an export started now, after the hook
    pub fn filename(&self, format: ExportFormat) -> String {
        let name = format!(
            "users-export-{}.{}",
            Utc::now().format("%Y-%m-%d_%H-%M-%S"),
            format.extension()
        );
        match &self.filename_hook {
            Some(hook) => hook(name),
            None => name,
        }
    }

    /// Apply the CSV-header hook, identity when none is attached
    pub fn apply_csv_headers_hook(&self, headers: Vec<String>) -> Vec<String> {
        match &self.csv_headers_hook {
            Some(hook) => hook(headers),
            None => headers,
        }
    }
}

/// Whether a meta key survives the hidden filter
pub fn key_visible(key: &str, include_hidden: bool) -> bool {
    include_hidden || !key.starts_with(HIDDEN_META_PREFIX)
}

/// Decode a stored meta value: JSON when it parses, plain string otherwise
pub fn decode_meta_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Group a user's meta rows by key, preserving first-seen key order and
/// stored value order within each key. Hidden keys are dropped per options.
pub fn grouped_meta(record: &UserWithMeta, include_hidden: bool) -> Vec<(String, Vec<Value>)> {
    let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
    for (key, raw) in &record.meta {
        if !key_visible(key, include_hidden) {
            continue;
        }
        match groups.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => values.push(decode_meta_value(raw)),
            None => groups.push((key.clone(), vec![decode_meta_value(raw)])),
        }
    }
    groups
}
