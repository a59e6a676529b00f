//! CSV export writer
//!
//! Two-pass: the first traversal collects the distinct meta keys in
//! first-seen order so the header is stable, the second streams the rows.
//! Two full traversals are the accepted cost of header stability; no
//! snapshot is taken between them.
//!
//! Every row has exactly as many cells as the header. A column whose key a
//! user lacks, or one invented by the header hook, yields an empty cell.

use crate::db::repositories::UserRepository;
use crate::export::{
    grouped_meta, user_batches, ExportConfig, BASE_COLUMNS, REGISTERED_FORMAT,
};
use crate::models::UserWithMeta;
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{pin_mut, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Write the full directory as CSV into the channel.
///
/// A closed channel (client gone) ends the writer without error.
pub async fn write_csv(
    repo: Arc<dyn UserRepository>,
    config: Arc<ExportConfig>,
    include_hidden: bool,
    tx: mpsc::Sender<Bytes>,
) -> Result<()> {
    // Pass 1: collect surviving meta keys in first-seen order
    let mut meta_keys: Vec<String> = Vec::new();
    {
        let batches = user_batches(repo.clone(), config.page_size);
        pin_mut!(batches);
        while let Some(batch) = batches.next().await {
            let batch = batch.context("Failed to fetch user batch")?;
            for record in &batch {
                for (key, _) in grouped_meta(record, include_hidden) {
                    if !meta_keys.contains(&key) {
                        meta_keys.push(key);
                    }
                }
            }
        }
    }

    let mut headers: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    headers.extend(meta_keys);
    let headers = config.apply_csv_headers_hook(headers);

    let header_row = format!(
        "{}\n",
        headers.iter().map(|h| csv_escape(h)).collect::<Vec<_>>().join(",")
    );
    if tx.send(Bytes::from(header_row)).await.is_err() {
        return Ok(());
    }

    // Pass 2: stream the rows
    let batches = user_batches(repo, config.page_size);
    pin_mut!(batches);
    while let Some(batch) = batches.next().await {
        let batch = batch.context("Failed to fetch user batch")?;
        for record in &batch {
            let cells: Vec<String> = headers
                .iter()
                .map(|column| csv_escape(&cell_value(record, column, include_hidden)))
                .collect();
            let row = format!("{}\n", cells.join(","));
            if tx.send(Bytes::from(row)).await.is_err() {
                return Ok(());
            }
        }
    }

    Ok(())
}

/// The cell for one header column. Base columns come from the user record;
/// anything else is looked up as a meta key.
fn cell_value(record: &UserWithMeta, column: &str, include_hidden: bool) -> String {
    match column {
        "id" => record.user.id.to_string(),
        "login" => record.user.login.clone(),
        "nicename" => record.user.nicename.clone(),
        "email" => record.user.email.clone(),
        "display_name" => record.user.display_name.clone(),
        "registered" => record.user.registered_at.format(REGISTERED_FORMAT).to_string(),
        "roles" => record.user.roles_joined(),
        key => meta_cell(record, key, include_hidden),
    }
}

/// Render the stored values for one meta key as a single cell.
///
/// A single plain string stays plain; a single structured value is
/// re-serialized compact; multiple values become a compact JSON array.
fn meta_cell(record: &UserWithMeta, key: &str, include_hidden: bool) -> String {
    let values: Vec<Value> = grouped_meta(record, include_hidden)
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
        .unwrap_or_default();

    match values.len() {
        0 => String::new(),
        1 => match &values[0] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        _ => Value::Array(values).to_string(),
    }
}

/// RFC-4180-style quoting: cells containing comma, quote, or newline are
/// wrapped in quotes with inner quotes doubled.
fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportSettings;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};

    async fn setup_repo() -> Arc<dyn UserRepository> {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::boxed(pool)
    }

    fn config_with_page_size(page_size: i64) -> Arc<ExportConfig> {
        Arc::new(ExportConfig::new(&ExportSettings {
            page_size,
            required_role: UserRole::Administrator,
        }))
    }

    async fn collect_output(
        repo: Arc<dyn UserRepository>,
        config: Arc<ExportConfig>,
        include_hidden: bool,
    ) -> String {
        let (tx, mut rx) = mpsc::channel(16);
        let writer = tokio::spawn(write_csv(repo, config, include_hidden, tx));

        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            out.extend_from_slice(&chunk);
        }
        writer
            .await
            .expect("writer task panicked")
            .expect("writer failed");
        String::from_utf8(out).expect("output not UTF-8")
    }

    /// Parse one CSV line into cells, honoring quoting
    fn parse_line(line: &str) -> Vec<String> {
        let mut cells = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                }
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => {
                    cells.push(std::mem::take(&mut current));
                }
                c => current.push(c),
            }
        }
        cells.push(current);
        cells
    }

    async fn add_user(repo: &Arc<dyn UserRepository>, login: &str) -> User {
        repo.create(&User::new(
            login.to_string(),
            format!("{}@example.com", login),
            "hash".to_string(),
            vec![UserRole::Subscriber],
        ))
        .await
        .expect("Failed to create user")
    }

    #[tokio::test]
    async fn test_empty_directory_header_only() {
        let repo = setup_repo().await;

        let out = collect_output(repo, config_with_page_size(200), false).await;

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            "id,login,nicename,email,display_name,registered,roles"
        );
    }

    #[tokio::test]
    async fn test_row_width_equals_header_width() {
        let repo = setup_repo().await;
        let alice = add_user(&repo, "alice").await;
        repo.add_meta(alice.id, "nickname", "\"ace\"")
            .await
            .expect("Failed to add meta");
        add_user(&repo, "bob").await;

        let out = collect_output(repo, config_with_page_size(200), false).await;

        let lines: Vec<&str> = out.lines().collect();
        let width = parse_line(lines[0]).len();
        assert_eq!(width, 8);
        for line in &lines[1..] {
            assert_eq!(parse_line(line).len(), width);
        }
        // Bob lacks the key, his cell is empty
        let bob_row = parse_line(lines[2]);
        assert_eq!(bob_row[7], "");
    }

    #[tokio::test]
    async fn test_row_width_across_page_boundary() {
        let repo = setup_repo().await;
        for i in 1..=5 {
            let user = add_user(&repo, &format!("user{}", i)).await;
            if i == 5 {
                repo.add_meta(user.id, "last", "\"yes\"")
                    .await
                    .expect("Failed to add meta");
            }
        }

        // 5 users at page size 2 spans three batches
        let out = collect_output(repo, config_with_page_size(2), false).await;

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 6);
        let width = parse_line(lines[0]).len();
        for line in &lines[1..] {
            assert_eq!(parse_line(line).len(), width);
        }
    }

    #[tokio::test]
    async fn test_repeated_key_cell_is_compact_array() {
        let repo = setup_repo().await;
        let user = add_user(&repo, "carol").await;
        repo.add_meta(user.id, "color", "\"red\"")
            .await
            .expect("Failed to add meta");
        repo.add_meta(user.id, "color", "\"blue\"")
            .await
            .expect("Failed to add meta");

        let out = collect_output(repo, config_with_page_size(200), false).await;

        let lines: Vec<&str> = out.lines().collect();
        let row = parse_line(lines[1]);
        assert_eq!(row[7], r#"["red","blue"]"#);
    }

    #[tokio::test]
    async fn test_single_structured_value_reserialized_compact() {
        let repo = setup_repo().await;
        let user = add_user(&repo, "dave").await;
        repo.add_meta(user.id, "prefs", r#"{"theme": "dark"}"#)
            .await
            .expect("Failed to add meta");

        let out = collect_output(repo, config_with_page_size(200), false).await;

        let lines: Vec<&str> = out.lines().collect();
        let row = parse_line(lines[1]);
        assert_eq!(row[7], r#"{"theme":"dark"}"#);
    }

    #[tokio::test]
    async fn test_hidden_keys_excluded_from_header() {
        let repo = setup_repo().await;
        let user = add_user(&repo, "erin").await;
        repo.add_meta(user.id, "_internal", "\"x\"")
            .await
            .expect("Failed to add meta");

        let out = collect_output(repo.clone(), config_with_page_size(200), false).await;
        assert!(!out.contains("_internal"));

        let out = collect_output(repo, config_with_page_size(200), true).await;
        assert!(parse_line(out.lines().next().unwrap()).contains(&"_internal".to_string()));
    }

    #[tokio::test]
    async fn test_roles_joined_with_pipe() {
        let repo = setup_repo().await;
        repo.create(&User::new(
            "frank".to_string(),
            "frank@example.com".to_string(),
            "hash".to_string(),
            vec![UserRole::Administrator, UserRole::Editor],
        ))
        .await
        .expect("Failed to create user");

        let out = collect_output(repo, config_with_page_size(200), false).await;

        let row = parse_line(out.lines().nth(1).unwrap());
        assert_eq!(row[6], "administrator|editor");
    }

    #[tokio::test]
    async fn test_header_hook_invented_column_yields_empty_cells() {
        let repo = setup_repo().await;
        add_user(&repo, "grace").await;

        let config = Arc::new(
            ExportConfig::new(&ExportSettings {
                page_size: 200,
                required_role: UserRole::Administrator,
            })
            .with_csv_headers_hook(Box::new(|mut headers| {
                headers.push("invented".to_string());
                headers
            })),
        );
        let out = collect_output(repo, config, false).await;

        let lines: Vec<&str> = out.lines().collect();
        let header = parse_line(lines[0]);
        assert_eq!(header.last().map(String::as_str), Some("invented"));
        let row = parse_line(lines[1]);
        assert_eq!(row.len(), header.len());
        assert_eq!(row.last().map(String::as_str), Some(""));
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }
}
