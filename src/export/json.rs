//! JSON export writer
//!
//! Streams the directory as a single top-level JSON array: `[`, one record
//! per user separated by commas, `]` after the last batch. Each record is
//! sent through the channel as soon as it is serialized.

use crate::db::repositories::UserRepository;
use crate::export::{grouped_meta, user_batches, REGISTERED_FORMAT};
use crate::models::UserWithMeta;
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{pin_mut, StreamExt};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One export record as a JSON value.
///
/// Meta flattening: a key with a single stored value becomes that value;
/// multiple values become an array in stored order.
pub fn record_to_json(record: &UserWithMeta, include_hidden: bool) -> Value {
    let mut meta = Map::new();
    for (key, mut values) in grouped_meta(record, include_hidden) {
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        meta.insert(key, value);
    }

    json!({
        "id": record.user.id,
        "login": record.user.login,
        "nicename": record.user.nicename,
        "email": record.user.email,
        "display_name": record.user.display_name,
        "registered": record.user.registered_at.format(REGISTERED_FORMAT).to_string(),
        "roles": record.user.roles,
        "meta": Value::Object(meta),
    })
}

/// Write the full directory as a JSON array into the channel.
///
/// A closed channel (client gone) ends the writer without error.
pub async fn write_json(
    repo: Arc<dyn UserRepository>,
    page_size: i64,
    include_hidden: bool,
    tx: mpsc::Sender<Bytes>,
) -> Result<()> {
    if tx.send(Bytes::from_static(b"[")).await.is_err() {
        return Ok(());
    }

    let batches = user_batches(repo, page_size);
    pin_mut!(batches);

    let mut first = true;
    while let Some(batch) = batches.next().await {
        let batch = batch.context("Failed to fetch user batch")?;
        for record in &batch {
            let mut chunk = String::new();
            if !first {
                chunk.push(',');
            }
            first = false;
            chunk.push_str(
                &serde_json::to_string(&record_to_json(record, include_hidden))
                    .context("Failed to serialize export record")?,
            );
            if tx.send(Bytes::from(chunk)).await.is_err() {
                return Ok(());
            }
        }
    }

    if tx.send(Bytes::from_static(b"]")).await.is_err() {
        return Ok(());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::db::repositories::SqlxUserRepository;
    use crate::models::{User, UserRole};

    async fn setup_repo() -> Arc<dyn UserRepository> {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::boxed(pool)
    }

    async fn collect_output(
        repo: Arc<dyn UserRepository>,
        page_size: i64,
        include_hidden: bool,
    ) -> String {
        let (tx, mut rx) = mpsc::channel(16);
        let writer = tokio::spawn(write_json(repo, page_size, include_hidden, tx));

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

    #[tokio::test]
    async fn test_empty_directory_is_empty_array() {
        let repo = setup_repo().await;

        let out = collect_output(repo, 200, false).await;

        assert_eq!(out, "[]");
    }

    #[tokio::test]
    async fn test_records_have_base_fields() {
        let repo = setup_repo().await;
        repo.create(&User::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "hash".to_string(),
            vec![UserRole::Administrator, UserRole::Editor],
        ))
        .await
        .expect("Failed to create user");

        let out = collect_output(repo, 200, false).await;
        let parsed: Value = serde_json::from_str(&out).expect("invalid JSON");

        let records = parsed.as_array().expect("not an array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["login"], "alice");
        assert_eq!(records[0]["nicename"], "alice");
        assert_eq!(records[0]["roles"], json!(["administrator", "editor"]));
        assert!(records[0]["registered"].as_str().is_some());
        assert!(records[0]["meta"].is_object());
        assert!(records[0].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_single_meta_value_flattens() {
        let repo = setup_repo().await;
        let user = repo
            .create(&User::new(
                "bob".to_string(),
                "bob@example.com".to_string(),
                "hash".to_string(),
                vec![UserRole::Subscriber],
            ))
            .await
            .expect("Failed to create user");
        repo.add_meta(user.id, "nickname", "\"ace\"")
            .await
            .expect("Failed to add meta");

        let out = collect_output(repo, 200, false).await;
        let parsed: Value = serde_json::from_str(&out).expect("invalid JSON");

        assert_eq!(parsed[0]["meta"]["nickname"], "ace");
    }

    #[tokio::test]
    async fn test_repeated_meta_key_becomes_array() {
        let repo = setup_repo().await;
        let user = repo
            .create(&User::new(
                "carol".to_string(),
                "carol@example.com".to_string(),
                "hash".to_string(),
                vec![UserRole::Subscriber],
            ))
            .await
            .expect("Failed to create user");
        repo.add_meta(user.id, "color", "\"red\"")
            .await
            .expect("Failed to add meta");
        repo.add_meta(user.id, "color", "\"blue\"")
            .await
            .expect("Failed to add meta");

        let out = collect_output(repo, 200, false).await;
        let parsed: Value = serde_json::from_str(&out).expect("invalid JSON");

        assert_eq!(parsed[0]["meta"]["color"], json!(["red", "blue"]));
    }

    #[tokio::test]
    async fn test_hidden_keys_filtered_both_directions() {
        let repo = setup_repo().await;
        let user = repo
            .create(&User::new(
                "dave".to_string(),
                "dave@example.com".to_string(),
                "hash".to_string(),
                vec![UserRole::Subscriber],
            ))
            .await
            .expect("Failed to create user");
        repo.add_meta(user.id, "_internal", "\"secret\"")
            .await
            .expect("Failed to add meta");
        repo.add_meta(user.id, "public", "\"open\"")
            .await
            .expect("Failed to add meta");

        let out = collect_output(repo.clone(), 200, false).await;
        let parsed: Value = serde_json::from_str(&out).expect("invalid JSON");
        assert!(parsed[0]["meta"].get("_internal").is_none());
        assert_eq!(parsed[0]["meta"]["public"], "open");

        let out = collect_output(repo, 200, true).await;
        let parsed: Value = serde_json::from_str(&out).expect("invalid JSON");
        assert_eq!(parsed[0]["meta"]["_internal"], "secret");
    }

    #[tokio::test]
    async fn test_plain_string_meta_falls_back() {
        let repo = setup_repo().await;
        let user = repo
            .create(&User::new(
                "erin".to_string(),
                "erin@example.com".to_string(),
                "hash".to_string(),
                vec![UserRole::Subscriber],
            ))
            .await
            .expect("Failed to create user");
        // Not valid JSON, kept as a plain string
        repo.add_meta(user.id, "bio", "likes \"rust\"")
            .await
            .expect("Failed to add meta");

        let out = collect_output(repo, 200, false).await;
        let parsed: Value = serde_json::from_str(&out).expect("invalid JSON");

        assert_eq!(parsed[0]["meta"]["bio"], "likes \"rust\"");
    }

    #[tokio::test]
    async fn test_multiple_pages_one_array() {
        let repo = setup_repo().await;
        for i in 1..=3 {
            repo.create(&User::new(
                format!("user{}", i),
                format!("user{}@example.com", i),
                "hash".to_string(),
                vec![UserRole::Subscriber],
            ))
            .await
            .expect("Failed to create user");
        }

        let out = collect_output(repo, 2, false).await;
        let parsed: Value = serde_json::from_str(&out).expect("invalid JSON");

        assert_eq!(parsed.as_array().map(Vec::len), Some(3));
    }
}
