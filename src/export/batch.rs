//! Batched user fetch
//!
//! A lazy, finite stream of user pages. Each step fetches the next page
//! with metadata attached and the stream ends on the first empty page, so
//! peak memory is bounded by one page regardless of directory size.
//!
//! The stream is not restartable and takes no snapshot: two traversals
//! (as the CSV writer does) may observe different directories under
//! concurrent mutation.

use crate::db::repositories::UserRepository;
use crate::models::UserWithMeta;
use anyhow::Result;
use async_stream::try_stream;
use futures::Stream;
use std::sync::Arc;

/// Stream the user directory one page at a time, in id order.
pub fn user_batches(
    repo: Arc<dyn UserRepository>,
    page_size: i64,
) -> impl Stream<Item = Result<Vec<UserWithMeta>>> {
    try_stream! {
        let mut page = 1;
        loop {
            let batch = repo.list_export_page(page, page_size).await?;
            if batch.is_empty() {
                break;
            }
            yield batch;
            page += 1;
        }
    }
}
