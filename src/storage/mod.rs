//! Object store side of the sync
//!
//! [`ObjectStore`] is the narrow contract the engine needs. [`S3Store`] speaks
//! the S3 REST API, [`MemoryStore`] keeps everything in process.

pub mod listing;
pub mod memory;
pub mod s3;
pub mod sigv4;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{SyncError, SyncResult};
use crate::remote::ByteStream;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// One page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub keys: Vec<String>,
    /// Cursor for the next page; `None` once the listing is exhausted
    pub next_token: Option<String>,
}

/// Result of a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    AlreadyExists,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of keys under `prefix` (delimited by `/`)
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> SyncResult<Page>;

    async fn get_object(&self, bucket: &str, key: &str) -> SyncResult<ByteStream>;

    async fn object_exists(&self, bucket: &str, key: &str) -> SyncResult<bool>;

    /// Unconditional write
    async fn put_object(&self, bucket: &str, key: &str, data: ByteStream) -> SyncResult<()>;

    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> SyncResult<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> SyncResult<()>;

    /// Existence check followed by a write. Not atomic against a concurrent
    /// writer of the same key.
    async fn put_object_if_absent(
        &self,
        bucket: &str,
        key: &str,
        data: ByteStream,
    ) -> SyncResult<PutOutcome> {
        if self.object_exists(bucket, key).await? {
            return Ok(PutOutcome::AlreadyExists);
        }
        self.put_object(bucket, key, data).await?;
        Ok(PutOutcome::Written)
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily list every key under `prefix/`, following continuation tokens.
///
/// The stream is one-shot; ordering is whatever the store returns.
pub fn list_by_prefix<'a>(
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    prefix: &str,
) -> BoxStream<'a, SyncResult<String>> {
    let listing_prefix = format!("{}/", prefix.trim_end_matches('/'));

    stream::try_unfold(Cursor::Start, move |cursor| {
        let listing_prefix = listing_prefix.clone();
        async move {
            let token = match cursor {
                Cursor::Start => None,
                Cursor::Next(token) => Some(token),
                Cursor::Done => return Ok::<_, SyncError>(None),
            };
            let page = store
                .list_page(bucket, &listing_prefix, token.as_deref())
                .await?;
            let next = match page.next_token {
                Some(token) => Cursor::Next(token),
                None => Cursor::Done,
            };
            let keys = stream::iter(page.keys.into_iter().map(Ok::<_, SyncError>));
            Ok::<_, SyncError>(Some((keys, next)))
        }
    })
    .try_flatten()
    .boxed()
}

/// Logical filename of a key: everything after the last `/`
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Move `key` from under `from` to under `to`, keeping the rest of the key.
///
/// Returns `None` when `key` doesn't start with `from`.
pub fn relocated_key(key: &str, from: &str, to: &str) -> Option<String> {
    key.strip_prefix(from).map(|rest| format!("{to}{rest}"))
}
