//! In-process object store
//!
//! Behaves like a delimited S3 listing: keys are returned in lexicographic
//! order, nested "directories" below the prefix are not descended into, and a
//! key equal to the prefix itself (a prefix marker) is returned like any other.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use tokio::io::AsyncReadExt;

use super::{ObjectStore, Page};
use crate::error::{SyncError, SyncResult};
use crate::remote::ByteStream;

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Default)]
struct State {
    objects: BTreeMap<(String, String), Vec<u8>>,
    failures: HashSet<(&'static str, String)>,
    vanishing: HashSet<String>,
    list_calls: usize,
}

pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: page_size.max(1),
        }
    }

    pub fn insert(&self, bucket: &str, key: &str, content: Vec<u8>) {
        self.state
            .lock()
            .objects
            .insert((bucket.to_string(), key.to_string()), content);
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.state
            .lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Make the next `op` ("get", "put", "copy", "delete") on `key` fail once
    pub fn fail_next(&self, op: &'static str, key: &str) {
        self.state.lock().failures.insert((op, key.to_string()));
    }

    /// Drop `key` just before the next `get_object` on it, as if another
    /// client deleted it after it was listed
    pub fn vanish_before_get(&self, key: &str) {
        self.state.lock().vanishing.insert(key.to_string());
    }

    /// Number of page requests served so far
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    fn check_failure(&self, op: &'static str, key: &str) -> SyncResult<()> {
        if self.state.lock().failures.remove(&(op, key.to_string())) {
            return Err(SyncError::store(op, key, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> SyncResult<Page> {
        let mut state = self.state.lock();
        state.list_calls += 1;

        let mut keys: Vec<String> = state
            .objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .filter(|(_, k)| !k[prefix.len()..].contains('/'))
            .filter(|(_, k)| token.map_or(true, |after| k.as_str() > after))
            .map(|(_, k)| k.clone())
            .take(self.page_size + 1)
            .collect();

        let next_token = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };
        Ok(Page { keys, next_token })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> SyncResult<ByteStream> {
        self.check_failure("get", key)?;
        {
            let mut state = self.state.lock();
            if state.vanishing.remove(key) {
                state.objects.remove(&(bucket.to_string(), key.to_string()));
            }
        }
        match self.get(bucket, key) {
            Some(content) => Ok(Box::pin(Cursor::new(content))),
            None => Err(SyncError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> SyncResult<bool> {
        Ok(self.get(bucket, key).is_some())
    }

    async fn put_object(&self, bucket: &str, key: &str, mut data: ByteStream) -> SyncResult<()> {
        self.check_failure("put", key)?;
        let mut content = Vec::new();
        data.read_to_end(&mut content)
            .await
            .map_err(|e| SyncError::store("put", key, e))?;
        self.insert(bucket, key, content);
        Ok(())
    }

    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> SyncResult<()> {
        self.check_failure("copy", src_key)?;
        let content = self.get(bucket, src_key).ok_or_else(|| SyncError::NotFound {
            key: src_key.to_string(),
        })?;
        self.insert(bucket, dst_key, content);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> SyncResult<()> {
        self.check_failure("delete", key)?;
        self.state
            .lock()
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PutOutcome;

    #[tokio::test]
    async fn test_delimited_listing_includes_marker() {
        let store = MemoryStore::new();
        store.insert("B", "incoming/", vec![]);
        store.insert("B", "incoming/a.csv", b"a".to_vec());
        store.insert("B", "incoming/nested/b.csv", b"b".to_vec());

        let page = store.list_page("B", "incoming/", None).await.unwrap();
        assert_eq!(page.keys, vec!["incoming/", "incoming/a.csv"]);
        assert_eq!(page.next_token, None);
    }

    #[tokio::test]
    async fn test_put_if_absent() {
        let store = MemoryStore::new();
        let first = store
            .put_object_if_absent("B", "/drop/a.txt", Box::pin(Cursor::new(b"one".to_vec())))
            .await
            .unwrap();
        let second = store
            .put_object_if_absent("B", "/drop/a.txt", Box::pin(Cursor::new(b"two".to_vec())))
            .await
            .unwrap();
        assert_eq!(first, PutOutcome::Written);
        assert_eq!(second, PutOutcome::AlreadyExists);
        assert_eq!(store.get("B", "/drop/a.txt").unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let store = MemoryStore::new();
        store.insert("B", "incoming/a.csv", b"a".to_vec());
        store.fail_next("copy", "incoming/a.csv");

        assert!(store.copy_object("B", "incoming/a.csv", "sent/a.csv").await.is_err());
        store.copy_object("B", "incoming/a.csv", "sent/a.csv").await.unwrap();
        assert_eq!(store.get("B", "sent/a.csv").unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_vanished_object_is_not_found() {
        let store = MemoryStore::new();
        store.insert("B", "incoming/a.csv", b"a".to_vec());
        store.vanish_before_get("incoming/a.csv");

        let page = store.list_page("B", "incoming/", None).await.unwrap();
        assert_eq!(page.keys, vec!["incoming/a.csv"]);
        let err = store.get_object("B", "incoming/a.csv").await.err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert!(store.get("B", "incoming/a.csv").is_none());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get_object("B", "incoming/gone.csv").await.err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }
}
