//! In-process object store

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ObjectStore, StoreError, StoreResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// [`ObjectStore`] kept in memory. Queued failures are returned by the
/// next calls (puts and gets alike) before any real work happens.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    failures: Mutex<VecDeque<StoreError>>,
    put_attempts: AtomicUsize,
    get_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail with `err`. Calls stack up in FIFO order.
    pub fn fail_next(&self, err: StoreError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(err);
        }
    }

    /// Number of `put_object` calls, including failed ones
    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }

    pub fn get_attempts(&self) -> usize {
        self.get_attempts.load(Ordering::SeqCst)
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        match self.objects.lock() {
            Ok(objects) => objects
                .keys()
                .filter(|(b, _)| b == bucket)
                .map(|(_, k)| k.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn take_failure(&self) -> StoreResult<()> {
        let mut failures = self
            .failures
            .lock()
            .map_err(|_| StoreError::Unavailable("Failed to acquire lock".to_string()))?;
        match failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;

        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StoreError::Unavailable("Failed to acquire lock".to_string()))?;
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes: body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.get_attempts.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;

        self.object(bucket, key)
            .map(|obj| obj.bytes)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
