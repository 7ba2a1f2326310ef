//! In-process object store used by tests and the `memory` backend.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};

use crate::application::store::{ObjectStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

/// A `put` call as observed by the store, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutAttempt {
    pub bucket: String,
    pub key: String,
}

type ObjectId = (String, String);

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<ObjectId, StoredObject>,
    failing: DashSet<ObjectId>,
    delays: DashMap<ObjectId, Duration>,
    attempts: Mutex<Vec<PutAttempt>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `put` to this key fail.
    pub fn fail_on(&self, bucket: &str, key: &str) {
        self.failing.insert(object_id(bucket, key));
    }

    /// Delay every future `put` to this key.
    pub fn delay_on(&self, bucket: &str, key: &str, delay: Duration) {
        self.delays.insert(object_id(bucket, key), delay);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .get(&object_id(bucket, key))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Every `put` in the order it reached the store.
    pub fn attempts(&self) -> Vec<PutAttempt> {
        match self.attempts.lock() {
            Ok(attempts) => attempts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record_attempt(&self, bucket: &str, key: &str) {
        let attempt = PutAttempt {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        match self.attempts.lock() {
            Ok(mut attempts) => attempts.push(attempt),
            Err(poisoned) => poisoned.into_inner().push(attempt),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.record_attempt(bucket, key);
        let id = object_id(bucket, key);

        let delay = self.delays.get(&id).map(|entry| *entry.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(&id) {
            return Err(StoreError::backend(format!(
                "injected failure for {bucket}/{key}"
            )));
        }

        self.objects.insert(
            id,
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

fn object_id(bucket: &str, key: &str) -> ObjectId {
    (bucket.to_string(), key.to_string())
}
