//! S3 tfstate source.
//!
//! Enumerates `.tfstate` objects in a bucket and caches parsed documents by
//! content digest (ETag): unchanged objects are served from cache, changed
//! or new objects are downloaded and re-parsed, and vanished objects are
//! evicted. A call returns documents only when something changed, where the
//! key set itself counts as content, so downstream sees removals too.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use cruiser_core::Tfstate;
use cruiser_state::{StateError, TfstateSource};
use tracing::debug;

use crate::AwsError;

/// Object-store operations the source needs; the seam keeps the digest and
/// eviction logic testable without AWS.
#[async_trait]
pub trait TfstateBucket: Send + Sync {
    /// The bucket name, used to namespace cache keys.
    fn name(&self) -> &str;

    /// List every object key in the bucket.
    async fn list_keys(&self) -> Result<Vec<String>, AwsError>;

    /// The content digest of one object.
    async fn digest(&self, key: &str) -> Result<String, AwsError>;

    /// Download one object.
    async fn download(&self, key: &str) -> Result<Vec<u8>, AwsError>;
}

/// [`TfstateBucket`] backed by S3.
pub struct S3Bucket {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Bucket {
    /// Create a bucket handle.
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl TfstateBucket for S3Bucket {
    fn name(&self) -> &str {
        &self.bucket
    }

    async fn list_keys(&self) -> Result<Vec<String>, AwsError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| AwsError::ListObjects {
                bucket: self.bucket.clone(),
                source: Box::new(e),
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_owned());
                }
            }
        }

        Ok(keys)
    }

    async fn digest(&self, key: &str) -> Result<String, AwsError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AwsError::HeadObject {
                key: key.to_owned(),
                source: Box::new(e),
            })?;
        Ok(head.e_tag().unwrap_or_default().to_owned())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AwsError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AwsError::GetObject {
                key: key.to_owned(),
                source: Box::new(e),
            })?;
        let body = object.body.collect().await.map_err(|e| AwsError::GetObject {
            key: key.to_owned(),
            source: Box::new(e),
        })?;
        Ok(body.to_vec())
    }
}

struct CachedObject {
    digest: String,
    document: Tfstate,
}

/// The digest-cached tfstate source over a bucket.
pub struct S3TfstateSource<B: TfstateBucket = S3Bucket> {
    bucket: B,
    objects: HashMap<String, CachedObject>,
}

impl<B: TfstateBucket> S3TfstateSource<B> {
    /// Create a source over a bucket.
    pub fn new(bucket: B) -> Self {
        Self {
            bucket,
            objects: HashMap::new(),
        }
    }

    async fn sync(&mut self) -> Result<Option<Vec<Tfstate>>, AwsError> {
        let mut need_update = false;
        let mut seen = HashSet::new();
        let mut documents = Vec::new();

        for key in self.bucket.list_keys().await? {
            if !key.ends_with(".tfstate") {
                continue;
            }

            let digest = self.bucket.digest(&key).await?;
            let full_key = format!("{}/{}", self.bucket.name(), key);

            let changed = self
                .objects
                .get(&full_key)
                .map(|cached| cached.digest != digest)
                .unwrap_or(true);
            if changed {
                let body = self.bucket.download(&key).await?;
                let document =
                    Tfstate::from_slice(&body).map_err(|source| AwsError::ParseTfstate {
                        key: key.clone(),
                        source,
                    })?;
                debug!(key = %full_key, "tfstate object changed");
                // The digest advances only after a successful parse.
                self.objects.insert(full_key.clone(), CachedObject { digest, document });
                need_update = true;
            }

            documents.push(self.objects[&full_key].document.clone());
            seen.insert(full_key);
        }

        // A vanished object is a change downstream must observe.
        let stale: Vec<String> = self
            .objects
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            debug!(key = %key, "tfstate object removed");
            self.objects.remove(&key);
            need_update = true;
        }

        if !need_update {
            return Ok(None);
        }
        Ok(Some(documents))
    }
}

#[async_trait]
impl<B: TfstateBucket> TfstateSource for S3TfstateSource<B> {
    async fn get_tfstate(&mut self) -> Result<Option<Vec<Tfstate>>, StateError> {
        self.sync().await.map_err(StateError::source_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory bucket: key -> (etag, body).
    #[derive(Default)]
    struct MemoryBucket {
        objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
        digest_failures: Mutex<HashSet<String>>,
    }

    impl MemoryBucket {
        fn put(&self, key: &str, etag: &str, body: &[u8]) {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_owned(), (etag.to_owned(), body.to_vec()));
        }

        fn remove(&self, key: &str) {
            self.objects.lock().unwrap().remove(key);
        }

        fn fail_digest(&self, key: &str) {
            self.digest_failures.lock().unwrap().insert(key.to_owned());
        }
    }

    #[async_trait]
    impl TfstateBucket for &MemoryBucket {
        fn name(&self) -> &str {
            "test-bucket"
        }

        async fn list_keys(&self) -> Result<Vec<String>, AwsError> {
            let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
            keys.sort();
            Ok(keys)
        }

        async fn digest(&self, key: &str) -> Result<String, AwsError> {
            if self.digest_failures.lock().unwrap().contains(key) {
                return Err(AwsError::HeadObject {
                    key: key.to_owned(),
                    source: "head failed".into(),
                });
            }
            Ok(self.objects.lock().unwrap()[key].0.clone())
        }

        async fn download(&self, key: &str) -> Result<Vec<u8>, AwsError> {
            Ok(self.objects.lock().unwrap()[key].1.clone())
        }
    }

    const EMPTY_STATE: &[u8] = br#"{"resources": []}"#;

    #[tokio::test]
    async fn change_detection_cycle() {
        let bucket = MemoryBucket::default();
        bucket.put("foo.tfstate", "etag-x", EMPTY_STATE);
        let mut source = S3TfstateSource::new(&bucket);

        // New object: full slice returned.
        let documents = source.sync().await.unwrap();
        assert_eq!(documents.expect("changed").len(), 1);

        // Unchanged: nothing.
        assert!(source.sync().await.unwrap().is_none());

        // New digest: full slice again.
        bucket.put("foo.tfstate", "etag-y", EMPTY_STATE);
        let documents = source.sync().await.unwrap();
        assert_eq!(documents.expect("changed").len(), 1);

        // Key removed: still a change, now with an empty slice.
        bucket.remove("foo.tfstate");
        let documents = source.sync().await.unwrap();
        assert!(documents.expect("removal is a change").is_empty());

        // And quiet again afterwards.
        assert!(source.sync().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_tfstate_keys_are_ignored() {
        let bucket = MemoryBucket::default();
        bucket.put("README.md", "etag", b"docs");
        bucket.put("state.tfstate", "etag", EMPTY_STATE);
        let mut source = S3TfstateSource::new(&bucket);

        let documents = source.sync().await.unwrap().expect("changed");
        assert_eq!(documents.len(), 1);
    }

    #[tokio::test]
    async fn unchanged_objects_are_served_from_cache() {
        let bucket = MemoryBucket::default();
        bucket.put("a.tfstate", "etag-a", EMPTY_STATE);
        bucket.put("b.tfstate", "etag-b", EMPTY_STATE);
        let mut source = S3TfstateSource::new(&bucket);
        source.sync().await.unwrap();

        // Only `a` changes; both documents still come back.
        bucket.put("a.tfstate", "etag-a2", EMPTY_STATE);
        let documents = source.sync().await.unwrap().expect("changed");
        assert_eq!(documents.len(), 2);
    }

    #[tokio::test]
    async fn parse_failure_does_not_advance_the_digest() {
        let bucket = MemoryBucket::default();
        bucket.put("bad.tfstate", "etag-1", b"{broken");
        let mut source = S3TfstateSource::new(&bucket);

        assert!(matches!(
            source.sync().await,
            Err(AwsError::ParseTfstate { .. })
        ));

        // Fixed body under the same digest is re-fetched because the failed
        // parse never recorded the digest.
        bucket.put("bad.tfstate", "etag-1", EMPTY_STATE);
        let documents = source.sync().await.unwrap();
        assert_eq!(documents.expect("changed").len(), 1);
    }

    #[tokio::test]
    async fn digest_failure_aborts_the_call() {
        let bucket = MemoryBucket::default();
        bucket.put("a.tfstate", "etag", EMPTY_STATE);
        bucket.fail_digest("a.tfstate");
        let mut source = S3TfstateSource::new(&bucket);

        assert!(matches!(
            source.sync().await,
            Err(AwsError::HeadObject { .. })
        ));
    }
}
