//! Linear resource cache.
//!
//! A [`LinearCache`] holds the current resources of exactly one type, keyed
//! by resource name. Each applied update batch bumps a single cache-wide
//! version and wakes subscribed streams; a State-of-the-World response is the
//! full keyed set at one version.

use std::collections::HashMap;
use std::sync::RwLock;

use cruiser_envoy::TypeUrl;
use tokio::sync::watch;
use tracing::debug;

use crate::CacheError;

/// A keyed resource cache for a single xDS type.
///
/// Writers apply `(updates, deletes)` batches atomically; readers take a
/// consistent `(version, resources)` snapshot. Subscribers are woken through
/// a watch channel carrying the latest version.
#[derive(Debug)]
pub struct LinearCache {
    type_url: TypeUrl,
    inner: RwLock<Inner>,
    version_tx: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    resources: HashMap<String, prost_types::Any>,
    version: u64,
}

impl LinearCache {
    /// Create an empty cache serving the given type URL.
    pub fn new(type_url: impl Into<TypeUrl>) -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            type_url: type_url.into(),
            inner: RwLock::new(Inner::default()),
            version_tx,
        }
    }

    /// The type URL this cache serves.
    #[inline]
    pub fn type_url(&self) -> &TypeUrl {
        &self.type_url
    }

    /// Current cache version. Strictly increases with every applied batch.
    pub fn version(&self) -> u64 {
        self.inner.read().expect("cache lock poisoned").version
    }

    /// Number of resources currently held.
    pub fn len(&self) -> usize {
        self.inner.read().expect("cache lock poisoned").resources.len()
    }

    /// Whether the cache holds no resources.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a single resource by name.
    pub fn get(&self, name: &str) -> Option<prost_types::Any> {
        self.inner
            .read()
            .expect("cache lock poisoned")
            .resources
            .get(name)
            .cloned()
    }

    /// Apply an update batch atomically: upsert `updates`, remove `deletes`,
    /// bump the version, and wake subscribers.
    ///
    /// Every offered resource must carry this cache's type URL.
    pub fn update_resources(
        &self,
        updates: HashMap<String, prost_types::Any>,
        deletes: Vec<String>,
    ) -> Result<(), CacheError> {
        for (name, resource) in &updates {
            if resource.type_url != self.type_url.as_str() {
                return Err(CacheError::TypeMismatch {
                    expected: self.type_url.to_string(),
                    actual: resource.type_url.clone(),
                    name: name.clone(),
                });
            }
        }

        let version = {
            let mut inner = self.inner.write().expect("cache lock poisoned");
            for name in &deletes {
                inner.resources.remove(name);
            }
            let updated = updates.len();
            inner.resources.extend(updates);
            inner.version += 1;

            debug!(
                type_url = %self.type_url,
                version = inner.version,
                updated,
                deleted = deletes.len(),
                total = inner.resources.len(),
                "applied cache update"
            );
            inner.version
        };

        // Wake subscribers after the write lock is released.
        self.version_tx.send_replace(version);
        Ok(())
    }

    /// Take a consistent snapshot of `(version, resources)`.
    ///
    /// An empty `names` slice means wildcard: every resource. Otherwise only
    /// the named resources that exist are returned.
    pub fn fetch(&self, names: &[String]) -> (u64, Vec<prost_types::Any>) {
        let inner = self.inner.read().expect("cache lock poisoned");
        let resources = if names.is_empty() {
            inner.resources.values().cloned().collect()
        } else {
            names
                .iter()
                .filter_map(|name| inner.resources.get(name).cloned())
                .collect()
        };
        (inner.version, resources)
    }

    /// Subscribe to version changes. The receiver is primed with the current
    /// version; callers deduplicate by comparing against what they last sent.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cruiser_envoy::cluster::Cluster;
    use cruiser_envoy::ResourceProto;

    fn cluster_any(name: &str) -> prost_types::Any {
        Cluster {
            name: name.into(),
            ..Default::default()
        }
        .to_any()
    }

    fn updates(names: &[&str]) -> HashMap<String, prost_types::Any> {
        names
            .iter()
            .map(|n| (n.to_string(), cluster_any(n)))
            .collect()
    }

    #[test]
    fn update_bumps_version_and_stores() {
        let cache = LinearCache::new(TypeUrl::CLUSTER);
        assert_eq!(cache.version(), 0);

        cache.update_resources(updates(&["a", "b"]), vec![]).unwrap();
        assert_eq!(cache.version(), 1);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());

        cache
            .update_resources(updates(&["a"]), vec!["b".into()])
            .unwrap();
        assert_eq!(cache.version(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn fetch_wildcard_and_named() {
        let cache = LinearCache::new(TypeUrl::CLUSTER);
        cache.update_resources(updates(&["a", "b"]), vec![]).unwrap();

        let (version, all) = cache.fetch(&[]);
        assert_eq!(version, 1);
        assert_eq!(all.len(), 2);

        let (_, named) = cache.fetch(&["a".into(), "missing".into()]);
        assert_eq!(named.len(), 1);
    }

    #[test]
    fn rejects_foreign_type() {
        let cache = LinearCache::new(TypeUrl::LISTENER);
        let err = cache
            .update_resources(updates(&["a"]), vec![])
            .expect_err("type mismatch");
        assert!(matches!(err, CacheError::TypeMismatch { .. }));
        assert_eq!(cache.version(), 0);
    }

    #[tokio::test]
    async fn subscribers_are_woken() {
        let cache = LinearCache::new(TypeUrl::CLUSTER);
        let mut rx = cache.subscribe();
        assert_eq!(*rx.borrow_and_update(), 0);

        cache.update_resources(updates(&["a"]), vec![]).unwrap();
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow_and_update(), 1);
    }
}
