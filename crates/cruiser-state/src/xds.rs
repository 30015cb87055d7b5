//! xDS projection.
//!
//! Projects Envoy resources from tfstate documents into the per-type linear
//! caches. Each sync cycle accumulates the full current set per type; build
//! applies `(updates, deletes = previous \ current)` atomically per cache and
//! rotates the maps, so a resource missing from the latest documents is
//! removed from its cache.
//!
//! Endpoints discovered out of band live in a separate overlay keyed by
//! cluster name and replace a cluster-load-assignment's endpoints at
//! ingestion time.

use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cruiser_core::{resource_type, Tfstate};
use cruiser_envoy::cluster::Cluster;
use cruiser_envoy::endpoint::{ClusterLoadAssignment, LocalityLbEndpoints};
use cruiser_envoy::listener::Listener;
use cruiser_envoy::route::{RouteConfiguration, VirtualHost};
use cruiser_envoy::{ResourceProto, TypeUrl};
use cruiser_xds::{LinearCache, MuxCache};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Projection, StateError};

/// Current and previous snapshot maps for one resource type.
#[derive(Debug)]
struct ResourceSet<T> {
    current: HashMap<String, T>,
    previous: HashMap<String, T>,
}

impl<T> Default for ResourceSet<T> {
    fn default() -> Self {
        Self {
            current: HashMap::new(),
            previous: HashMap::new(),
        }
    }
}

impl<T: ResourceProto> ResourceSet<T> {
    fn insert(&mut self, resource: T) {
        self.current
            .insert(resource.resource_name().to_owned(), resource);
    }

    /// Apply this set to its cache and rotate current into previous.
    fn transact(&mut self, cache: &LinearCache) -> Result<(), StateError> {
        let current = mem::take(&mut self.current);

        let deletes: Vec<String> = self
            .previous
            .keys()
            .filter(|name| !current.contains_key(*name))
            .cloned()
            .collect();
        let updates = current
            .iter()
            .map(|(name, resource)| (name.clone(), resource.to_any()))
            .collect();

        cache.update_resources(updates, deletes)?;
        self.previous = current;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct XdsInner {
    listeners: ResourceSet<Listener>,
    virtual_hosts: ResourceSet<VirtualHost>,
    route_configurations: ResourceSet<RouteConfiguration>,
    clusters: ResourceSet<Cluster>,
    cluster_load_assignments: ResourceSet<ClusterLoadAssignment>,
    /// Out-of-band endpoints keyed by cluster name.
    endpoints: HashMap<String, Vec<LocalityLbEndpoints>>,
}

/// The xDS state projection.
#[derive(Debug)]
pub struct XdsState {
    inner: RwLock<XdsInner>,
    listener_cache: Arc<LinearCache>,
    virtual_host_cache: Arc<LinearCache>,
    route_configuration_cache: Arc<LinearCache>,
    cluster_cache: Arc<LinearCache>,
    cluster_load_assignment_cache: Arc<LinearCache>,
    mux: Arc<MuxCache>,
    update_tx: mpsc::Sender<()>,
}

impl XdsState {
    /// Create the projection, its per-type caches, and the update channel.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
        let listener_cache = Arc::new(LinearCache::new(TypeUrl::LISTENER));
        let virtual_host_cache = Arc::new(LinearCache::new(TypeUrl::VIRTUAL_HOST));
        let route_configuration_cache = Arc::new(LinearCache::new(TypeUrl::ROUTE));
        let cluster_cache = Arc::new(LinearCache::new(TypeUrl::CLUSTER));
        let cluster_load_assignment_cache = Arc::new(LinearCache::new(TypeUrl::ENDPOINT));

        let mux = Arc::new(
            MuxCache::new()
                .with_cache(Arc::clone(&listener_cache))
                .with_cache(Arc::clone(&virtual_host_cache))
                .with_cache(Arc::clone(&route_configuration_cache))
                .with_cache(Arc::clone(&cluster_cache))
                .with_cache(Arc::clone(&cluster_load_assignment_cache)),
        );

        let (update_tx, update_rx) = mpsc::channel(1);
        let state = Arc::new(Self {
            inner: RwLock::new(XdsInner::default()),
            listener_cache,
            virtual_host_cache,
            route_configuration_cache,
            cluster_cache,
            cluster_load_assignment_cache,
            mux,
            update_tx,
        });
        (state, update_rx)
    }

    /// The classified cache set the discovery services serve from.
    pub fn mux(&self) -> Arc<MuxCache> {
        Arc::clone(&self.mux)
    }

    /// Replace the out-of-band endpoints for the given clusters.
    ///
    /// An assignment with no endpoints deletes the overlay entry for its
    /// cluster. The overlay is consulted on the next ingestion.
    pub fn set_cluster_endpoints(&self, assignments: Vec<ClusterLoadAssignment>) {
        let mut inner = self.inner.write().expect("xds lock poisoned");
        for assignment in assignments {
            if assignment.endpoints.is_empty() {
                inner.endpoints.remove(&assignment.cluster_name);
            } else {
                inner
                    .endpoints
                    .insert(assignment.cluster_name, assignment.endpoints);
            }
        }
    }

    fn decode<T: ResourceProto + for<'de> serde::Deserialize<'de>>(
        resource_type: &str,
        raw: &str,
    ) -> Result<T, StateError> {
        serde_json::from_str(raw).map_err(|e| StateError::decode(resource_type, e))
    }
}

#[async_trait]
impl Projection for XdsState {
    fn name(&self) -> &'static str {
        "xds"
    }

    fn read_from_tfstate(&self, tfstate: &Tfstate) -> Result<(), StateError> {
        let mut inner = self.inner.write().expect("xds lock poisoned");

        for resource in &tfstate.resources {
            for instance in &resource.instances {
                let raw = instance.get();
                match resource.resource_type.as_str() {
                    resource_type::ENVOY_LISTENER => {
                        let listener: Listener =
                            Self::decode(resource_type::ENVOY_LISTENER, raw)?;
                        inner.listeners.insert(listener);
                    }
                    resource_type::ENVOY_VIRTUAL_HOST => {
                        let virtual_host: VirtualHost =
                            Self::decode(resource_type::ENVOY_VIRTUAL_HOST, raw)?;
                        inner.virtual_hosts.insert(virtual_host);
                    }
                    resource_type::ENVOY_ROUTE_CONFIGURATION => {
                        let config: RouteConfiguration =
                            Self::decode(resource_type::ENVOY_ROUTE_CONFIGURATION, raw)?;
                        inner.route_configurations.insert(config);
                    }
                    resource_type::ENVOY_CLUSTER => {
                        let cluster: Cluster = Self::decode(resource_type::ENVOY_CLUSTER, raw)?;
                        inner.clusters.insert(cluster);
                    }
                    resource_type::ENVOY_CLUSTER_LOAD_ASSIGNMENT => {
                        let mut assignment: ClusterLoadAssignment =
                            Self::decode(resource_type::ENVOY_CLUSTER_LOAD_ASSIGNMENT, raw)?;
                        if let Some(endpoints) = inner.endpoints.get(&assignment.cluster_name) {
                            assignment.endpoints.clone_from(endpoints);
                        }
                        inner.cluster_load_assignments.insert(assignment);
                    }
                    // Unknown resource types are skipped.
                    _ => {}
                }
            }
        }

        Ok(())
    }

    async fn build(&self) -> Result<(), StateError> {
        {
            let mut inner = self.inner.write().expect("xds lock poisoned");

            // Clusters and endpoints first, so Envoy can resolve upstream
            // references named by listeners and route configurations.
            inner.clusters.transact(&self.cluster_cache)?;
            inner
                .cluster_load_assignments
                .transact(&self.cluster_load_assignment_cache)?;
            inner.listeners.transact(&self.listener_cache)?;
            inner.virtual_hosts.transact(&self.virtual_host_cache)?;
            inner
                .route_configurations
                .transact(&self.route_configuration_cache)?;
        }

        debug!("xds caches updated");
        self.update_tx
            .send(())
            .await
            .map_err(|_| StateError::ChannelClosed)
    }
}
