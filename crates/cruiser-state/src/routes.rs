//! Routes projection.
//!
//! Projects `cruiser_route` resources into a dependency graph and publishes
//! topologically-sorted snapshots: every parent precedes its children, which
//! is the order the router needs to build its matcher tree.

use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cruiser_core::{resource_type, DependencyGraph, Route, Tfstate};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Projection, StateError};

/// The routes state projection.
///
/// Ingestion buffers decoded routes by name (duplicates collapse to the
/// last seen); build swaps the buffer into the graph under the writer lock
/// and publishes the sorted snapshot. Readers use [`get_routes`].
///
/// [`get_routes`]: RoutesState::get_routes
#[derive(Debug)]
pub struct RoutesState {
    inner: RwLock<RoutesInner>,
    update_tx: mpsc::Sender<Vec<Route>>,
}

#[derive(Debug)]
struct RoutesInner {
    graph: DependencyGraph<Route>,
    buffer: HashMap<String, Route>,
}

impl RoutesState {
    /// Create the projection and the snapshot channel the data plane
    /// consumes. The channel holds a single snapshot so a slow consumer
    /// back-pressures the sync loop.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<Vec<Route>>) {
        let (update_tx, update_rx) = mpsc::channel(1);
        let state = Arc::new(Self {
            inner: RwLock::new(RoutesInner {
                graph: DependencyGraph::new(|route: &Route| route.name.as_str()),
                buffer: HashMap::new(),
            }),
            update_tx,
        });
        (state, update_rx)
    }

    /// Current routes, ordered parent-before-child.
    pub fn get_routes(&self) -> Vec<Route> {
        self.inner
            .read()
            .expect("routes lock poisoned")
            .graph
            .topological_sort()
    }
}

#[async_trait]
impl Projection for RoutesState {
    fn name(&self) -> &'static str {
        "routes"
    }

    fn read_from_tfstate(&self, tfstate: &Tfstate) -> Result<(), StateError> {
        let mut inner = self.inner.write().expect("routes lock poisoned");

        for resource in &tfstate.resources {
            if resource.resource_type != resource_type::ROUTE {
                continue;
            }
            for instance in &resource.instances {
                let route: Route = serde_json::from_str(instance.get())
                    .map_err(|e| StateError::decode(resource_type::ROUTE, e))?;
                inner.buffer.insert(route.name.clone(), route);
            }
        }

        Ok(())
    }

    async fn build(&self) -> Result<(), StateError> {
        let routes = {
            let mut inner = self.inner.write().expect("routes lock poisoned");
            let buffer = mem::take(&mut inner.buffer);

            inner.graph.clear();
            for route in buffer.values() {
                if route.parent_name.is_empty() {
                    inner.graph.add_node(route.clone());
                    continue;
                }
                let Some(parent) = buffer.get(&route.parent_name) else {
                    return Err(StateError::NoParentFound {
                        route: route.name.clone(),
                        parent: route.parent_name.clone(),
                    });
                };
                inner.graph.add_edge(route.clone(), parent.clone());
            }

            inner.graph.topological_sort()
        };

        debug!(routes = routes.len(), "publishing routes snapshot");
        self.update_tx
            .send(routes)
            .await
            .map_err(|_| StateError::ChannelClosed)
    }
}
