//! Cloud Map service discovery.
//!
//! Periodically lists the configured namespaces, their services, and each
//! service's registered instances, and pushes the resulting cluster load
//! assignments into the xDS endpoint overlay. Clusters are named
//! `{service}.{namespace_id}`; the service port comes from a configurable
//! tag on the service. A cluster that disappears is pushed once more with
//! no endpoints so its overlay entry is deleted.
//!
//! The catalog trait keeps the sweep logic testable without AWS, the same
//! seam the tfstate source puts over its bucket.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_servicediscovery::types::{
    FilterCondition, NamespaceFilter, NamespaceFilterName, ServiceFilter, ServiceFilterName,
};
use cruiser_envoy::endpoint::{ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints};
use cruiser_state::XdsState;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::AwsError;

/// Instance attribute carrying the registered IPv4 address.
const INSTANCE_IPV4_ATTRIBUTE: &str = "AWS_INSTANCE_IPV4";

/// Default interval between discovery sweeps.
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// A service found in a namespace.
#[derive(Debug, Clone)]
pub struct DiscoveredService {
    /// Service identifier, used to list instances.
    pub id: String,
    /// Service name, the first half of the cluster name.
    pub name: String,
    /// Service ARN, used to look up tags.
    pub arn: String,
}

/// One registered instance of a service.
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    /// Instance identifier, used as the endpoint hostname.
    pub id: String,
    /// Registration attributes, including the instance address.
    pub attributes: HashMap<String, String>,
}

/// The service-registry operations the sweep needs.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// IDs of the namespaces with the given name.
    async fn namespace_ids(&self, namespace_name: &str) -> Result<Vec<String>, AwsError>;

    /// Services registered in a namespace.
    async fn services(&self, namespace_id: &str) -> Result<Vec<DiscoveredService>, AwsError>;

    /// Tags of a service, keyed by tag key.
    async fn service_tags(&self, service_arn: &str) -> Result<HashMap<String, String>, AwsError>;

    /// Instances registered to a service.
    async fn instances(&self, service_id: &str) -> Result<Vec<ServiceInstance>, AwsError>;
}

/// [`ServiceCatalog`] backed by Cloud Map.
pub struct CloudMapCatalog {
    client: aws_sdk_servicediscovery::Client,
}

impl CloudMapCatalog {
    /// Create a catalog over a Cloud Map client.
    pub fn new(client: aws_sdk_servicediscovery::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceCatalog for CloudMapCatalog {
    async fn namespace_ids(&self, namespace_name: &str) -> Result<Vec<String>, AwsError> {
        let filter = NamespaceFilter::builder()
            .name(NamespaceFilterName::Name)
            .values(namespace_name)
            .condition(FilterCondition::Eq)
            .build()
            .map_err(AwsError::service_discovery)?;
        let output = self
            .client
            .list_namespaces()
            .filters(filter)
            .send()
            .await
            .map_err(AwsError::service_discovery)?;

        Ok(output
            .namespaces()
            .iter()
            .filter_map(|namespace| namespace.id().map(str::to_owned))
            .collect())
    }

    async fn services(&self, namespace_id: &str) -> Result<Vec<DiscoveredService>, AwsError> {
        let filter = ServiceFilter::builder()
            .name(ServiceFilterName::NamespaceId)
            .values(namespace_id)
            .condition(FilterCondition::Eq)
            .build()
            .map_err(AwsError::service_discovery)?;

        let mut services = Vec::new();
        let mut pages = self
            .client
            .list_services()
            .filters(filter)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(AwsError::service_discovery)?;
            for service in page.services() {
                let (Some(id), Some(name), Some(arn)) =
                    (service.id(), service.name(), service.arn())
                else {
                    continue;
                };
                services.push(DiscoveredService {
                    id: id.to_owned(),
                    name: name.to_owned(),
                    arn: arn.to_owned(),
                });
            }
        }

        Ok(services)
    }

    async fn service_tags(&self, service_arn: &str) -> Result<HashMap<String, String>, AwsError> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource_arn(service_arn)
            .send()
            .await
            .map_err(AwsError::service_discovery)?;

        Ok(output
            .tags()
            .iter()
            .map(|tag| (tag.key().to_owned(), tag.value().to_owned()))
            .collect())
    }

    async fn instances(&self, service_id: &str) -> Result<Vec<ServiceInstance>, AwsError> {
        let mut instances = Vec::new();
        let mut pages = self
            .client
            .list_instances()
            .service_id(service_id)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(AwsError::service_discovery)?;
            for instance in page.instances() {
                let Some(id) = instance.id() else { continue };
                instances.push(ServiceInstance {
                    id: id.to_owned(),
                    attributes: instance.attributes().cloned().unwrap_or_default(),
                });
            }
        }

        Ok(instances)
    }
}

/// The service-catalog to xDS endpoint-overlay sync.
pub struct ServiceDiscoveryXds<C: ServiceCatalog = CloudMapCatalog> {
    catalog: C,
    namespaces: Vec<String>,
    service_port_tag_key: String,
    xds_state: Arc<XdsState>,
    interval: Duration,
    previous_clusters: HashSet<String>,
}

impl<C: ServiceCatalog> ServiceDiscoveryXds<C> {
    /// Start building a sync.
    pub fn builder() -> ServiceDiscoveryXdsBuilder<C> {
        ServiceDiscoveryXdsBuilder::default()
    }

    /// Run discovery sweeps until cancelled or failed.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), AwsError> {
        info!(
            namespaces = ?self.namespaces,
            interval = ?self.interval,
            "service discovery started"
        );

        loop {
            self.sync_once().await?;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("service discovery stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn sync_once(&mut self) -> Result<(), AwsError> {
        let mut assignments = Vec::new();

        for namespace_name in &self.namespaces {
            for namespace_id in self.catalog.namespace_ids(namespace_name).await? {
                for service in self.catalog.services(&namespace_id).await? {
                    let Some(port) = self.service_port(&service).await? else {
                        continue;
                    };
                    let endpoints = self.instance_endpoints(&service, port).await?;
                    assignments.push(ClusterLoadAssignment {
                        cluster_name: format!("{}.{}", service.name, namespace_id),
                        endpoints: vec![LocalityLbEndpoints {
                            lb_endpoints: endpoints,
                            ..Default::default()
                        }],
                    });
                }
            }
        }

        let current: HashSet<String> = assignments
            .iter()
            .map(|a| a.cluster_name.clone())
            .collect();
        // A cluster that vanished clears its overlay entry once.
        for vanished in self.previous_clusters.difference(&current) {
            assignments.push(ClusterLoadAssignment {
                cluster_name: vanished.clone(),
                endpoints: Vec::new(),
            });
        }

        debug!(clusters = current.len(), "service discovery sweep complete");
        self.xds_state.set_cluster_endpoints(assignments);
        self.previous_clusters = current;
        Ok(())
    }

    /// The service port from the configured tag, or `None` when untagged.
    async fn service_port(&self, service: &DiscoveredService) -> Result<Option<u32>, AwsError> {
        let tags = self.catalog.service_tags(&service.arn).await?;
        let Some(value) = tags.get(&self.service_port_tag_key) else {
            return Ok(None);
        };

        let port = value
            .parse::<u32>()
            .map_err(|source| AwsError::InvalidServicePort {
                service: service.name.clone(),
                value: value.clone(),
                source,
            })?;
        Ok(Some(port))
    }

    async fn instance_endpoints(
        &self,
        service: &DiscoveredService,
        port: u32,
    ) -> Result<Vec<LbEndpoint>, AwsError> {
        let mut endpoints = Vec::new();
        for instance in self.catalog.instances(&service.id).await? {
            let Some(address) = instance.attributes.get(INSTANCE_IPV4_ATTRIBUTE) else {
                continue;
            };
            endpoints.push(LbEndpoint {
                endpoint: Some(Endpoint::socket(&instance.id, address.clone(), port)),
                ..Default::default()
            });
        }
        Ok(endpoints)
    }
}

/// Builder for [`ServiceDiscoveryXds`].
pub struct ServiceDiscoveryXdsBuilder<C: ServiceCatalog = CloudMapCatalog> {
    catalog: Option<C>,
    namespaces: Vec<String>,
    service_port_tag_key: Option<String>,
    xds_state: Option<Arc<XdsState>>,
    interval: Option<Duration>,
}

impl<C: ServiceCatalog> Default for ServiceDiscoveryXdsBuilder<C> {
    fn default() -> Self {
        Self {
            catalog: None,
            namespaces: Vec::new(),
            service_port_tag_key: None,
            xds_state: None,
            interval: None,
        }
    }
}

impl ServiceDiscoveryXdsBuilder<CloudMapCatalog> {
    /// Set the catalog from a Cloud Map client.
    #[must_use]
    pub fn service_discovery_client(self, client: aws_sdk_servicediscovery::Client) -> Self {
        self.catalog(CloudMapCatalog::new(client))
    }
}

impl<C: ServiceCatalog> ServiceDiscoveryXdsBuilder<C> {
    /// Set the service catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: C) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the namespace names to sweep.
    #[must_use]
    pub fn namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Set the tag key carrying the service port (default `port`).
    #[must_use]
    pub fn service_port_tag_key(mut self, key: impl Into<String>) -> Self {
        self.service_port_tag_key = Some(key.into());
        self
    }

    /// Set the xDS state receiving the endpoint overlay.
    #[must_use]
    pub fn xds_state(mut self, state: Arc<XdsState>) -> Self {
        self.xds_state = Some(state);
        self
    }

    /// Override the sweep interval (default 5s).
    #[must_use]
    pub fn periodic_sync_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Build the sync. Panics only on missing required wiring, which is a
    /// programming error in the caller.
    pub fn build(self) -> ServiceDiscoveryXds<C> {
        ServiceDiscoveryXds {
            catalog: self.catalog.expect("service catalog is required"),
            namespaces: self.namespaces,
            service_port_tag_key: self.service_port_tag_key.unwrap_or_else(|| "port".to_owned()),
            xds_state: self.xds_state.expect("xds state is required"),
            interval: self.interval.unwrap_or(DEFAULT_SYNC_INTERVAL),
            previous_clusters: HashSet::new(),
        }
    }
}
