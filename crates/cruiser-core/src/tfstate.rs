//! Terraform state document model.
//!
//! Only the top-level `resources` array is consumed. Each resource carries a
//! `type` selector and opaque `instances`, which stay as raw JSON until a
//! projection that recognizes the type decodes them.

use serde::Deserialize;
use serde_json::value::RawValue;

/// Resource type selectors recognized by the state projections.
pub mod resource_type {
    /// A router route.
    pub const ROUTE: &str = "cruiser_route";
    /// An Envoy listener.
    pub const ENVOY_LISTENER: &str = "cruiser_envoy_listener";
    /// An Envoy virtual host.
    pub const ENVOY_VIRTUAL_HOST: &str = "cruiser_envoy_virtual_host";
    /// An Envoy route configuration.
    pub const ENVOY_ROUTE_CONFIGURATION: &str = "cruiser_envoy_route_configuration";
    /// An Envoy cluster.
    pub const ENVOY_CLUSTER: &str = "cruiser_envoy_cluster";
    /// An Envoy cluster load assignment.
    pub const ENVOY_CLUSTER_LOAD_ASSIGNMENT: &str = "cruiser_envoy_cluster_load_assignment";
}

/// A parsed Terraform state document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tfstate {
    /// Resources listed in the document. Unknown types are skipped by the
    /// projections.
    #[serde(default)]
    pub resources: Vec<TfstateResource>,
}

/// A single resource block within a Terraform state document.
#[derive(Debug, Clone, Deserialize)]
pub struct TfstateResource {
    /// Resource type selector, e.g. `cruiser_route`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource name within the state file.
    #[serde(default)]
    pub name: String,
    /// Resource mode (`managed`, `data`); informational only.
    #[serde(default)]
    pub mode: String,
    /// Provider address; informational only.
    #[serde(default)]
    pub provider: String,
    /// Opaque instance payloads, one protojson message per instance.
    #[serde(default)]
    pub instances: Vec<Box<RawValue>>,
}

impl Tfstate {
    /// Parse a Terraform state document from JSON bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
