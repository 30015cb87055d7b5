//! Cluster resources (CDS).

use serde::Deserialize;

use crate::endpoint::ClusterLoadAssignment;
use crate::serde_util;
use crate::{ResourceProto, TypeUrl};

/// An upstream cluster.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    /// Cluster name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Service discovery type.
    #[prost(enumeration = "DiscoveryType", tag = "2")]
    #[serde(rename = "type", deserialize_with = "serde_util::discovery_type")]
    pub discovery_type: i32,
    /// Connect timeout for new upstream connections.
    #[prost(message, optional, tag = "4")]
    #[serde(deserialize_with = "serde_util::duration")]
    pub connect_timeout: Option<prost_types::Duration>,
    /// Load balancing policy.
    #[prost(enumeration = "LbPolicy", tag = "6")]
    #[serde(deserialize_with = "serde_util::lb_policy")]
    pub lb_policy: i32,
    /// Inlined load assignment for non-EDS clusters.
    #[prost(message, optional, tag = "33")]
    pub load_assignment: Option<ClusterLoadAssignment>,
}

impl ResourceProto for Cluster {
    const TYPE_URL: &'static str = TypeUrl::CLUSTER;

    fn resource_name(&self) -> &str {
        &self.name
    }
}

/// How cluster members are discovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum DiscoveryType {
    /// Statically configured hosts.
    Static = 0,
    /// Strict DNS resolution.
    StrictDns = 1,
    /// Logical DNS resolution.
    LogicalDns = 2,
    /// Endpoint discovery service.
    Eds = 3,
    /// Original destination.
    OriginalDst = 4,
}

/// Load balancing policy for a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum LbPolicy {
    /// Round robin.
    RoundRobin = 0,
    /// Least request.
    LeastRequest = 1,
    /// Ring hash.
    RingHash = 2,
    /// Random.
    Random = 3,
    /// Maglev.
    Maglev = 5,
    /// Provided by the cluster implementation.
    ClusterProvided = 6,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_protojson_cluster() {
        let json = r#"{
            "name": "users",
            "type": "EDS",
            "connectTimeout": "1.5s",
            "lbPolicy": "LEAST_REQUEST"
        }"#;
        let cluster: Cluster = serde_json::from_str(json).expect("valid cluster");
        assert_eq!(cluster.resource_name(), "users");
        assert_eq!(cluster.discovery_type, DiscoveryType::Eds as i32);
        assert_eq!(cluster.lb_policy, LbPolicy::LeastRequest as i32);
        let timeout = cluster.connect_timeout.expect("timeout present");
        assert_eq!((timeout.seconds, timeout.nanos), (1, 500_000_000));
    }

    #[test]
    fn type_url_is_cds() {
        assert_eq!(Cluster::TYPE_URL, TypeUrl::CLUSTER);
    }
}
