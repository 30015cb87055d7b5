//! Endpoint resources (EDS).

use serde::Deserialize;

use crate::core::{Address, Locality};
use crate::serde_util;
use crate::{ResourceProto, TypeUrl};

/// Load assignment for a cluster: the set of endpoints Envoy balances over.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterLoadAssignment {
    /// Name of the cluster this assignment belongs to.
    #[prost(string, tag = "1")]
    pub cluster_name: String,
    /// Endpoints grouped by locality.
    #[prost(message, repeated, tag = "2")]
    pub endpoints: Vec<LocalityLbEndpoints>,
}

impl ResourceProto for ClusterLoadAssignment {
    const TYPE_URL: &'static str = TypeUrl::ENDPOINT;

    fn resource_name(&self) -> &str {
        &self.cluster_name
    }
}

/// A group of endpoints sharing a locality.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalityLbEndpoints {
    /// Locality of the group.
    #[prost(message, optional, tag = "1")]
    pub locality: Option<Locality>,
    /// The endpoints themselves.
    #[prost(message, repeated, tag = "2")]
    pub lb_endpoints: Vec<LbEndpoint>,
    /// Relative load-balancing weight of the locality.
    #[prost(message, optional, tag = "3")]
    pub load_balancing_weight: Option<u32>,
    /// Failover priority; 0 is the highest.
    #[prost(uint32, tag = "5")]
    pub priority: u32,
}

/// A single load-balanced endpoint.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct LbEndpoint {
    /// Endpoint case of the host identifier oneof.
    #[prost(message, optional, tag = "1")]
    pub endpoint: Option<Endpoint>,
    /// Health as reported out of band.
    #[prost(enumeration = "crate::core::HealthStatus", tag = "2")]
    #[serde(deserialize_with = "serde_util::health_status")]
    pub health_status: i32,
    /// Relative load-balancing weight of the endpoint.
    #[prost(message, optional, tag = "4")]
    pub load_balancing_weight: Option<u32>,
}

/// An upstream host.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoint {
    /// Address of the host.
    #[prost(message, optional, tag = "1")]
    pub address: Option<Address>,
    /// Hostname for health checking and logging.
    #[prost(string, tag = "3")]
    pub hostname: String,
}

impl Endpoint {
    /// Build a TCP endpoint for a discovered instance.
    pub fn socket(hostname: impl Into<String>, address: impl Into<String>, port: u32) -> Self {
        Self {
            address: Some(Address::socket(address, port)),
            hostname: hostname.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn decodes_protojson_assignment() {
        let json = r#"{
            "clusterName": "users.ns-1234",
            "endpoints": [
                {
                    "lbEndpoints": [
                        {
                            "healthStatus": "HEALTHY",
                            "endpoint": {
                                "hostname": "i-abc",
                                "address": {
                                    "socketAddress": {"address": "10.1.2.3", "portValue": 8080}
                                }
                            }
                        }
                    ],
                    "priority": 1
                }
            ]
        }"#;

        let assignment: ClusterLoadAssignment =
            serde_json::from_str(json).expect("valid assignment");
        assert_eq!(assignment.resource_name(), "users.ns-1234");
        assert_eq!(assignment.endpoints.len(), 1);
        assert_eq!(assignment.endpoints[0].priority, 1);
        let lb = &assignment.endpoints[0].lb_endpoints[0];
        assert_eq!(lb.health_status, crate::core::HealthStatus::Healthy as i32);
        assert_eq!(lb.endpoint.as_ref().unwrap().hostname, "i-abc");
    }

    #[test]
    fn any_round_trip() {
        let assignment = ClusterLoadAssignment {
            cluster_name: "users".into(),
            endpoints: vec![LocalityLbEndpoints {
                lb_endpoints: vec![LbEndpoint {
                    endpoint: Some(Endpoint::socket("host-1", "10.0.0.1", 9000)),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let any = assignment.to_any();
        assert_eq!(any.type_url, TypeUrl::ENDPOINT);

        let decoded = ClusterLoadAssignment::decode(any.value.as_slice()).expect("decodes");
        assert_eq!(decoded, assignment);
    }
}
