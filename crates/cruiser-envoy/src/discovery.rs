//! Discovery service wire messages (SotW).
//!
//! These only travel over gRPC, so they are prost-only: no protojson serde.

/// Request sent by an xDS client for one resource type.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DiscoveryRequest {
    /// Version the client currently has; empty on first request.
    #[prost(string, tag = "1")]
    pub version_info: String,
    /// The requesting node.
    #[prost(message, optional, tag = "2")]
    pub node: Option<Node>,
    /// Specific resources requested; empty for wildcard.
    #[prost(string, repeated, tag = "3")]
    pub resource_names: Vec<String>,
    /// Type URL of the requested resources.
    #[prost(string, tag = "4")]
    pub type_url: String,
    /// Nonce of the most recently received response.
    #[prost(string, tag = "5")]
    pub response_nonce: String,
    /// Populated when the client rejects a response (NACK).
    #[prost(message, optional, tag = "6")]
    pub error_detail: Option<RpcStatus>,
}

/// Response carrying the full current resource set of one type.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DiscoveryResponse {
    /// Version of this response.
    #[prost(string, tag = "1")]
    pub version_info: String,
    /// The resources, each wrapped in `Any`.
    #[prost(message, repeated, tag = "2")]
    pub resources: Vec<prost_types::Any>,
    /// Canary flag; unused by this control plane.
    #[prost(bool, tag = "3")]
    pub canary: bool,
    /// Type URL of the resources.
    #[prost(string, tag = "4")]
    pub type_url: String,
    /// Unique nonce identifying this response.
    #[prost(string, tag = "5")]
    pub nonce: String,
}

/// The identity an xDS client presents on its first request.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Node {
    /// Node identifier.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Cluster the node belongs to.
    #[prost(string, tag = "2")]
    pub cluster: String,
}

/// `google.rpc.Status` carried in NACKs.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcStatus {
    /// Status code.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Developer-facing message.
    #[prost(string, tag = "2")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn request_round_trip() {
        let request = DiscoveryRequest {
            version_info: "3".into(),
            node: Some(Node {
                id: "envoy-1".into(),
                cluster: "edge".into(),
            }),
            resource_names: vec!["users".into()],
            type_url: crate::TypeUrl::CLUSTER.into(),
            response_nonce: "sotw-7".into(),
            error_detail: None,
        };

        let bytes = request.encode_to_vec();
        let decoded = DiscoveryRequest::decode(bytes.as_slice()).expect("decodes");
        assert_eq!(decoded, request);
    }
}
