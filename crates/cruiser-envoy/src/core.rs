//! Core Envoy configuration types: addresses and localities.

use serde::Deserialize;

use crate::serde_util;

/// A network address, either a socket address or a unix pipe.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    /// Socket address case of the address oneof.
    #[prost(message, optional, tag = "1")]
    pub socket_address: Option<SocketAddress>,
    /// Pipe case of the address oneof.
    #[prost(message, optional, tag = "2")]
    pub pipe: Option<Pipe>,
}

impl Address {
    /// Build a TCP socket address.
    pub fn socket(address: impl Into<String>, port: u32) -> Self {
        Self {
            socket_address: Some(SocketAddress {
                protocol: SocketProtocol::Tcp as i32,
                address: address.into(),
                port_value: Some(port),
                ..Default::default()
            }),
            pipe: None,
        }
    }
}

/// An IP socket address.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketAddress {
    /// Transport protocol.
    #[prost(enumeration = "SocketProtocol", tag = "1")]
    #[serde(deserialize_with = "serde_util::socket_protocol")]
    pub protocol: i32,
    /// IP or hostname.
    #[prost(string, tag = "2")]
    pub address: String,
    /// Numeric port case of the port specifier oneof.
    #[prost(uint32, optional, tag = "3")]
    pub port_value: Option<u32>,
    /// Named port case of the port specifier oneof.
    #[prost(string, optional, tag = "4")]
    pub named_port: Option<String>,
    /// Custom resolver name.
    #[prost(string, tag = "5")]
    pub resolver_name: String,
    /// Whether to accept IPv4-mapped IPv6 addresses.
    #[prost(bool, tag = "6")]
    pub ipv4_compat: bool,
}

/// Transport protocol for a socket address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum SocketProtocol {
    /// TCP.
    Tcp = 0,
    /// UDP.
    Udp = 1,
}

/// A unix domain socket path.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct Pipe {
    /// Filesystem path.
    #[prost(string, tag = "1")]
    pub path: String,
    /// File mode bits.
    #[prost(uint32, tag = "2")]
    pub mode: u32,
}

/// Locality of an upstream host.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct Locality {
    /// Region.
    #[prost(string, tag = "1")]
    pub region: String,
    /// Zone within the region.
    #[prost(string, tag = "2")]
    pub zone: String,
    /// Sub-zone within the zone.
    #[prost(string, tag = "3")]
    pub sub_zone: String,
}

/// Health status of an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum HealthStatus {
    /// Unknown; treated as healthy.
    Unknown = 0,
    /// Healthy.
    Healthy = 1,
    /// Unhealthy.
    Unhealthy = 2,
    /// Draining.
    Draining = 3,
    /// Health checks timed out.
    Timeout = 4,
    /// Degraded.
    Degraded = 5,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_protojson_socket_address() {
        let json = r#"{
            "socketAddress": {
                "protocol": "TCP",
                "address": "10.0.0.12",
                "portValue": 8443
            }
        }"#;
        let address: Address = serde_json::from_str(json).expect("valid address");
        let socket = address.socket_address.expect("socket address present");
        assert_eq!(socket.protocol, SocketProtocol::Tcp as i32);
        assert_eq!(socket.address, "10.0.0.12");
        assert_eq!(socket.port_value, Some(8443));
    }

    #[test]
    fn socket_constructor_matches_decoded_form() {
        let built = Address::socket("10.0.0.12", 8443);
        let decoded: Address = serde_json::from_str(
            r#"{"socketAddress": {"protocol": "TCP", "address": "10.0.0.12", "portValue": 8443}}"#,
        )
        .expect("valid address");
        assert_eq!(built, decoded);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let json = r#"{"socketAddress": {"address": "h", "portValue": 1, "futureField": true}}"#;
        let address: Address = serde_json::from_str(json).expect("valid address");
        assert!(address.socket_address.is_some());
    }
}
