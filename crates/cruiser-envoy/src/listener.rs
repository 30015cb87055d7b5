//! Listener resources (LDS).

use serde::Deserialize;

use crate::core::Address;
use crate::{ResourceProto, TypeUrl};

/// A downstream listener.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct Listener {
    /// Listener name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Address the listener binds.
    #[prost(message, optional, tag = "2")]
    pub address: Option<Address>,
}

impl ResourceProto for Listener {
    const TYPE_URL: &'static str = TypeUrl::LISTENER;

    fn resource_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_protojson_listener() {
        let json = r#"{
            "name": "ingress",
            "address": {"socketAddress": {"address": "0.0.0.0", "portValue": 10000}}
        }"#;
        let listener: Listener = serde_json::from_str(json).expect("valid listener");
        assert_eq!(listener.resource_name(), "ingress");
        let socket = listener
            .address
            .and_then(|a| a.socket_address)
            .expect("socket address");
        assert_eq!(socket.port_value, Some(10000));
    }
}
