//! Route configuration resources (RDS / VHDS).

use serde::Deserialize;

use crate::{ResourceProto, TypeUrl};

/// A named collection of virtual hosts.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteConfiguration {
    /// Route configuration name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Virtual hosts that make up the configuration.
    #[prost(message, repeated, tag = "2")]
    pub virtual_hosts: Vec<VirtualHost>,
}

impl ResourceProto for RouteConfiguration {
    const TYPE_URL: &'static str = TypeUrl::ROUTE;

    fn resource_name(&self) -> &str {
        &self.name
    }
}

/// A virtual host: a set of domains and the routes served under them.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualHost {
    /// Virtual host name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Domains matched against the host header.
    #[prost(string, repeated, tag = "2")]
    pub domains: Vec<String>,
    /// Routes evaluated in order.
    #[prost(message, repeated, tag = "3")]
    pub routes: Vec<Route>,
}

impl ResourceProto for VirtualHost {
    const TYPE_URL: &'static str = TypeUrl::VIRTUAL_HOST;

    fn resource_name(&self) -> &str {
        &self.name
    }
}

/// A single route within a virtual host.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct Route {
    /// Match condition.
    #[prost(message, optional, tag = "1")]
    #[serde(rename = "match")]
    pub route_match: Option<RouteMatch>,
    /// Forwarding action case of the action oneof.
    #[prost(message, optional, tag = "2")]
    pub route: Option<RouteAction>,
    /// Route name.
    #[prost(string, tag = "14")]
    pub name: String,
}

/// Path matching for a route.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteMatch {
    /// Prefix case of the path specifier oneof.
    #[prost(string, optional, tag = "1")]
    pub prefix: Option<String>,
    /// Exact path case of the path specifier oneof.
    #[prost(string, optional, tag = "2")]
    pub path: Option<String>,
}

/// Forwarding action for a matched route.
#[derive(Clone, PartialEq, Deserialize, prost::Message)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteAction {
    /// Upstream cluster case of the cluster specifier oneof.
    #[prost(string, optional, tag = "1")]
    pub cluster: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_protojson_route_configuration() {
        let json = r#"{
            "name": "https",
            "virtualHosts": [
                {
                    "name": "users",
                    "domains": ["users.example.com"],
                    "routes": [
                        {
                            "name": "all",
                            "match": {"prefix": "/"},
                            "route": {"cluster": "users"}
                        }
                    ]
                }
            ]
        }"#;

        let config: RouteConfiguration = serde_json::from_str(json).expect("valid config");
        assert_eq!(config.resource_name(), "https");
        let vh = &config.virtual_hosts[0];
        assert_eq!(vh.domains, vec!["users.example.com"]);
        let route = &vh.routes[0];
        assert_eq!(route.route_match.as_ref().unwrap().prefix.as_deref(), Some("/"));
        assert_eq!(route.route.as_ref().unwrap().cluster.as_deref(), Some("users"));
    }

    #[test]
    fn virtual_host_is_its_own_resource() {
        let json = r#"{"name": "standalone", "domains": ["*"]}"#;
        let vh: VirtualHost = serde_json::from_str(json).expect("valid virtual host");
        assert_eq!(vh.resource_name(), "standalone");
        assert_eq!(VirtualHost::TYPE_URL, TypeUrl::VIRTUAL_HOST);
    }
}
