//! # cruiser-envoy
//!
//! Envoy xDS wire types used by the cruiser control plane.
//!
//! The resource messages here are hand-maintained `prost` structs carrying
//! the upstream Envoy field tags, so encoding them into `Any` produces bytes
//! Envoy accepts for the fields modeled. Resource messages additionally
//! implement `serde::Deserialize` accepting the protojson spelling
//! (camelCase fields, oneof cases as plain fields, enums by name), which is
//! how instances are stored inside tfstate documents.
//!
//! The field surface is a pragmatic subset of the Envoy API: the fields the
//! state pipeline and service discovery actually produce and consume.
//! Protojson keys outside that subset are ignored on decode.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod core;
pub mod discovery;
pub mod endpoint;
pub mod listener;
pub mod route;
mod serde_util;
mod type_url;

pub use type_url::TypeUrl;

/// An Envoy resource message with a stable name and a registered type URL.
pub trait ResourceProto: prost::Message + Default {
    /// The `type.googleapis.com/...` URL identifying this message type.
    const TYPE_URL: &'static str;

    /// The resource's standard name, its identity within its type.
    fn resource_name(&self) -> &str;

    /// Serialize into a `google.protobuf.Any` envelope.
    fn to_any(&self) -> prost_types::Any {
        prost_types::Any {
            type_url: Self::TYPE_URL.to_owned(),
            value: self.encode_to_vec(),
        }
    }
}
