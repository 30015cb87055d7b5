//! # cruiser-xds
//!
//! The xDS serving layer: per-type resource caches and the discovery gRPC
//! services that stream them to Envoy.
//!
//! - [`LinearCache`] - a keyed cache for one resource type with a
//!   monotonically increasing version; applying an update wakes subscribed
//!   streams
//! - [`MuxCache`] - classifies requests to the per-type cache by
//!   `request.type_url`
//! - [`DiscoveryServer`] - a State-of-the-World discovery service
//!   (ADS and the per-type services are the same machinery under different
//!   gRPC service names)
//! - [`xds_routes`] - binds ADS, LDS, CDS, RDS, VHDS, EDS, SDS, and RTDS
//!   onto a set of tonic routes
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cruiser_envoy::TypeUrl;
//! use cruiser_xds::{LinearCache, MuxCache, xds_routes};
//!
//! let clusters = Arc::new(LinearCache::new(TypeUrl::CLUSTER));
//! let mux = Arc::new(MuxCache::new().with_cache(Arc::clone(&clusters)));
//! let routes = xds_routes(mux);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod linear;
mod mux;
mod server;
mod service;
mod stream;

pub use error::CacheError;
pub use linear::LinearCache;
pub use mux::MuxCache;
pub use server::{
    xds_routes, AggregatedDiscovery, ClusterDiscovery, DiscoveryServer, DiscoveryServiceName,
    EndpointDiscovery, ListenerDiscovery, RouteDiscovery, RuntimeDiscovery, SecretDiscovery,
    VirtualHostDiscovery,
};
pub use stream::{StreamContext, StreamId};
