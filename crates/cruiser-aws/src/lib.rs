//! # cruiser-aws
//!
//! The AWS backend provider: Lambda-backed HTTP and gRPC backends, the S3
//! tfstate source, Cloud Map service discovery feeding the xDS endpoint
//! overlay, and Lambda gRPC health checking.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod lambda;

mod error;
mod provider;
mod s3;
mod service_discovery;

pub use error::AwsError;
pub use provider::{AwsProvider, AwsProviderBuilder};
pub use s3::{S3Bucket, S3TfstateSource, TfstateBucket};
pub use service_discovery::{
    CloudMapCatalog, DiscoveredService, ServiceCatalog, ServiceDiscoveryXds,
    ServiceDiscoveryXdsBuilder, ServiceInstance,
};
