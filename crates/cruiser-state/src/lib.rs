//! # cruiser-state
//!
//! The state-ingestion pipeline shared by both runtime modes.
//!
//! A [`StateManager`] periodically pulls Terraform state documents from a
//! [`TfstateSource`], feeds them to the enabled projections, and has each
//! projection publish an atomic snapshot:
//!
//! - [`RoutesState`] projects `cruiser_route` resources into a
//!   dependency-ordered route list for the data plane
//! - [`XdsState`] projects Envoy resources into the per-type linear caches
//!   served by the control plane, merging in the service-discovery endpoint
//!   overlay
//!
//! Between builds, readers always observe the previous full snapshot.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod manager;
mod routes;
mod source;
mod xds;

pub use error::StateError;
pub use manager::{Projection, StateManager, StateManagerBuilder};
pub use routes::RoutesState;
pub use source::TfstateSource;
pub use xds::XdsState;
