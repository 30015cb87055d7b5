//! # cruiser-core
//!
//! Core types shared by the cruiser control and data planes:
//!
//! - [`DependencyGraph`] - generic keyed DAG with topological sort, used to
//!   order routes parent-before-child
//! - [`Tfstate`] - the Terraform state document shape consumed by the
//!   state-ingestion pipeline
//! - [`Route`] - the route wire model (matchers, backend handler)
//!
//! ## Example
//!
//! ```rust
//! use cruiser_core::{DependencyGraph, Route};
//!
//! let mut graph = DependencyGraph::new(|r: &Route| r.name.as_str());
//! graph.add_node(Route::named("api"));
//! let sorted = graph.topological_sort();
//! assert_eq!(sorted.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod graph;
mod route;
mod tfstate;

pub use graph::DependencyGraph;
pub use route::{
    HeadersRegexpRule, HeadersRule, LambdaBackend, Matcher, MethodsRule, QueriesRule, Route,
    RouteHandler, SchemesRule,
};
pub use tfstate::{resource_type, Tfstate, TfstateResource};
