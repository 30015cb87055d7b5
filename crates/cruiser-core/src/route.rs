//! Route wire model.
//!
//! Routes arrive as protojson instances inside tfstate documents, so the
//! serde spelling here follows protojson conventions: camelCase fields and
//! oneof cases rendered as a single present field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named route: a set of matchers, an optional backend handler, and an
/// optional parent route it nests under.
///
/// Invariant: `parent_name` is either empty or names another route present
/// in the same snapshot; the route graph is acyclic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Route {
    /// Unique route name.
    pub name: String,
    /// Name of the parent route, or empty for a root route.
    pub parent_name: String,
    /// Matchers that must all hold for the route to match.
    pub matchers: Vec<Matcher>,
    /// Backend handler; absent for routes that only group children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<RouteHandler>,
}

impl Route {
    /// Convenience constructor for a root route with no matchers.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether any matcher marks this route as a gRPC call.
    pub fn is_grpc_call(&self) -> bool {
        self.matchers
            .iter()
            .any(|m| matches!(m, Matcher::IsGrpcCall(true)))
    }
}

/// A single match rule. Exactly one case is present per matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Matcher {
    /// Exact host match.
    Host(String),
    /// Exact path match.
    Path(String),
    /// Path prefix match.
    PathPrefix(String),
    /// HTTP method set.
    Methods(MethodsRule),
    /// URI scheme set.
    Schemes(SchemesRule),
    /// Exact header values.
    Headers(HeadersRule),
    /// Header values matched by regular expression.
    HeadersRegexp(HeadersRegexpRule),
    /// Exact query parameter values.
    Queries(QueriesRule),
    /// HTTP/2 request with a gRPC content type.
    IsGrpcCall(bool),
}

/// Method set for [`Matcher::Methods`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MethodsRule {
    /// Allowed methods, by name (`GET`, `POST`, ...).
    pub methods: Vec<String>,
}

/// Scheme set for [`Matcher::Schemes`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemesRule {
    /// Allowed schemes (`HTTP`, `HTTPS`).
    pub schemes: Vec<String>,
}

/// Exact header requirements for [`Matcher::Headers`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeadersRule {
    /// Header name to required value.
    pub headers: BTreeMap<String, String>,
}

/// Regexp header requirements for [`Matcher::HeadersRegexp`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeadersRegexpRule {
    /// Header name to value pattern.
    pub headers_regexp: BTreeMap<String, String>,
}

/// Exact query requirements for [`Matcher::Queries`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueriesRule {
    /// Query parameter name to required value.
    pub queries: BTreeMap<String, String>,
}

/// The backend a route dispatches to. Exactly one case is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteHandler {
    /// An AWS Lambda function invoked with an API-Gateway envelope.
    AwsLambda(LambdaBackend),
}

/// AWS Lambda backend coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LambdaBackend {
    /// Function name or ARN.
    pub function_name: String,
    /// Alias or version qualifier.
    pub qualifier: String,
}
