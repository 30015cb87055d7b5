//! Route table compilation and dispatch.
//!
//! A [`Router`] is compiled from one routes snapshot and never mutated; a
//! new snapshot compiles a new router which is swapped in atomically. Routes
//! arrive parent-before-child, so each route either lands at the root or
//! under its already-compiled parent.
//!
//! Dispatch walks the tree: a route is considered only when all of its own
//! matchers (and its ancestors') hold, children are tried before the route's
//! own backend, and the deepest matching route with a backend wins.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use cruiser_core::{Matcher, Route, RouteHandler};
use regex::Regex;
use tracing::debug;

use crate::handler::{full_body, HttpHandler, HttpRequest, HttpResponse};
use crate::ServerError;

/// Keys identifying registered backend providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendProviderKey {
    /// Amazon Web Services.
    Aws,
}

impl BackendProviderKey {
    /// The provider a handler's backend tag selects.
    pub fn for_handler(handler: &RouteHandler) -> Self {
        match handler {
            RouteHandler::AwsLambda(_) => Self::Aws,
        }
    }
}

impl std::fmt::Display for BackendProviderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aws => write!(f, "aws"),
        }
    }
}

/// Converts route handler descriptors into live HTTP handlers.
pub trait BackendProvider: Send + Sync {
    /// The key routes select this provider by.
    fn key(&self) -> BackendProviderKey;

    /// Build the HTTP-envelope backend for a handler descriptor.
    fn to_http_backend(&self, handler: &RouteHandler) -> Arc<dyn HttpHandler>;

    /// Build the gRPC-bridge backend for a handler descriptor.
    fn to_grpc_backend(&self, handler: &RouteHandler) -> Arc<dyn HttpHandler>;

    /// Re-arm health checking for the given handlers.
    fn health_check_handlers(&self, handlers: &[RouteHandler]);
}

/// A compiled, immutable route table.
pub struct Router {
    nodes: Vec<CompiledRoute>,
    roots: Vec<usize>,
    handlers: Vec<RouteHandler>,
    providers: Vec<Arc<dyn BackendProvider>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots)
            .field("handlers", &self.handlers)
            .finish()
    }
}

struct CompiledRoute {
    name: String,
    matchers: Vec<CompiledMatcher>,
    backend: Option<Arc<dyn HttpHandler>>,
    children: Vec<usize>,
}

enum CompiledMatcher {
    Host(String),
    Path(String),
    PathPrefix(String),
    Methods(HashSet<String>),
    Schemes(HashSet<String>),
    Headers(Vec<(String, String)>),
    HeadersRegexp(Vec<(String, Regex)>),
    Queries(Vec<(String, String)>),
    GrpcCall,
}

impl Router {
    /// Start building a router.
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Trigger provider health checks for every compiled backend handler.
    pub fn do_health_check(&self) {
        for provider in &self.providers {
            provider.health_check_handlers(&self.handlers);
        }
    }

    fn match_request(&self, request: &HttpRequest) -> Option<&Arc<dyn HttpHandler>> {
        self.roots
            .iter()
            .find_map(|&root| self.match_node(root, request))
    }

    fn match_node(&self, index: usize, request: &HttpRequest) -> Option<&Arc<dyn HttpHandler>> {
        let node = &self.nodes[index];
        if !node.matchers.iter().all(|m| m.matches(request)) {
            return None;
        }
        for &child in &node.children {
            if let Some(handler) = self.match_node(child, request) {
                return Some(handler);
            }
        }
        node.backend.as_ref()
    }
}

#[async_trait]
impl HttpHandler for Router {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        match self.match_request(&request) {
            Some(handler) => handler.handle(request).await,
            None => {
                debug!(path = request.uri().path(), "no route matched");
                http::Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(full_body("not found"))
                    .expect("static response")
            }
        }
    }
}

/// Builder compiling a routes snapshot against registered providers.
#[derive(Default)]
pub struct RouterBuilder {
    providers: HashMap<BackendProviderKey, Arc<dyn BackendProvider>>,
    routes: Vec<Route>,
}

impl RouterBuilder {
    /// Register a backend provider.
    #[must_use]
    pub fn backend_provider(mut self, provider: Arc<dyn BackendProvider>) -> Self {
        self.providers.insert(provider.key(), provider);
        self
    }

    /// Add the routes of a snapshot, ordered parent-before-child.
    #[must_use]
    pub fn routes(mut self, routes: &[Route]) -> Self {
        self.routes.extend_from_slice(routes);
        self
    }

    /// Compile the route table.
    pub fn build(self) -> Result<Router, ServerError> {
        let mut router = Router {
            nodes: Vec::with_capacity(self.routes.len()),
            roots: Vec::new(),
            handlers: Vec::new(),
            providers: self.providers.values().cloned().collect(),
        };
        let mut index_by_name: HashMap<String, usize> = HashMap::new();

        for route in &self.routes {
            let matchers = compile_matchers(&route.matchers)?;
            let backend = match &route.handler {
                None => None,
                Some(handler) => {
                    let key = BackendProviderKey::for_handler(handler);
                    let provider = self.providers.get(&key).ok_or_else(|| {
                        ServerError::NoBackendProvider {
                            provider: key.to_string(),
                        }
                    })?;
                    router.handlers.push(handler.clone());
                    Some(if route.is_grpc_call() {
                        provider.to_grpc_backend(handler)
                    } else {
                        provider.to_http_backend(handler)
                    })
                }
            };

            let index = router.nodes.len();
            router.nodes.push(CompiledRoute {
                name: route.name.clone(),
                matchers,
                backend,
                children: Vec::new(),
            });
            index_by_name.insert(route.name.clone(), index);

            if route.parent_name.is_empty() {
                router.roots.push(index);
            } else {
                let parent = *index_by_name.get(&route.parent_name).ok_or_else(|| {
                    ServerError::ParentRouteNotFound {
                        route: route.name.clone(),
                        parent: route.parent_name.clone(),
                    }
                })?;
                router.nodes[parent].children.push(index);
            }
        }

        Ok(router)
    }
}

fn compile_matchers(matchers: &[Matcher]) -> Result<Vec<CompiledMatcher>, ServerError> {
    let mut compiled = Vec::with_capacity(matchers.len());
    for matcher in matchers {
        match matcher {
            Matcher::Host(host) => compiled.push(CompiledMatcher::Host(host.to_lowercase())),
            Matcher::Path(path) => compiled.push(CompiledMatcher::Path(path.clone())),
            Matcher::PathPrefix(prefix) => {
                compiled.push(CompiledMatcher::PathPrefix(prefix.clone()))
            }
            Matcher::Methods(rule) => compiled.push(CompiledMatcher::Methods(
                rule.methods.iter().map(|m| m.to_uppercase()).collect(),
            )),
            Matcher::Schemes(rule) => compiled.push(CompiledMatcher::Schemes(
                rule.schemes.iter().map(|s| s.to_lowercase()).collect(),
            )),
            Matcher::Headers(rule) => compiled.push(CompiledMatcher::Headers(
                rule.headers
                    .iter()
                    .map(|(name, value)| (name.to_lowercase(), value.clone()))
                    .collect(),
            )),
            Matcher::HeadersRegexp(rule) => {
                let mut patterns = Vec::with_capacity(rule.headers_regexp.len());
                for (name, pattern) in &rule.headers_regexp {
                    let regex = Regex::new(pattern).map_err(|source| {
                        ServerError::InvalidHeaderPattern {
                            pattern: pattern.clone(),
                            source,
                        }
                    })?;
                    patterns.push((name.to_lowercase(), regex));
                }
                compiled.push(CompiledMatcher::HeadersRegexp(patterns));
            }
            Matcher::Queries(rule) => compiled.push(CompiledMatcher::Queries(
                rule.queries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )),
            // A false flag adds no predicate, as in the wire format.
            Matcher::IsGrpcCall(true) => compiled.push(CompiledMatcher::GrpcCall),
            Matcher::IsGrpcCall(false) => {}
        }
    }
    Ok(compiled)
}

impl CompiledMatcher {
    fn matches(&self, request: &HttpRequest) -> bool {
        match self {
            Self::Host(expected) => request_host(request)
                .map(|host| host.eq_ignore_ascii_case(expected))
                .unwrap_or(false),
            Self::Path(path) => request.uri().path() == path,
            Self::PathPrefix(prefix) => request.uri().path().starts_with(prefix.as_str()),
            Self::Methods(methods) => methods.contains(request.method().as_str()),
            Self::Schemes(schemes) => {
                let scheme = request.uri().scheme_str().unwrap_or("http");
                schemes.contains(scheme)
            }
            Self::Headers(expected) => expected.iter().all(|(name, value)| {
                request
                    .headers()
                    .get_all(name)
                    .iter()
                    .any(|v| v.to_str().map(|v| v == value).unwrap_or(false))
            }),
            Self::HeadersRegexp(expected) => expected.iter().all(|(name, pattern)| {
                request
                    .headers()
                    .get_all(name)
                    .iter()
                    .any(|v| v.to_str().map(|v| pattern.is_match(v)).unwrap_or(false))
            }),
            Self::Queries(expected) => {
                let pairs: Vec<(String, String)> = request
                    .uri()
                    .query()
                    .map(|query| {
                        url::form_urlencoded::parse(query.as_bytes())
                            .into_owned()
                            .collect()
                    })
                    .unwrap_or_default();
                expected.iter().all(|(key, value)| {
                    pairs.iter().any(|(k, v)| k == key && v == value)
                })
            }
            Self::GrpcCall => {
                request.version() == http::Version::HTTP_2
                    && request
                        .headers()
                        .get(http::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.contains("application/grpc"))
                        .unwrap_or(false)
            }
        }
    }
}

/// The host a request addresses: the URI authority under HTTP/2, the Host
/// header otherwise. Ports are stripped.
fn request_host(request: &HttpRequest) -> Option<String> {
    if let Some(host) = request.uri().host() {
        return Some(host.to_owned());
    }
    request
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|host| host.split(':').next().unwrap_or(host).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::empty_body;
    use cruiser_core::{HeadersRule, LambdaBackend, MethodsRule, QueriesRule};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HttpHandler for CountingHandler {
        async fn handle(&self, _request: HttpRequest) -> HttpResponse {
            self.hits.fetch_add(1, Ordering::SeqCst);
            http::Response::builder()
                .status(http::StatusCode::OK)
                .body(empty_body())
                .unwrap()
        }
    }

    /// Provider whose backends count invocations, keyed by function name.
    struct CountingProvider {
        hits: std::sync::Mutex<HashMap<String, Arc<AtomicUsize>>>,
    }

    impl CountingProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                hits: std::sync::Mutex::new(HashMap::new()),
            })
        }

        fn hits_for(&self, function_name: &str) -> Arc<AtomicUsize> {
            Arc::clone(
                self.hits
                    .lock()
                    .unwrap()
                    .entry(function_name.to_owned())
                    .or_default(),
            )
        }
    }

    impl BackendProvider for CountingProvider {
        fn key(&self) -> BackendProviderKey {
            BackendProviderKey::Aws
        }

        fn to_http_backend(&self, handler: &RouteHandler) -> Arc<dyn HttpHandler> {
            let RouteHandler::AwsLambda(backend) = handler;
            Arc::new(CountingHandler {
                hits: self.hits_for(&backend.function_name),
            })
        }

        fn to_grpc_backend(&self, handler: &RouteHandler) -> Arc<dyn HttpHandler> {
            self.to_http_backend(handler)
        }

        fn health_check_handlers(&self, _handlers: &[RouteHandler]) {}
    }

    fn lambda_handler(function_name: &str) -> RouteHandler {
        RouteHandler::AwsLambda(LambdaBackend {
            function_name: function_name.into(),
            qualifier: "live".into(),
        })
    }

    fn get(uri: &str) -> HttpRequest {
        http::Request::builder()
            .method("GET")
            .uri(uri)
            .body(empty_body())
            .unwrap()
    }

    #[tokio::test]
    async fn child_route_is_invoked_exactly_once() {
        let provider = CountingProvider::new();
        let routes = vec![
            Route {
                name: "root".into(),
                matchers: vec![Matcher::PathPrefix("/".into())],
                handler: Some(lambda_handler("root-fn")),
                ..Default::default()
            },
            Route {
                name: "a".into(),
                parent_name: "root".into(),
                matchers: vec![Matcher::Path("/a".into())],
                handler: Some(lambda_handler("a-fn")),
                ..Default::default()
            },
        ];
        let router = Router::builder()
            .backend_provider(provider.clone() as Arc<dyn BackendProvider>)
            .routes(&routes)
            .build()
            .unwrap();

        let response = router.handle(get("/a")).await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(provider.hits_for("a-fn").load(Ordering::SeqCst), 1);
        assert_eq!(provider.hits_for("root-fn").load(Ordering::SeqCst), 0);

        // Anything else under the prefix falls back to the parent backend.
        router.handle(get("/other")).await;
        assert_eq!(provider.hits_for("root-fn").load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmatched_request_is_not_found() {
        let provider = CountingProvider::new();
        let routes = vec![Route {
            name: "only".into(),
            matchers: vec![Matcher::Path("/only".into())],
            handler: Some(lambda_handler("fn")),
            ..Default::default()
        }];
        let router = Router::builder()
            .backend_provider(provider as Arc<dyn BackendProvider>)
            .routes(&routes)
            .build()
            .unwrap();

        let response = router.handle(get("/nope")).await;
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn missing_provider_fails_compilation() {
        let routes = vec![Route {
            name: "r".into(),
            handler: Some(lambda_handler("fn")),
            ..Default::default()
        }];
        let err = Router::builder().routes(&routes).build().expect_err("no provider");
        assert!(matches!(err, ServerError::NoBackendProvider { .. }));
    }

    #[test]
    fn missing_parent_fails_compilation() {
        let routes = vec![Route {
            name: "orphan".into(),
            parent_name: "ghost".into(),
            ..Default::default()
        }];
        let err = Router::builder().routes(&routes).build().expect_err("no parent");
        assert!(matches!(err, ServerError::ParentRouteNotFound { .. }));
    }

    #[tokio::test]
    async fn method_header_and_query_matchers() {
        let provider = CountingProvider::new();
        let routes = vec![Route {
            name: "picky".into(),
            matchers: vec![
                Matcher::Path("/p".into()),
                Matcher::Methods(MethodsRule {
                    methods: vec!["POST".into()],
                }),
                Matcher::Headers(HeadersRule {
                    headers: [("x-tenant".to_string(), "t1".to_string())].into(),
                }),
                Matcher::Queries(QueriesRule {
                    queries: [("v".to_string(), "2".to_string())].into(),
                }),
            ],
            handler: Some(lambda_handler("picky-fn")),
            ..Default::default()
        }];
        let router = Router::builder()
            .backend_provider(provider.clone() as Arc<dyn BackendProvider>)
            .routes(&routes)
            .build()
            .unwrap();

        let matching = http::Request::builder()
            .method("POST")
            .uri("/p?v=2")
            .header("x-tenant", "t1")
            .body(empty_body())
            .unwrap();
        assert_eq!(router.handle(matching).await.status(), http::StatusCode::OK);

        let wrong_method = http::Request::builder()
            .method("GET")
            .uri("/p?v=2")
            .header("x-tenant", "t1")
            .body(empty_body())
            .unwrap();
        assert_eq!(
            router.handle(wrong_method).await.status(),
            http::StatusCode::NOT_FOUND
        );

        let wrong_query = http::Request::builder()
            .method("POST")
            .uri("/p?v=1")
            .header("x-tenant", "t1")
            .body(empty_body())
            .unwrap();
        assert_eq!(
            router.handle(wrong_query).await.status(),
            http::StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn host_matcher_reads_authority_or_host_header() {
        let provider = CountingProvider::new();
        let routes = vec![Route {
            name: "hosted".into(),
            matchers: vec![Matcher::Host("api.example.com".into())],
            handler: Some(lambda_handler("fn")),
            ..Default::default()
        }];
        let router = Router::builder()
            .backend_provider(provider as Arc<dyn BackendProvider>)
            .routes(&routes)
            .build()
            .unwrap();

        let with_authority = http::Request::builder()
            .uri("https://api.example.com/x")
            .body(empty_body())
            .unwrap();
        assert_eq!(
            router.handle(with_authority).await.status(),
            http::StatusCode::OK
        );

        let with_header = http::Request::builder()
            .uri("/x")
            .header("host", "api.example.com:4880")
            .body(empty_body())
            .unwrap();
        assert_eq!(
            router.handle(with_header).await.status(),
            http::StatusCode::OK
        );
    }

    #[tokio::test]
    async fn grpc_matcher_requires_http2_and_content_type() {
        let provider = CountingProvider::new();
        let routes = vec![Route {
            name: "grpc".into(),
            matchers: vec![Matcher::IsGrpcCall(true)],
            handler: Some(lambda_handler("grpc-fn")),
            ..Default::default()
        }];
        let router = Router::builder()
            .backend_provider(provider as Arc<dyn BackendProvider>)
            .routes(&routes)
            .build()
            .unwrap();

        let grpc = http::Request::builder()
            .version(http::Version::HTTP_2)
            .uri("/pkg.Service/Method")
            .header("content-type", "application/grpc+proto")
            .body(empty_body())
            .unwrap();
        assert_eq!(router.handle(grpc).await.status(), http::StatusCode::OK);

        let plain = http::Request::builder()
            .version(http::Version::HTTP_2)
            .uri("/pkg.Service/Method")
            .header("content-type", "application/json")
            .body(empty_body())
            .unwrap();
        assert_eq!(
            router.handle(plain).await.status(),
            http::StatusCode::NOT_FOUND
        );
    }
}
