//! Discovery gRPC services.
//!
//! All of the xDS discovery services share one State-of-the-World stream
//! shape: a bidirectional stream of `DiscoveryRequest`/`DiscoveryResponse`.
//! [`DiscoveryServer`] implements that shape once and is instantiated under
//! each gRPC service name; requests are classified to the right cache by
//! their `type_url`, so the aggregated service and the per-type services are
//! the same machinery.
//!
//! Delta endpoints are not implemented and answer `Unimplemented`.

use std::marker::PhantomData;
use std::sync::Arc;

use cruiser_envoy::discovery::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codegen::{BoxFuture, Service};
use tonic::server::NamedService;
use tonic::{Request, Response, Status, Streaming};

use crate::service::drive_stream;
use crate::MuxCache;

/// Buffered responses per stream before back-pressure applies.
const RESPONSE_BUFFER: usize = 16;

/// The gRPC identity of one discovery service.
pub trait DiscoveryServiceName: Send + Sync + 'static {
    /// Fully qualified gRPC service name.
    const SERVICE: &'static str;
    /// The State-of-the-World streaming method, if the service has one.
    const SOTW_METHOD: Option<&'static str>;
}

/// Aggregated Discovery Service (ADS).
pub struct AggregatedDiscovery;

impl DiscoveryServiceName for AggregatedDiscovery {
    const SERVICE: &'static str = "envoy.service.discovery.v3.AggregatedDiscoveryService";
    const SOTW_METHOD: Option<&'static str> = Some("StreamAggregatedResources");
}

/// Listener Discovery Service (LDS).
pub struct ListenerDiscovery;

impl DiscoveryServiceName for ListenerDiscovery {
    const SERVICE: &'static str = "envoy.service.listener.v3.ListenerDiscoveryService";
    const SOTW_METHOD: Option<&'static str> = Some("StreamListeners");
}

/// Cluster Discovery Service (CDS).
pub struct ClusterDiscovery;

impl DiscoveryServiceName for ClusterDiscovery {
    const SERVICE: &'static str = "envoy.service.cluster.v3.ClusterDiscoveryService";
    const SOTW_METHOD: Option<&'static str> = Some("StreamClusters");
}

/// Route Discovery Service (RDS).
pub struct RouteDiscovery;

impl DiscoveryServiceName for RouteDiscovery {
    const SERVICE: &'static str = "envoy.service.route.v3.RouteDiscoveryService";
    const SOTW_METHOD: Option<&'static str> = Some("StreamRoutes");
}

/// Virtual Host Discovery Service (VHDS). Delta-only upstream; virtual hosts
/// are served over the aggregated stream.
pub struct VirtualHostDiscovery;

impl DiscoveryServiceName for VirtualHostDiscovery {
    const SERVICE: &'static str = "envoy.service.route.v3.VirtualHostDiscoveryService";
    const SOTW_METHOD: Option<&'static str> = None;
}

/// Endpoint Discovery Service (EDS).
pub struct EndpointDiscovery;

impl DiscoveryServiceName for EndpointDiscovery {
    const SERVICE: &'static str = "envoy.service.endpoint.v3.EndpointDiscoveryService";
    const SOTW_METHOD: Option<&'static str> = Some("StreamEndpoints");
}

/// Secret Discovery Service (SDS).
pub struct SecretDiscovery;

impl DiscoveryServiceName for SecretDiscovery {
    const SERVICE: &'static str = "envoy.service.secret.v3.SecretDiscoveryService";
    const SOTW_METHOD: Option<&'static str> = Some("StreamSecrets");
}

/// Runtime Discovery Service (RTDS).
pub struct RuntimeDiscovery;

impl DiscoveryServiceName for RuntimeDiscovery {
    const SERVICE: &'static str = "envoy.service.runtime.v3.RuntimeDiscoveryService";
    const SOTW_METHOD: Option<&'static str> = Some("StreamRuntime");
}

/// A State-of-the-World discovery service bound to one gRPC service name.
pub struct DiscoveryServer<S> {
    mux: Arc<MuxCache>,
    _service: PhantomData<S>,
}

impl<S: DiscoveryServiceName> DiscoveryServer<S> {
    /// Create the service over the classified caches.
    pub fn new(mux: Arc<MuxCache>) -> Self {
        Self {
            mux,
            _service: PhantomData,
        }
    }

    fn sotw_path() -> Option<String> {
        S::SOTW_METHOD.map(|method| format!("/{}/{}", S::SERVICE, method))
    }
}

impl<S> Clone for DiscoveryServer<S> {
    fn clone(&self) -> Self {
        Self {
            mux: Arc::clone(&self.mux),
            _service: PhantomData,
        }
    }
}

impl<S: DiscoveryServiceName> std::fmt::Debug for DiscoveryServer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryServer")
            .field("service", &S::SERVICE)
            .finish()
    }
}

impl<S: DiscoveryServiceName> NamedService for DiscoveryServer<S> {
    const NAME: &'static str = S::SERVICE;
}

/// The stream handler handed to tonic's server machinery.
struct SotwStreaming {
    mux: Arc<MuxCache>,
}

impl tonic::server::StreamingService<DiscoveryRequest> for SotwStreaming {
    type Response = DiscoveryResponse;
    type ResponseStream = ReceiverStream<Result<DiscoveryResponse, Status>>;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<Streaming<DiscoveryRequest>>) -> Self::Future {
        let mux = Arc::clone(&self.mux);
        Box::pin(async move {
            let requests = request.into_inner();
            let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
            tokio::spawn(drive_stream(mux, requests, tx));
            Ok(Response::new(ReceiverStream::new(rx)))
        })
    }
}

impl<S, B> Service<http::Request<B>> for DiscoveryServer<S>
where
    S: DiscoveryServiceName,
    B: http_body::Body<Data = bytes::Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let is_sotw = Self::sotw_path().is_some_and(|path| req.uri().path() == path);

        if is_sotw {
            let mux = Arc::clone(&self.mux);
            return Box::pin(async move {
                let codec =
                    tonic::codec::ProstCodec::<DiscoveryResponse, DiscoveryRequest>::default();
                let mut grpc = tonic::server::Grpc::new(codec);
                Ok(grpc.streaming(SotwStreaming { mux }, req).await)
            });
        }

        // Delta methods and anything else on this service.
        Box::pin(async move {
            let mut response = http::Response::new(tonic::body::empty_body());
            let headers = response.headers_mut();
            headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/grpc"),
            );
            headers.insert(
                "grpc-status",
                http::HeaderValue::from_static("12"),
            );
            Ok(response)
        })
    }
}

/// Bind the combined xDS server: ADS plus every per-type discovery service,
/// all backed by the same classified caches.
pub fn xds_routes(mux: Arc<MuxCache>) -> tonic::service::Routes {
    tonic::service::Routes::new(DiscoveryServer::<AggregatedDiscovery>::new(Arc::clone(&mux)))
        .add_service(DiscoveryServer::<ListenerDiscovery>::new(Arc::clone(&mux)))
        .add_service(DiscoveryServer::<ClusterDiscovery>::new(Arc::clone(&mux)))
        .add_service(DiscoveryServer::<RouteDiscovery>::new(Arc::clone(&mux)))
        .add_service(DiscoveryServer::<VirtualHostDiscovery>::new(Arc::clone(&mux)))
        .add_service(DiscoveryServer::<EndpointDiscovery>::new(Arc::clone(&mux)))
        .add_service(DiscoveryServer::<SecretDiscovery>::new(Arc::clone(&mux)))
        .add_service(DiscoveryServer::<RuntimeDiscovery>::new(mux))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names_are_fully_qualified() {
        assert_eq!(
            <DiscoveryServer<AggregatedDiscovery> as NamedService>::NAME,
            "envoy.service.discovery.v3.AggregatedDiscoveryService"
        );
        assert_eq!(
            <DiscoveryServer<ClusterDiscovery> as NamedService>::NAME,
            "envoy.service.cluster.v3.ClusterDiscoveryService"
        );
    }

    #[test]
    fn sotw_paths() {
        assert_eq!(
            DiscoveryServer::<AggregatedDiscovery>::sotw_path().as_deref(),
            Some(
                "/envoy.service.discovery.v3.AggregatedDiscoveryService/StreamAggregatedResources"
            )
        );
        // VHDS is delta-only upstream; no SotW path to serve.
        assert_eq!(DiscoveryServer::<VirtualHostDiscovery>::sotw_path(), None);
    }
}
