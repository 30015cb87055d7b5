//! State-of-the-World discovery stream driver.
//!
//! One driver instance runs per gRPC stream. It tracks which resource types
//! the stream has subscribed to, answers requests out of the classified
//! caches, and pushes fresh responses when a cache version advances.

use std::collections::HashMap;
use std::sync::Arc;

use cruiser_envoy::discovery::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{StreamExt, StreamMap};
use tonic::{Status, Streaming};
use tracing::{debug, info, warn};

use crate::{LinearCache, MuxCache, StreamContext};

/// Per-type subscription state on one stream.
#[derive(Debug, Default)]
struct Subscription {
    /// Version of the last response sent for this type, if any.
    sent_version: Option<u64>,
    /// Resource names the client asked for; empty means wildcard.
    names: Vec<String>,
}

/// Decision-making core of a discovery stream, separated from stream I/O.
pub(crate) struct SotwDriver {
    mux: Arc<MuxCache>,
    ctx: StreamContext,
    subscriptions: HashMap<String, Subscription>,
    nonce: u64,
}

impl SotwDriver {
    pub(crate) fn new(mux: Arc<MuxCache>) -> Self {
        Self {
            mux,
            ctx: StreamContext::new(),
            subscriptions: HashMap::new(),
            nonce: 0,
        }
    }

    pub(crate) fn ctx(&self) -> &StreamContext {
        &self.ctx
    }

    /// Process one discovery request.
    ///
    /// Returns the response to send, if the client is out of date, and the
    /// cache to start watching, if this is the first request for its type.
    pub(crate) fn handle_request(
        &mut self,
        request: &DiscoveryRequest,
    ) -> (Option<DiscoveryResponse>, Option<Arc<LinearCache>>) {
        self.ctx.record_request();

        if self.ctx.node_id().is_none() {
            if let Some(node) = &request.node {
                self.ctx.set_node(node.id.clone());
                debug!(stream = %self.ctx.id(), node_id = %node.id, "node identified");
            }
        }

        if let Some(error) = &request.error_detail {
            warn!(
                stream = %self.ctx.id(),
                type_url = %request.type_url,
                version = %request.version_info,
                nonce = %request.response_nonce,
                code = error.code,
                message = %error.message,
                "client rejected configuration"
            );
        } else if !request.response_nonce.is_empty() {
            debug!(
                stream = %self.ctx.id(),
                type_url = %request.type_url,
                version = %request.version_info,
                nonce = %request.response_nonce,
                "acknowledged"
            );
        }

        let Some(cache) = self.mux.cache_for(&request.type_url) else {
            warn!(
                stream = %self.ctx.id(),
                type_url = %request.type_url,
                "no cache registered for requested type"
            );
            return (None, None);
        };
        let cache = Arc::clone(cache);

        let newly_subscribed = if self.subscriptions.contains_key(&request.type_url) {
            None
        } else {
            self.subscriptions
                .insert(request.type_url.clone(), Subscription::default());
            Some(Arc::clone(&cache))
        };

        let subscription = self
            .subscriptions
            .get_mut(&request.type_url)
            .expect("subscription inserted above");

        let names_changed = subscription.names != request.resource_names;
        subscription.names.clone_from(&request.resource_names);

        let (version, resources) = cache.fetch(&subscription.names);
        if !names_changed && subscription.sent_version == Some(version) {
            return (None, newly_subscribed);
        }
        subscription.sent_version = Some(version);

        let response = self.build_response(&request.type_url, version, resources);
        (Some(response), newly_subscribed)
    }

    /// React to a cache version change for a subscribed type.
    pub(crate) fn handle_wake(&mut self, type_url: &str) -> Option<DiscoveryResponse> {
        let subscription = self.subscriptions.get_mut(type_url)?;
        let cache = self.mux.cache_for(type_url)?;

        let (version, resources) = cache.fetch(&subscription.names);
        if subscription.sent_version == Some(version) {
            return None;
        }
        subscription.sent_version = Some(version);

        Some(self.build_response(type_url, version, resources))
    }

    fn build_response(
        &mut self,
        type_url: &str,
        version: u64,
        resources: Vec<prost_types::Any>,
    ) -> DiscoveryResponse {
        self.nonce += 1;
        self.ctx.record_response();

        info!(
            stream = %self.ctx.id(),
            type_url = %type_url,
            version = version,
            count = resources.len(),
            "sending discovery response"
        );

        DiscoveryResponse {
            version_info: version.to_string(),
            resources,
            canary: false,
            type_url: type_url.to_owned(),
            nonce: format!("{}-{}", self.ctx.id(), self.nonce),
        }
    }
}

/// Run a discovery stream to completion: answer requests and push updates
/// until the client goes away.
pub(crate) async fn drive_stream(
    mux: Arc<MuxCache>,
    mut requests: Streaming<DiscoveryRequest>,
    responses: mpsc::Sender<Result<DiscoveryResponse, Status>>,
) {
    let mut driver = SotwDriver::new(mux);
    let mut wakeups: StreamMap<String, WatchStream<u64>> = StreamMap::new();

    info!(stream = %driver.ctx().id(), "discovery stream started");

    loop {
        tokio::select! {
            request = requests.next() => {
                match request {
                    Some(Ok(request)) => {
                        let type_url = request.type_url.clone();
                        let (response, subscribe) = driver.handle_request(&request);
                        if let Some(cache) = subscribe {
                            wakeups.insert(type_url, WatchStream::new(cache.subscribe()));
                        }
                        if let Some(response) = response {
                            if responses.send(Ok(response)).await.is_err() {
                                debug!(stream = %driver.ctx().id(), "client disconnected");
                                break;
                            }
                        }
                    }
                    Some(Err(status)) => {
                        warn!(stream = %driver.ctx().id(), error = %status, "request stream error");
                        break;
                    }
                    None => break,
                }
            }
            Some((type_url, _version)) = wakeups.next(), if !wakeups.is_empty() => {
                if let Some(response) = driver.handle_wake(&type_url) {
                    if responses.send(Ok(response)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    info!(
        stream = %driver.ctx().id(),
        duration = ?driver.ctx().duration(),
        requests = driver.ctx().request_count(),
        responses = driver.ctx().response_count(),
        "discovery stream ended"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use cruiser_envoy::cluster::Cluster;
    use cruiser_envoy::{ResourceProto, TypeUrl};

    fn mux_with_cluster(names: &[&str]) -> (Arc<MuxCache>, Arc<LinearCache>) {
        let cache = Arc::new(LinearCache::new(TypeUrl::CLUSTER));
        let updates = names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    Cluster {
                        name: n.to_string(),
                        ..Default::default()
                    }
                    .to_any(),
                )
            })
            .collect();
        cache.update_resources(updates, vec![]).unwrap();
        let mux = Arc::new(MuxCache::new().with_cache(Arc::clone(&cache)));
        (mux, cache)
    }

    fn request(type_url: &str, version: &str, nonce: &str) -> DiscoveryRequest {
        DiscoveryRequest {
            version_info: version.into(),
            type_url: type_url.into(),
            response_nonce: nonce.into(),
            ..Default::default()
        }
    }

    #[test]
    fn first_request_gets_full_set_and_subscribes() {
        let (mux, _cache) = mux_with_cluster(&["a", "b"]);
        let mut driver = SotwDriver::new(mux);

        let (response, subscribe) = driver.handle_request(&request(TypeUrl::CLUSTER, "", ""));
        let response = response.expect("initial response");
        assert_eq!(response.version_info, "1");
        assert_eq!(response.resources.len(), 2);
        assert_eq!(response.type_url, TypeUrl::CLUSTER);
        assert!(subscribe.is_some());
    }

    #[test]
    fn ack_of_current_version_is_silent() {
        let (mux, _cache) = mux_with_cluster(&["a"]);
        let mut driver = SotwDriver::new(mux);

        let (first, _) = driver.handle_request(&request(TypeUrl::CLUSTER, "", ""));
        let nonce = first.expect("initial response").nonce;

        let (ack, subscribe) = driver.handle_request(&request(TypeUrl::CLUSTER, "1", &nonce));
        assert!(ack.is_none());
        assert!(subscribe.is_none());
    }

    #[test]
    fn wake_sends_only_on_new_version() {
        let (mux, cache) = mux_with_cluster(&["a"]);
        let mut driver = SotwDriver::new(mux);
        driver.handle_request(&request(TypeUrl::CLUSTER, "", ""));

        // No change since the response: the primed watch value is deduped.
        assert!(driver.handle_wake(TypeUrl::CLUSTER).is_none());

        cache
            .update_resources(
                [(
                    "b".to_string(),
                    Cluster {
                        name: "b".into(),
                        ..Default::default()
                    }
                    .to_any(),
                )]
                .into(),
                vec![],
            )
            .unwrap();

        let woken = driver.handle_wake(TypeUrl::CLUSTER).expect("new version");
        assert_eq!(woken.version_info, "2");
        assert_eq!(woken.resources.len(), 2);
    }

    #[test]
    fn unknown_type_is_parked() {
        let (mux, _cache) = mux_with_cluster(&["a"]);
        let mut driver = SotwDriver::new(mux);

        let (response, subscribe) = driver.handle_request(&request(TypeUrl::SECRET, "", ""));
        assert!(response.is_none());
        assert!(subscribe.is_none());
    }

    #[test]
    fn name_filter_narrows_response() {
        let (mux, _cache) = mux_with_cluster(&["a", "b"]);
        let mut driver = SotwDriver::new(mux);

        let mut req = request(TypeUrl::CLUSTER, "", "");
        req.resource_names = vec!["a".into()];
        let (response, _) = driver.handle_request(&req);
        assert_eq!(response.expect("response").resources.len(), 1);

        // Same version but widened names: respond again.
        let mut req = request(TypeUrl::CLUSTER, "1", "n");
        req.resource_names = vec![];
        let (response, _) = driver.handle_request(&req);
        assert_eq!(response.expect("response").resources.len(), 2);
    }

    #[test]
    fn nack_does_not_resend_same_version() {
        let (mux, _cache) = mux_with_cluster(&["a"]);
        let mut driver = SotwDriver::new(mux);
        let (first, _) = driver.handle_request(&request(TypeUrl::CLUSTER, "", ""));
        let nonce = first.expect("initial").nonce;

        let mut nack = request(TypeUrl::CLUSTER, "", &nonce);
        nack.error_detail = Some(cruiser_envoy::discovery::RpcStatus {
            code: 3,
            message: "bad config".into(),
        });
        let (response, _) = driver.handle_request(&nack);
        assert!(response.is_none());
    }
}
