//! Hot-swappable handler.
//!
//! The HTTP listener keeps serving one [`SwapHandler`] for its whole
//! lifetime; route snapshot rotations swap the inner handler out from under
//! it. A dedicated loop drains the swap channel and stores the latest
//! handler into an atomic slot, so readers never lock: they load whatever
//! handler is current at dispatch time, and a stale read is harmless because
//! consecutive route snapshots are compatible from the client's perspective.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::handler::{full_body, HttpHandler, HttpRequest, HttpResponse};
use crate::ServerError;

/// Sized cell for the current handler; the atomic slot needs a thin pointer.
struct CurrentHandler(Arc<dyn HttpHandler>);

/// Atomic handler replacement.
pub struct SwapHandler {
    slot: Arc<ArcSwapOption<CurrentHandler>>,
    swap_tx: Mutex<Option<mpsc::Sender<Arc<dyn HttpHandler>>>>,
}

impl SwapHandler {
    /// Create the handler and start its assignment loop.
    ///
    /// Until the first swap, requests are answered with `503`.
    pub fn new() -> Arc<Self> {
        let slot: Arc<ArcSwapOption<CurrentHandler>> = Arc::new(ArcSwapOption::const_empty());
        let (swap_tx, mut swap_rx) = mpsc::channel::<Arc<dyn HttpHandler>>(1);

        let assign_slot = Arc::clone(&slot);
        tokio::spawn(async move {
            while let Some(handler) = swap_rx.recv().await {
                assign_slot.store(Some(Arc::new(CurrentHandler(handler))));
                debug!("handler swapped");
            }
        });

        Arc::new(Self {
            slot,
            swap_tx: Mutex::new(Some(swap_tx)),
        })
    }

    /// Install a new handler. Waits until the assignment loop has taken it.
    pub async fn swap(&self, handler: Arc<dyn HttpHandler>) -> Result<(), ServerError> {
        let sender = self
            .swap_tx
            .lock()
            .expect("swap lock poisoned")
            .clone()
            .ok_or(ServerError::SwapClosed)?;
        sender
            .send(handler)
            .await
            .map_err(|_| ServerError::SwapClosed)
    }

    /// Close the swap channel and stop the assignment loop. The current
    /// handler keeps serving.
    pub fn close(&self) {
        self.swap_tx.lock().expect("swap lock poisoned").take();
    }
}

#[async_trait]
impl HttpHandler for SwapHandler {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        match self.slot.load_full() {
            Some(current) => current.0.handle(request).await,
            None => http::Response::builder()
                .status(http::StatusCode::SERVICE_UNAVAILABLE)
                .body(full_body("service unavailable"))
                .expect("static response"),
        }
    }
}
