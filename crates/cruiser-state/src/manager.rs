//! Periodic state synchronization.
//!
//! The manager drives one sync cycle per interval: fetch the tfstate
//! documents, and when anything changed, run every enabled projection in
//! parallel (each ingests all documents, then builds), joining them all
//! before the next cycle. Any error ends the run; the process supervisor
//! treats that as fatal and restarts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cruiser_core::Tfstate;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{StateError, TfstateSource};

/// Default interval between sync cycles.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// A state projection fed by the manager.
///
/// `read_from_tfstate` buffers decoded resources; `build` atomically swaps
/// the buffered set into the readable snapshot and publishes it.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Ingest one document into the projection's buffer.
    fn read_from_tfstate(&self, tfstate: &Tfstate) -> Result<(), StateError>;

    /// Build and publish a snapshot from the buffered documents.
    async fn build(&self) -> Result<(), StateError>;
}

/// The periodic sync loop over a tfstate source and its projections.
pub struct StateManager {
    source: Box<dyn TfstateSource>,
    projections: Vec<Arc<dyn Projection>>,
    interval: Duration,
}

impl StateManager {
    /// Start building a manager.
    pub fn builder() -> StateManagerBuilder {
        StateManagerBuilder::default()
    }

    /// Run sync cycles until cancelled or failed.
    ///
    /// Returns `Ok(())` on cancellation. Any source or projection error ends
    /// the run with that error; the system is restart-oriented and the
    /// supervisor decides what to do with a dead sync loop.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), StateError> {
        info!(interval = ?self.interval, projections = self.projections.len(), "state manager started");

        loop {
            if let Some(documents) = self.source.get_tfstate().await? {
                self.sync(documents).await?;
            } else {
                debug!("tfstate unchanged");
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("state manager stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Run one cycle: every projection ingests all documents and builds, in
    /// parallel, with a barrier before returning.
    async fn sync(&self, documents: Vec<Tfstate>) -> Result<(), StateError> {
        debug!(documents = documents.len(), "tfstate changed, rebuilding projections");
        let documents = Arc::new(documents);

        let mut tasks = JoinSet::new();
        for projection in &self.projections {
            let projection = Arc::clone(projection);
            let documents = Arc::clone(&documents);
            tasks.spawn(async move {
                for document in documents.iter() {
                    projection.read_from_tfstate(document)?;
                }
                projection.build().await?;
                debug!(projection = projection.name(), "projection rebuilt");
                Ok::<(), StateError>(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| StateError::Task(e.to_string()))??;
        }
        Ok(())
    }
}

/// Builder for [`StateManager`].
#[derive(Default)]
pub struct StateManagerBuilder {
    source: Option<Box<dyn TfstateSource>>,
    projections: Vec<Arc<dyn Projection>>,
    interval: Option<Duration>,
}

impl StateManagerBuilder {
    /// Set the tfstate source.
    #[must_use]
    pub fn tfstate_source(mut self, source: impl TfstateSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Enable a projection.
    #[must_use]
    pub fn projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projections.push(projection);
        self
    }

    /// Override the sync interval (default 5s).
    #[must_use]
    pub fn periodic_sync_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Build the manager.
    pub fn build(self) -> Result<StateManager, StateError> {
        let source = self
            .source
            .ok_or_else(|| StateError::Configuration("no tfstate source selected".into()))?;
        if self.projections.is_empty() {
            return Err(StateError::Configuration("no projections enabled".into()));
        }
        Ok(StateManager {
            source,
            projections: self.projections,
            interval: self.interval.unwrap_or(DEFAULT_SYNC_INTERVAL),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        payloads: Vec<Option<Vec<Tfstate>>>,
    }

    #[async_trait]
    impl TfstateSource for StubSource {
        async fn get_tfstate(&mut self) -> Result<Option<Vec<Tfstate>>, StateError> {
            if self.payloads.is_empty() {
                return Ok(None);
            }
            Ok(self.payloads.remove(0))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TfstateSource for FailingSource {
        async fn get_tfstate(&mut self) -> Result<Option<Vec<Tfstate>>, StateError> {
            Err(StateError::source_error(std::io::Error::other("listing failed")))
        }
    }

    #[derive(Default)]
    struct RecordingProjection {
        reads: AtomicUsize,
        builds: AtomicUsize,
    }

    #[async_trait]
    impl Projection for RecordingProjection {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn read_from_tfstate(&self, _tfstate: &Tfstate) -> Result<(), StateError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn build(&self) -> Result<(), StateError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn documents(n: usize) -> Vec<Tfstate> {
        (0..n).map(|_| Tfstate::default()).collect()
    }

    #[tokio::test]
    async fn changed_documents_rebuild_every_projection() {
        let first = Arc::new(RecordingProjection::default());
        let second = Arc::new(RecordingProjection::default());

        let manager = StateManager::builder()
            .tfstate_source(StubSource {
                payloads: vec![Some(documents(2)), None],
            })
            .projection(Arc::clone(&first) as Arc<dyn Projection>)
            .projection(Arc::clone(&second) as Arc<dyn Projection>)
            .periodic_sync_interval(Duration::from_millis(10))
            .build()
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(manager.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        // Two documents ingested once each, one build, per projection.
        assert_eq!(first.reads.load(Ordering::SeqCst), 2);
        assert_eq!(first.builds.load(Ordering::SeqCst), 1);
        assert_eq!(second.reads.load(Ordering::SeqCst), 2);
        assert_eq!(second.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn source_error_ends_the_run() {
        let manager = StateManager::builder()
            .tfstate_source(FailingSource)
            .projection(Arc::new(RecordingProjection::default()) as Arc<dyn Projection>)
            .build()
            .unwrap();

        let err = manager
            .run(CancellationToken::new())
            .await
            .expect_err("source failure is fatal");
        assert!(matches!(err, StateError::Source(_)));
    }

    #[test]
    fn builder_requires_source_and_projections() {
        assert!(matches!(
            StateManager::builder().build(),
            Err(StateError::Configuration(_))
        ));

        let no_projection = StateManager::builder()
            .tfstate_source(StubSource { payloads: vec![] })
            .build();
        assert!(matches!(no_projection, Err(StateError::Configuration(_))));
    }
}
