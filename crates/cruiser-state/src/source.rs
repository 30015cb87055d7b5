//! Tfstate source contract.

use async_trait::async_trait;
use cruiser_core::Tfstate;

use crate::StateError;

/// A source of Terraform state documents.
///
/// `get_tfstate` returns `Ok(None)` when nothing changed since the previous
/// call, and the full set of current documents when anything did. A document
/// disappearing counts as a change. Sources are owned by the sync loop and
/// need no internal synchronization.
#[async_trait]
pub trait TfstateSource: Send + Sync {
    /// Fetch the current documents if anything changed.
    async fn get_tfstate(&mut self) -> Result<Option<Vec<Tfstate>>, StateError>;
}
