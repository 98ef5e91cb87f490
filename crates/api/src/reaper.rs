//! Reaper related types.
//!
//! A reaper periodically expires peers and client sessions that stopped
//! heartbeating. It sits outside the progress manager and drives it only
//! through the public [ProgressMgr] operations.

use crate::*;
use std::sync::Arc;

/// Counts of the actions taken by one reaper pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    /// Active peers marked as disappeared.
    pub peers_disappeared: usize,
    /// Terminal peers removed.
    pub peers_removed: usize,
    /// Active client sessions marked as failed.
    pub clients_failed: usize,
    /// Terminal client sessions removed.
    pub clients_removed: usize,
}

/// Expires stale peers and client sessions.
pub trait Reaper: 'static + Send + Sync + std::fmt::Debug {
    /// Run one reaper pass right now.
    fn reap_now(&self) -> SnResult<ReapReport>;
}

/// Trait-object [Reaper].
pub type DynReaper = Arc<dyn Reaper>;

/// A factory for constructing [Reaper] instances.
pub trait ReaperFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut Config) -> SnResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &Config) -> SnResult<()>;

    /// Construct a reaper driving `progress`.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
        progress: DynProgressMgr,
    ) -> BoxFut<'static, SnResult<DynReaper>>;
}

/// Trait-object [ReaperFactory].
pub type DynReaperFactory = Arc<dyn ReaperFactory>;
