//! Progress-manager related types.
//!
//! The progress manager is the only component allowed to construct or
//! mutate task, client, peer and piece state. Lifecycle events from the
//! peer, task and CDN layers come in through the `register_*`, `touch_*`,
//! `*_peer`/`*_client` and `record_piece` operations, and the scheduler
//! reads derived views through the query operations.
//!
//! All operations are synchronous and in-memory. None of them block on
//! I/O, and none hold a lock across calls.

use crate::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Tracks task, client, peer and piece progress for the scheduler.
pub trait ProgressMgr: 'static + Send + Sync + std::fmt::Debug {
    // -- tasks -- //

    /// Register a task split into `piece_count` pieces.
    /// Re-registering with the same geometry returns the existing task,
    /// a conflicting size or piece count is an invalid argument.
    fn register_task(
        &self,
        task_id: TaskId,
        total_size: u64,
        piece_count: u32,
    ) -> SnResult<Arc<SuperState>>;

    /// Set the CDN seeding status of a task.
    fn update_task_cdn_status(
        &self,
        task_id: &TaskId,
        status: CdnStatus,
    ) -> SnResult<()>;

    /// Remove a task along with every client, peer and piece scoped by it.
    fn remove_task(&self, task_id: &TaskId) -> SnResult<()>;

    /// Get the current task snapshot.
    fn get_task(&self, task_id: &TaskId) -> SnResult<Arc<SuperState>>;

    // -- client sessions -- //

    /// Register a client download session for an existing task.
    fn register_client(
        &self,
        task_id: TaskId,
        client_id: ClientId,
    ) -> SnResult<()>;

    /// Record a client heartbeat.
    fn touch_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<()>;

    /// Mark a client session as finished.
    fn finish_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<()>;

    /// Mark a client session as failed.
    fn fail_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<()>;

    /// Remove a client session.
    fn remove_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<()>;

    /// Get the current client session snapshot.
    fn get_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<Arc<ClientState>>;

    /// Client sessions whose last activity is strictly before `cutoff`.
    fn stale_clients(&self, cutoff: Timestamp) -> Vec<Arc<ClientState>>;

    // -- peers -- //

    /// Register a peer serving `task_id` from `location`.
    /// Re-registering an existing peer replaces it (last writer wins).
    fn register_peer(
        &self,
        task_id: TaskId,
        peer_id: PeerId,
        location: &str,
    ) -> SnResult<()>;

    /// Merge `piece_indices` into the peer's ownership bitmap.
    /// The bitmap never shrinks.
    fn update_peer_pieces(
        &self,
        peer_id: &PeerId,
        piece_indices: &[u32],
    ) -> SnResult<()>;

    /// Record a peer heartbeat.
    fn touch_peer(&self, peer_id: &PeerId) -> SnResult<()>;

    /// Mark a peer as finished.
    fn finish_peer(&self, peer_id: &PeerId) -> SnResult<()>;

    /// Mark a peer as failed.
    fn fail_peer(&self, peer_id: &PeerId) -> SnResult<()>;

    /// Mark a peer as disappeared (stopped heartbeating).
    fn disappear_peer(&self, peer_id: &PeerId) -> SnResult<()>;

    /// Remove a peer.
    fn remove_peer(&self, peer_id: &PeerId) -> SnResult<()>;

    /// Get the current peer snapshot.
    fn get_peer(&self, peer_id: &PeerId) -> SnResult<Arc<PeerState>>;

    /// All peers registered for a task, ordered by peer id.
    fn list_peers(&self, task_id: &TaskId) -> SnResult<Vec<Arc<PeerState>>>;

    /// Peers whose last heartbeat is strictly before `cutoff`.
    fn stale_peers(&self, cutoff: Timestamp) -> Vec<Arc<PeerState>>;

    // -- pieces -- //

    /// Record that `source_peer` holds piece `piece_index` of `task_id`.
    ///
    /// The first report creates the piece and fixes its checksum. Later
    /// reports with the same checksum add the reporter to the piece's
    /// sources, a differing checksum fails with
    /// [SnError::ChecksumMismatch] and changes nothing.
    fn record_piece(
        &self,
        task_id: &TaskId,
        piece_index: u32,
        checksum: &str,
        source_peer: &PeerId,
    ) -> SnResult<()>;

    /// Get the current piece snapshot.
    fn get_piece(
        &self,
        task_id: &TaskId,
        piece_index: u32,
    ) -> SnResult<Arc<PieceState>>;

    /// Every peer that has confirmed holding a piece.
    fn piece_sources(
        &self,
        task_id: &TaskId,
        piece_index: u32,
    ) -> SnResult<BTreeSet<PeerId>>;

    // -- scheduler queries -- //

    /// The set of piece indices a peer holds.
    fn get_peer_bitmap(&self, peer_id: &PeerId) -> SnResult<BTreeSet<u32>>;

    /// The piece indices a peer still needs.
    fn get_missing_pieces(&self, peer_id: &PeerId)
        -> SnResult<BTreeSet<u32>>;

    /// Piece indices with at least one confirmed source.
    fn list_available_pieces(
        &self,
        task_id: &TaskId,
    ) -> SnResult<BTreeSet<u32>>;

    /// True iff every piece in `[0, piece_count)` has been recorded.
    fn is_task_complete(&self, task_id: &TaskId) -> SnResult<bool>;

    /// Pick one live peer holding a piece: the most recently active one,
    /// ties broken by the smallest peer id. Fails with
    /// [SnError::NoSourceAvailable] if nobody can serve it.
    fn pick_source_peer(
        &self,
        task_id: &TaskId,
        piece_index: u32,
    ) -> SnResult<PeerId>;
}

/// Trait-object [ProgressMgr].
pub type DynProgressMgr = Arc<dyn ProgressMgr>;

/// A factory for constructing [ProgressMgr] instances.
pub trait ProgressMgrFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut Config) -> SnResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &Config) -> SnResult<()>;

    /// Construct a progress manager instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, SnResult<DynProgressMgr>>;
}

/// Trait-object [ProgressMgrFactory].
pub type DynProgressMgrFactory = Arc<dyn ProgressMgrFactory>;
