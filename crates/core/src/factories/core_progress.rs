//! The core progress manager.
//!
//! ### State layout
//!
//! Every entity lives in one [MemStateStore] under a key derived from its
//! identifiers:
//!
//! - task: `t:{task}`
//! - client session: `c:{len(task)}:{task}:{client}`
//! - peer: `p:{peer}`
//! - piece: `x:{len(task)}:{task}:{index}`
//!
//! The task length prefix keeps composed keys unambiguous for arbitrary
//! caller supplied ids.
//!
//! ### Updates
//!
//! Entities are immutable snapshots. Each mutation builds a fresh
//! snapshot from the current one and swaps it in with a single atomic
//! store operation, so concurrent readers only ever see whole snapshots
//! and concurrent writers to the same entity are serialized per key.
//! Operations that touch two entities (e.g. a piece report also updating
//! the reporter's bitmap) are atomic per entity, not across both.

use crate::factories::mem_state_store::MemStateStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use supernode_api::*;

/// CoreProgressMgr configuration types.
pub mod config {
    /// Configuration parameters for
    /// [CoreProgressMgrFactory](super::CoreProgressMgrFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreProgressConfig {
        /// The largest piece count a task may declare.
        ///
        /// Default: 1048576.
        pub max_piece_count: u32,
    }

    impl Default for CoreProgressConfig {
        fn default() -> Self {
            Self {
                max_piece_count: 1 << 20,
            }
        }
    }

    /// Module-level configuration for CoreProgressMgr.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreProgressModConfig {
        /// CoreProgressMgr configuration.
        pub core_progress: CoreProgressConfig,
    }
}

pub use config::*;

/// A production-ready progress manager factory.
#[derive(Debug)]
pub struct CoreProgressMgrFactory {}

impl CoreProgressMgrFactory {
    /// Construct a new CoreProgressMgrFactory.
    pub fn create() -> DynProgressMgrFactory {
        let out: DynProgressMgrFactory = Arc::new(Self {});
        out
    }
}

impl ProgressMgrFactory for CoreProgressMgrFactory {
    fn default_config(&self, config: &mut Config) -> SnResult<()> {
        config.set_module_config(&CoreProgressModConfig::default())
    }

    fn validate_config(&self, config: &Config) -> SnResult<()> {
        let config: CoreProgressModConfig = config.get_module_config()?;
        if config.core_progress.max_piece_count == 0 {
            return Err(SnError::other(
                "coreProgress.maxPieceCount must be greater than zero",
            ));
        }
        Ok(())
    }

    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, SnResult<DynProgressMgr>> {
        Box::pin(async move {
            let config: CoreProgressModConfig =
                builder.config.get_module_config()?;
            let out: DynProgressMgr = Arc::new(CoreProgressMgr::new(
                config.core_progress,
                system_clock(),
            ));
            Ok(out)
        })
    }
}

fn task_key(task_id: &TaskId) -> String {
    format!("t:{task_id}")
}

fn client_key(task_id: &TaskId, client_id: &ClientId) -> String {
    format!("c:{}:{task_id}:{client_id}", task_id.len())
}

fn peer_key(peer_id: &PeerId) -> String {
    format!("p:{peer_id}")
}

fn piece_key(task_id: &TaskId, piece_index: u32) -> String {
    format!("x:{}:{task_id}:{piece_index}", task_id.len())
}

fn check_id(what: &str, id: &str) -> SnResult<()> {
    if id.is_empty() {
        return Err(SnError::invalid(format!("empty {what} id")));
    }
    Ok(())
}

fn check_piece(task: &SuperState, piece_index: u32) -> SnResult<()> {
    if piece_index >= task.piece_count {
        return Err(SnError::invalid(format!(
            "piece index {piece_index} out of range for task {} with {} pieces",
            task.task_id, task.piece_count
        )));
    }
    Ok(())
}

/// Type confusion inside the store is a bug, make sure it is loud.
fn log_internal(err: &SnError) {
    if err.is_internal() {
        tracing::error!(?err, "progress state corrupted");
    }
}

/// The production [ProgressMgr].
pub struct CoreProgressMgr {
    config: CoreProgressConfig,
    store: MemStateStore,
    clock: DynClock,
}

impl std::fmt::Debug for CoreProgressMgr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreProgressMgr")
            .field("config", &self.config)
            .field("entries", &self.store.len())
            .finish()
    }
}

impl CoreProgressMgr {
    /// Construct a new progress manager reading time from `clock`.
    pub fn new(config: CoreProgressConfig, clock: DynClock) -> Self {
        Self {
            config,
            store: MemStateStore::new(),
            clock,
        }
    }

    fn now(&self) -> Timestamp {
        (self.clock)()
    }

    fn get<T: StateVariant>(&self, key: &str) -> SnResult<Arc<T>> {
        self.store.get_typed(key).inspect_err(log_internal)
    }

    fn update<T, F>(&self, key: &str, f: F) -> SnResult<Arc<T>>
    where
        T: StateVariant,
        F: FnOnce(&T) -> SnResult<T>,
    {
        self.store.update(key, f).inspect_err(log_internal)
    }

    fn remove<T: StateVariant>(&self, key: &str) -> SnResult<Arc<T>> {
        self.store.remove_typed(key).inspect_err(log_internal)
    }

    fn task(&self, task_id: &TaskId) -> SnResult<Arc<SuperState>> {
        check_id("task", task_id)?;
        self.get(&task_key(task_id))
    }

    fn checked_client_key(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<String> {
        check_id("task", task_id)?;
        check_id("client", client_id)?;
        Ok(client_key(task_id, client_id))
    }

    fn checked_peer_key(&self, peer_id: &PeerId) -> SnResult<String> {
        check_id("peer", peer_id)?;
        Ok(peer_key(peer_id))
    }

    fn set_client_status(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
        status: ClientStatus,
        active: Option<Timestamp>,
    ) -> SnResult<()> {
        let key = self.checked_client_key(task_id, client_id)?;
        self.update(&key, |c: &ClientState| {
            Ok(ClientState {
                status,
                last_active: active.unwrap_or(c.last_active),
                ..c.clone()
            })
        })?;
        tracing::debug!(%task_id, %client_id, ?status, "client status");
        Ok(())
    }

    fn set_peer_status(
        &self,
        peer_id: &PeerId,
        status: PeerStatus,
        heartbeat: Option<Timestamp>,
    ) -> SnResult<()> {
        let key = self.checked_peer_key(peer_id)?;
        let p = self.update(&key, |p: &PeerState| {
            Ok(PeerState {
                status,
                last_heartbeat: heartbeat.unwrap_or(p.last_heartbeat),
                ..p.clone()
            })
        })?;
        tracing::debug!(%peer_id, task_id = %p.task_id, ?status, "peer status");
        Ok(())
    }

    /// Bitmap merge shared by piece reports and explicit bitmap updates.
    fn merge_peer_pieces(
        &self,
        key: &str,
        piece_indices: &[u32],
        now: Timestamp,
    ) -> SnResult<Arc<PeerState>> {
        self.update(key, |p: &PeerState| {
            let mut p = p.clone();
            p.pieces.extend(piece_indices.iter().copied());
            p.last_heartbeat = now;
            if p.status == PeerStatus::Registered {
                p.status = PeerStatus::Running;
            }
            Ok(p)
        })
    }

    /// A piece record was created, bump the task's counter.
    fn count_recorded_piece(&self, task_id: &TaskId) -> SnResult<()> {
        match self.update(&task_key(task_id), |t: &SuperState| {
            Ok(SuperState {
                recorded_pieces: t.recorded_pieces + 1,
                ..t.clone()
            })
        }) {
            Ok(_) => Ok(()),
            // removed concurrently, the cascade owns the piece now
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn available(&self, task: &SuperState) -> SnResult<BTreeSet<u32>> {
        if task.recorded_pieces == 0 {
            return Ok(BTreeSet::new());
        }
        if task.is_complete() {
            return Ok((0..task.piece_count).collect());
        }

        let mut out = BTreeSet::new();
        for index in 0..task.piece_count {
            if out.len() as u32 >= task.recorded_pieces {
                break;
            }
            match self.get::<PieceState>(&piece_key(&task.task_id, index)) {
                Ok(_) => {
                    out.insert(index);
                }
                Err(err) if err.is_not_found() => (),
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}

impl ProgressMgr for CoreProgressMgr {
    fn register_task(
        &self,
        task_id: TaskId,
        total_size: u64,
        piece_count: u32,
    ) -> SnResult<Arc<SuperState>> {
        check_id("task", &task_id)?;
        if piece_count == 0 || piece_count > self.config.max_piece_count {
            return Err(SnError::invalid(format!(
                "task {task_id} piece count {piece_count} not in 1..={}",
                self.config.max_piece_count
            )));
        }
        if total_size < piece_count as u64 {
            return Err(SnError::invalid(format!(
                "task {task_id} size {total_size} smaller than piece count {piece_count}"
            )));
        }

        let now = self.now();
        let out = self
            .store
            .upsert(&task_key(&task_id), |cur: Option<&Arc<SuperState>>| {
                match cur {
                    Some(cur)
                        if cur.total_size == total_size
                            && cur.piece_count == piece_count =>
                    {
                        Ok(cur.clone())
                    }
                    Some(cur) => Err(SnError::invalid(format!(
                        "task {task_id} already registered with size {} and {} pieces",
                        cur.total_size, cur.piece_count
                    ))),
                    None => Ok(Arc::new(SuperState {
                        task_id: task_id.clone(),
                        total_size,
                        piece_count,
                        cdn_status: CdnStatus::NotStarted,
                        created_at: now,
                        recorded_pieces: 0,
                    })),
                }
            })
            .inspect_err(log_internal)?;

        tracing::debug!(%task_id, total_size, piece_count, "task registered");
        Ok(out)
    }

    fn update_task_cdn_status(
        &self,
        task_id: &TaskId,
        status: CdnStatus,
    ) -> SnResult<()> {
        check_id("task", task_id)?;
        self.update(&task_key(task_id), |t: &SuperState| {
            Ok(SuperState {
                cdn_status: status,
                ..t.clone()
            })
        })?;
        tracing::debug!(%task_id, ?status, "task cdn status");
        Ok(())
    }

    fn remove_task(&self, task_id: &TaskId) -> SnResult<()> {
        check_id("task", task_id)?;
        self.remove::<SuperState>(&task_key(task_id))?;

        let scoped = self.store.remove_where(|v| v.task_id() == task_id);

        tracing::debug!(%task_id, scoped, "task removed");
        Ok(())
    }

    fn get_task(&self, task_id: &TaskId) -> SnResult<Arc<SuperState>> {
        self.task(task_id)
    }

    fn register_client(
        &self,
        task_id: TaskId,
        client_id: ClientId,
    ) -> SnResult<()> {
        let key = self.checked_client_key(&task_id, &client_id)?;
        self.task(&task_id)?;

        let now = self.now();
        self.store.add(
            &key,
            ClientState {
                client_id: client_id.clone(),
                task_id: task_id.clone(),
                started_at: now,
                last_active: now,
                status: ClientStatus::Active,
            }
            .into(),
        )?;

        tracing::debug!(%task_id, %client_id, "client registered");
        Ok(())
    }

    fn touch_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<()> {
        let key = self.checked_client_key(task_id, client_id)?;
        let now = self.now();
        self.update(&key, |c: &ClientState| {
            Ok(ClientState {
                last_active: now,
                ..c.clone()
            })
        })?;
        tracing::trace!(%task_id, %client_id, "client heartbeat");
        Ok(())
    }

    fn finish_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<()> {
        self.set_client_status(
            task_id,
            client_id,
            ClientStatus::Finished,
            Some(self.now()),
        )
    }

    fn fail_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<()> {
        self.set_client_status(task_id, client_id, ClientStatus::Failed, None)
    }

    fn remove_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<()> {
        let key = self.checked_client_key(task_id, client_id)?;
        self.remove::<ClientState>(&key)?;
        tracing::debug!(%task_id, %client_id, "client removed");
        Ok(())
    }

    fn get_client(
        &self,
        task_id: &TaskId,
        client_id: &ClientId,
    ) -> SnResult<Arc<ClientState>> {
        let key = self.checked_client_key(task_id, client_id)?;
        self.get(&key)
    }

    fn stale_clients(&self, cutoff: Timestamp) -> Vec<Arc<ClientState>> {
        self.store.collect(|c: &ClientState| c.last_active < cutoff)
    }

    fn register_peer(
        &self,
        task_id: TaskId,
        peer_id: PeerId,
        location: &str,
    ) -> SnResult<()> {
        check_id("task", &task_id)?;
        let key = self.checked_peer_key(&peer_id)?;
        if location.is_empty() {
            return Err(SnError::invalid(format!(
                "empty location for peer {peer_id}"
            )));
        }
        self.task(&task_id)?;

        let now = self.now();
        self.store
            .upsert(&key, |cur: Option<&Arc<PeerState>>| {
                if let Some(cur) = cur {
                    tracing::debug!(
                        %peer_id,
                        prev_task_id = %cur.task_id,
                        "peer re-registered, replacing previous state"
                    );
                }
                Ok(Arc::new(PeerState {
                    peer_id: peer_id.clone(),
                    task_id: task_id.clone(),
                    location: location.into(),
                    pieces: BTreeSet::new(),
                    last_heartbeat: now,
                    status: PeerStatus::Registered,
                }))
            })
            .inspect_err(log_internal)?;

        tracing::debug!(%task_id, %peer_id, %location, "peer registered");
        Ok(())
    }

    fn update_peer_pieces(
        &self,
        peer_id: &PeerId,
        piece_indices: &[u32],
    ) -> SnResult<()> {
        let key = self.checked_peer_key(peer_id)?;
        let peer = self.get::<PeerState>(&key)?;
        let task = self.task(&peer.task_id)?;
        for &index in piece_indices {
            check_piece(&task, index)?;
        }

        let now = self.now();
        let p = self.merge_peer_pieces(&key, piece_indices, now)?;

        tracing::trace!(%peer_id, held = p.pieces.len(), "peer pieces");
        Ok(())
    }

    fn touch_peer(&self, peer_id: &PeerId) -> SnResult<()> {
        let key = self.checked_peer_key(peer_id)?;
        let now = self.now();
        let p = self.update(&key, |p: &PeerState| {
            let status = match p.status {
                PeerStatus::Disappeared => PeerStatus::Running,
                s => s,
            };
            Ok(PeerState {
                last_heartbeat: now,
                status,
                ..p.clone()
            })
        })?;
        tracing::trace!(%peer_id, status = ?p.status, "peer heartbeat");
        Ok(())
    }

    fn finish_peer(&self, peer_id: &PeerId) -> SnResult<()> {
        self.set_peer_status(peer_id, PeerStatus::Finished, Some(self.now()))
    }

    fn fail_peer(&self, peer_id: &PeerId) -> SnResult<()> {
        self.set_peer_status(peer_id, PeerStatus::Failed, None)
    }

    fn disappear_peer(&self, peer_id: &PeerId) -> SnResult<()> {
        let key = self.checked_peer_key(peer_id)?;
        let p = self.update(&key, |p: &PeerState| {
            let status = match p.status {
                s @ (PeerStatus::Failed | PeerStatus::Finished) => s,
                _ => PeerStatus::Disappeared,
            };
            Ok(PeerState {
                status,
                ..p.clone()
            })
        })?;
        tracing::debug!(%peer_id, status = ?p.status, "peer disappeared");
        Ok(())
    }

    fn remove_peer(&self, peer_id: &PeerId) -> SnResult<()> {
        let key = self.checked_peer_key(peer_id)?;
        let p = self.remove::<PeerState>(&key)?;
        tracing::debug!(%peer_id, task_id = %p.task_id, "peer removed");
        Ok(())
    }

    fn get_peer(&self, peer_id: &PeerId) -> SnResult<Arc<PeerState>> {
        let key = self.checked_peer_key(peer_id)?;
        self.get(&key)
    }

    fn list_peers(&self, task_id: &TaskId) -> SnResult<Vec<Arc<PeerState>>> {
        self.task(task_id)?;
        let mut out = self
            .store
            .collect(|p: &PeerState| &p.task_id == task_id);
        out.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        Ok(out)
    }

    fn stale_peers(&self, cutoff: Timestamp) -> Vec<Arc<PeerState>> {
        self.store.collect(|p: &PeerState| p.last_heartbeat < cutoff)
    }

    fn record_piece(
        &self,
        task_id: &TaskId,
        piece_index: u32,
        checksum: &str,
        source_peer: &PeerId,
    ) -> SnResult<()> {
        let task = self.task(task_id)?;
        let reporter_key = self.checked_peer_key(source_peer)?;
        if checksum.is_empty() {
            return Err(SnError::invalid(format!(
                "empty checksum for task {task_id} piece {piece_index}"
            )));
        }
        check_piece(&task, piece_index)?;

        let peer = self.get::<PeerState>(&reporter_key)?;
        if &peer.task_id != task_id {
            return Err(SnError::invalid(format!(
                "peer {source_peer} is registered for task {}, not {task_id}",
                peer.task_id
            )));
        }

        let key = piece_key(task_id, piece_index);
        let mut created = false;
        let res = self.store.upsert(&key, |cur: Option<&Arc<PieceState>>| {
            let Some(cur) = cur else {
                created = true;
                return Ok(Arc::new(PieceState {
                    piece_index,
                    task_id: task_id.clone(),
                    checksum: checksum.into(),
                    size: task.piece_size(piece_index),
                    last_source: source_peer.clone(),
                    sources: BTreeSet::from([source_peer.clone()]),
                }));
            };

            if &*cur.checksum != checksum {
                return Err(SnError::ChecksumMismatch {
                    task: task_id.0.clone(),
                    piece: piece_index,
                    recorded: cur.checksum.clone(),
                    reported: checksum.into(),
                });
            }

            if &cur.last_source == source_peer {
                return Ok(cur.clone());
            }

            let mut next = (**cur).clone();
            next.sources.insert(source_peer.clone());
            next.last_source = source_peer.clone();
            Ok(Arc::new(next))
        });

        let piece = match res {
            Ok(piece) => piece,
            Err(err @ SnError::ChecksumMismatch { .. }) => {
                tracing::warn!(?err, %source_peer, "disputed piece report");
                return Err(err);
            }
            Err(err) => {
                log_internal(&err);
                return Err(err);
            }
        };

        if created {
            self.count_recorded_piece(task_id)?;
        }

        let now = self.now();
        match self.merge_peer_pieces(&reporter_key, &[piece_index], now) {
            Ok(_) => (),
            // the peer went away after we validated it, the piece record
            // stands and source selection skips missing peers
            Err(err) if err.is_not_found() => {
                tracing::debug!(
                    %source_peer,
                    "piece reporter removed concurrently"
                );
            }
            Err(err) => return Err(err),
        }

        tracing::trace!(
            %task_id,
            piece_index,
            %source_peer,
            sources = piece.sources.len(),
            "piece recorded"
        );
        Ok(())
    }

    fn get_piece(
        &self,
        task_id: &TaskId,
        piece_index: u32,
    ) -> SnResult<Arc<PieceState>> {
        let task = self.task(task_id)?;
        check_piece(&task, piece_index)?;
        self.get(&piece_key(task_id, piece_index))
    }

    fn piece_sources(
        &self,
        task_id: &TaskId,
        piece_index: u32,
    ) -> SnResult<BTreeSet<PeerId>> {
        Ok(self.get_piece(task_id, piece_index)?.sources.clone())
    }

    fn get_peer_bitmap(&self, peer_id: &PeerId) -> SnResult<BTreeSet<u32>> {
        Ok(self.get_peer(peer_id)?.pieces.clone())
    }

    fn get_missing_pieces(
        &self,
        peer_id: &PeerId,
    ) -> SnResult<BTreeSet<u32>> {
        let peer = self.get_peer(peer_id)?;
        let task = self.task(&peer.task_id)?;
        Ok(peer.missing(task.piece_count))
    }

    fn list_available_pieces(
        &self,
        task_id: &TaskId,
    ) -> SnResult<BTreeSet<u32>> {
        let task = self.task(task_id)?;
        self.available(&task)
    }

    fn is_task_complete(&self, task_id: &TaskId) -> SnResult<bool> {
        Ok(self.task(task_id)?.is_complete())
    }

    fn pick_source_peer(
        &self,
        task_id: &TaskId,
        piece_index: u32,
    ) -> SnResult<PeerId> {
        let task = self.task(task_id)?;
        check_piece(&task, piece_index)?;

        let no_source = || SnError::NoSourceAvailable {
            task: task_id.0.clone(),
            piece: piece_index,
        };

        let piece =
            match self.get::<PieceState>(&piece_key(task_id, piece_index)) {
                Ok(piece) => piece,
                Err(err) if err.is_not_found() => return Err(no_source()),
                Err(err) => return Err(err),
            };

        let mut best: Option<Arc<PeerState>> = None;
        for peer_id in piece.sources.iter() {
            let peer = match self.get::<PeerState>(&peer_key(peer_id)) {
                Ok(peer) => peer,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            // a re-registered peer starts over with an empty bitmap and
            // must report the piece again before it is handed out
            if &peer.task_id != task_id
                || !peer.status.can_serve()
                || !peer.pieces.contains(&piece_index)
            {
                continue;
            }
            // sources iterate in ascending id order, so only a strictly
            // newer heartbeat displaces the current pick
            if best
                .as_ref()
                .map(|b| peer.last_heartbeat > b.last_heartbeat)
                .unwrap_or(true)
            {
                best = Some(peer);
            }
        }

        match best {
            Some(peer) => Ok(peer.peer_id.clone()),
            None => Err(no_source()),
        }
    }
}

#[cfg(test)]
mod test;
