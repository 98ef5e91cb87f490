//! Task, client, peer and piece state entities.
//!
//! Entities are plain immutable snapshots. They are shared as `Arc<T>`,
//! and every update builds a new snapshot which replaces the old one
//! wholesale, so a reader never observes a half-applied mutation.

use crate::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Seeding status of a task's content on the CDN.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum CdnStatus {
    /// The CDN has not started fetching from the origin.
    #[default]
    NotStarted,
    /// The CDN is fetching from the origin.
    InProgress,
    /// The CDN holds the complete content.
    Complete,
    /// The CDN failed to fetch the content.
    Failed,
}

/// Status of a client download session.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ClientStatus {
    /// The session is downloading.
    #[default]
    Active,
    /// The session completed the download.
    Finished,
    /// The session gave up or timed out.
    Failed,
}

impl ClientStatus {
    /// True once the session can no longer make progress.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Lifecycle status of a peer.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum PeerStatus {
    /// Registered, has not reported any piece yet.
    #[default]
    Registered,
    /// Reporting pieces.
    Running,
    /// Holds the full content and is done downloading.
    Finished,
    /// Failed, never selected as a source again.
    Failed,
    /// Stopped heartbeating. A later heartbeat revives it.
    Disappeared,
}

impl PeerStatus {
    /// True if the peer may be handed out as a piece source.
    pub fn can_serve(&self) -> bool {
        !matches!(self, Self::Failed | Self::Disappeared)
    }

    /// True once the peer is no longer actively downloading.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Disappeared)
    }
}

/// One distribution task as seen by the supernode.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperState {
    /// The task.
    pub task_id: TaskId,
    /// Total content size in bytes.
    pub total_size: u64,
    /// Number of pieces the content is split into.
    pub piece_count: u32,
    /// CDN seeding status.
    pub cdn_status: CdnStatus,
    /// When the task was first registered.
    pub created_at: Timestamp,
    /// How many distinct pieces have been recorded so far.
    pub recorded_pieces: u32,
}

impl SuperState {
    /// Size of piece `index`. Every piece gets `total_size / piece_count`
    /// bytes and the last one also takes the remainder, so no piece is
    /// empty as long as `total_size >= piece_count`.
    pub fn piece_size(&self, index: u32) -> u64 {
        if index >= self.piece_count {
            return 0;
        }
        let base = self.total_size / self.piece_count as u64;
        if index + 1 == self.piece_count {
            self.total_size - base * (self.piece_count as u64 - 1)
        } else {
            base
        }
    }

    /// True once every declared piece has been recorded.
    pub fn is_complete(&self) -> bool {
        self.recorded_pieces >= self.piece_count
    }
}

/// One client's download session for a task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    /// The client session.
    pub client_id: ClientId,
    /// The task being downloaded.
    pub task_id: TaskId,
    /// When the session was registered.
    pub started_at: Timestamp,
    /// Last heartbeat or status change.
    pub last_active: Timestamp,
    /// Session status.
    pub status: ClientStatus,
}

/// One peer node participating in a task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerState {
    /// The peer.
    pub peer_id: PeerId,
    /// The task the peer serves.
    pub task_id: TaskId,
    /// Network location the peer serves pieces from, e.g. `10.0.0.3:8002`.
    pub location: Arc<str>,
    /// Piece indices this peer holds.
    pub pieces: BTreeSet<u32>,
    /// Last heartbeat or piece report.
    pub last_heartbeat: Timestamp,
    /// Lifecycle status.
    pub status: PeerStatus,
}

impl PeerState {
    /// Piece indices in `[0, piece_count)` this peer does not hold yet.
    pub fn missing(&self, piece_count: u32) -> BTreeSet<u32> {
        (0..piece_count)
            .filter(|i| !self.pieces.contains(i))
            .collect()
    }
}

/// One block of a task's content.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceState {
    /// The piece index within the task.
    pub piece_index: u32,
    /// The task the piece belongs to.
    pub task_id: TaskId,
    /// Opaque content checksum, fixed by the first report.
    pub checksum: Arc<str>,
    /// Piece size in bytes.
    pub size: u64,
    /// The peer that most recently confirmed holding this piece.
    pub last_source: PeerId,
    /// Every peer that has confirmed holding this piece.
    pub sources: BTreeSet<PeerId>,
}

/// The kind of an entity held in the state store.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum StateKind {
    /// [SuperState]
    Task,
    /// [ClientState]
    Client,
    /// [PeerState]
    Peer,
    /// [PieceState]
    Piece,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Task => "task",
            Self::Client => "client",
            Self::Peer => "peer",
            Self::Piece => "piece",
        })
    }
}

/// A tagged entity snapshot, the value type of the state store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateValue {
    /// A task snapshot.
    Task(Arc<SuperState>),
    /// A client session snapshot.
    Client(Arc<ClientState>),
    /// A peer snapshot.
    Peer(Arc<PeerState>),
    /// A piece snapshot.
    Piece(Arc<PieceState>),
}

impl StateValue {
    /// The kind tag of this value.
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Task(_) => StateKind::Task,
            Self::Client(_) => StateKind::Client,
            Self::Peer(_) => StateKind::Peer,
            Self::Piece(_) => StateKind::Piece,
        }
    }

    /// The task every entity is scoped by.
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Task(s) => &s.task_id,
            Self::Client(s) => &s.task_id,
            Self::Peer(s) => &s.task_id,
            Self::Piece(s) => &s.task_id,
        }
    }
}

/// An entity type that can be stored in, and typed back out of,
/// a [StateValue].
pub trait StateVariant: 'static + Send + Sync + Sized {
    /// The kind tag for this entity type.
    const KIND: StateKind;

    /// Wrap a snapshot.
    fn into_value(self: Arc<Self>) -> StateValue;

    /// Borrow the snapshot if `value` holds this entity type.
    fn from_value(value: &StateValue) -> Option<&Arc<Self>>;
}

macro_rules! imp_variant {
    ($t:ty, $v:ident) => {
        impl StateVariant for $t {
            const KIND: StateKind = StateKind::$v;

            fn into_value(self: Arc<Self>) -> StateValue {
                StateValue::$v(self)
            }

            fn from_value(value: &StateValue) -> Option<&Arc<Self>> {
                match value {
                    StateValue::$v(s) => Some(s),
                    _ => None,
                }
            }
        }

        impl From<$t> for StateValue {
            fn from(s: $t) -> Self {
                StateValue::$v(Arc::new(s))
            }
        }
    };
}

imp_variant!(SuperState, Task);
imp_variant!(ClientState, Client);
imp_variant!(PeerState, Peer);
imp_variant!(PieceState, Piece);
