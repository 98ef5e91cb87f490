//! Test utilities associated with ids.

use crate::random_str;
use supernode_api::{ClientId, PeerId, TaskId};

/// Create a random task id.
pub fn random_task_id() -> TaskId {
    format!("task-{}", random_str(12)).into()
}

/// Create a random peer id.
pub fn random_peer_id() -> PeerId {
    format!("peer-{}", random_str(12)).into()
}

/// Create a random client id.
pub fn random_client_id() -> ClientId {
    format!("client-{}", random_str(12)).into()
}
