//! The core reaper expires peers and client sessions that stopped
//! heartbeating.
//!
//! Every `reapIntervalS` seconds a background task looks for entities
//! whose last activity is older than the configured expiry:
//!
//! - Registered or running peers are marked disappeared. A heartbeat
//!   before the next pass revives them.
//! - Peers that are already finished, failed or disappeared are removed.
//! - Active client sessions are marked failed.
//! - Finished or failed client sessions are removed.
//!
//! An entity therefore needs to be stale for two passes before it is
//! removed. The task only holds a weak reference to the progress manager
//! and exits once the manager is dropped.

use std::sync::{Arc, Weak};
use supernode_api::*;

/// CoreReaper configuration types.
pub mod config {
    /// Configuration parameters for
    /// [CoreReaperFactory](super::CoreReaperFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreReaperConfig {
        /// How often a reaper pass runs, in seconds.
        ///
        /// Default: 10s.
        pub reap_interval_s: u32,

        /// Peers without a heartbeat for this many seconds are expired.
        ///
        /// Default: 60s.
        pub peer_expiry_s: u32,

        /// Client sessions without activity for this many seconds are
        /// expired.
        ///
        /// Default: 300s.
        pub client_expiry_s: u32,
    }

    impl Default for CoreReaperConfig {
        fn default() -> Self {
            Self {
                reap_interval_s: 10,
                peer_expiry_s: 60,
                client_expiry_s: 60 * 5,
            }
        }
    }

    impl CoreReaperConfig {
        /// Get the reap interval as a [std::time::Duration].
        pub fn reap_interval(&self) -> std::time::Duration {
            std::time::Duration::from_secs(self.reap_interval_s as u64)
        }

        /// Get the peer expiry as a [std::time::Duration].
        pub fn peer_expiry(&self) -> std::time::Duration {
            std::time::Duration::from_secs(self.peer_expiry_s as u64)
        }

        /// Get the client expiry as a [std::time::Duration].
        pub fn client_expiry(&self) -> std::time::Duration {
            std::time::Duration::from_secs(self.client_expiry_s as u64)
        }
    }

    /// Module-level configuration for CoreReaper.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreReaperModConfig {
        /// CoreReaper configuration.
        pub core_reaper: CoreReaperConfig,
    }
}

pub use config::*;

/// A production-ready reaper factory.
#[derive(Debug)]
pub struct CoreReaperFactory {}

impl CoreReaperFactory {
    /// Construct a new CoreReaperFactory.
    pub fn create() -> DynReaperFactory {
        let out: DynReaperFactory = Arc::new(Self {});
        out
    }
}

impl ReaperFactory for CoreReaperFactory {
    fn default_config(&self, config: &mut Config) -> SnResult<()> {
        config.set_module_config(&CoreReaperModConfig::default())
    }

    fn validate_config(&self, config: &Config) -> SnResult<()> {
        let config: CoreReaperModConfig = config.get_module_config()?;
        if config.core_reaper.reap_interval_s == 0 {
            return Err(SnError::other(
                "coreReaper.reapIntervalS must be greater than zero",
            ));
        }
        Ok(())
    }

    fn create(
        &self,
        builder: Arc<builder::Builder>,
        progress: DynProgressMgr,
    ) -> BoxFut<'static, SnResult<DynReaper>> {
        Box::pin(async move {
            let config: CoreReaperModConfig =
                builder.config.get_module_config()?;
            let out: DynReaper =
                Arc::new(CoreReaper::spawn(config.core_reaper, progress));
            Ok(out)
        })
    }
}

/// The production [Reaper]. Aborts its background task when dropped.
pub struct CoreReaper {
    config: CoreReaperConfig,
    progress: Weak<dyn ProgressMgr>,
    abort_handle: tokio::task::AbortHandle,
}

impl std::fmt::Debug for CoreReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreReaper")
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for CoreReaper {
    fn drop(&mut self) {
        tracing::debug!("CoreReaper is being dropped, aborting reap task");
        self.abort_handle.abort();
    }
}

impl CoreReaper {
    /// Spawn the reap task. Must be called within a tokio runtime.
    pub fn spawn(config: CoreReaperConfig, progress: DynProgressMgr) -> Self {
        let progress = Arc::downgrade(&progress);

        let abort_handle = tokio::task::spawn({
            let config = config.clone();
            let progress = progress.clone();
            async move {
                loop {
                    tokio::time::sleep(config.reap_interval()).await;

                    let Some(progress) = progress.upgrade() else {
                        tracing::debug!(
                            "progress manager dropped, stopping reap task"
                        );
                        break;
                    };

                    let report = reap(&*progress, Timestamp::now(), &config);
                    if report != ReapReport::default() {
                        tracing::info!(?report, "reaper pass");
                    }
                }
            }
        })
        .abort_handle();

        Self {
            config,
            progress,
            abort_handle,
        }
    }
}

impl Reaper for CoreReaper {
    fn reap_now(&self) -> SnResult<ReapReport> {
        let progress = self
            .progress
            .upgrade()
            .ok_or_else(|| SnError::other("progress manager dropped"))?;
        Ok(reap(&*progress, Timestamp::now(), &self.config))
    }
}

/// Count an action, treating a concurrent removal as already done.
fn tally(res: SnResult<()>, count: &mut usize, what: &str) {
    match res {
        Ok(()) => *count += 1,
        Err(err) if err.is_not_found() => (),
        Err(err) => tracing::warn!(?err, "reaper failed to {what}"),
    }
}

/// Run one reaper pass against `progress` as of `now`.
pub fn reap(
    progress: &dyn ProgressMgr,
    now: Timestamp,
    config: &CoreReaperConfig,
) -> ReapReport {
    let mut report = ReapReport::default();

    if let Some(cutoff) = now.checked_sub(config.peer_expiry()) {
        for peer in progress.stale_peers(cutoff) {
            if peer.status.is_terminal() {
                tracing::debug!(peer_id = %peer.peer_id, "reaping peer");
                tally(
                    progress.remove_peer(&peer.peer_id),
                    &mut report.peers_removed,
                    "remove peer",
                );
            } else {
                tracing::debug!(peer_id = %peer.peer_id, "peer went silent");
                tally(
                    progress.disappear_peer(&peer.peer_id),
                    &mut report.peers_disappeared,
                    "mark peer disappeared",
                );
            }
        }
    }

    if let Some(cutoff) = now.checked_sub(config.client_expiry()) {
        for client in progress.stale_clients(cutoff) {
            if client.status.is_terminal() {
                tally(
                    progress.remove_client(&client.task_id, &client.client_id),
                    &mut report.clients_removed,
                    "remove client",
                );
            } else {
                tracing::debug!(
                    task_id = %client.task_id,
                    client_id = %client.client_id,
                    "client session timed out"
                );
                tally(
                    progress.fail_client(&client.task_id, &client.client_id),
                    &mut report.clients_failed,
                    "fail client",
                );
            }
        }
    }

    report
}
