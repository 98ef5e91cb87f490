//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general supernode builder.
/// This contains both configuration and factory instances,
/// allowing construction of runtime module instances.
#[derive(Debug)]
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before freezing the builder.
    pub config: config::Config,

    /// The [progress::ProgressMgrFactory] to be used for creating
    /// [progress::ProgressMgr] instances.
    pub progress: progress::DynProgressMgrFactory,

    /// The [reaper::ReaperFactory] to be used for creating
    /// [reaper::Reaper] instances.
    pub reaper: reaper::DynReaperFactory,
}

impl Builder {
    /// Construct a default config given the configured module factories.
    /// Note, this should be called before freezing the Builder instance
    /// in an Arc<>.
    pub fn set_default_config(&mut self) -> SnResult<()> {
        let Self {
            config,
            progress,
            reaper,
        } = self;

        progress.default_config(config)?;
        reaper.default_config(config)?;

        Ok(())
    }

    /// Same as [Builder::set_default_config], in builder style.
    pub fn with_default_config(mut self) -> SnResult<Self> {
        self.set_default_config()?;
        Ok(self)
    }

    /// Validate the config against every configured module factory.
    pub fn validate_config(&self) -> SnResult<()> {
        self.progress.validate_config(&self.config)?;
        self.reaper.validate_config(&self.config)?;
        Ok(())
    }

    /// Validate the config and freeze the builder.
    pub fn build(self) -> SnResult<Arc<Self>> {
        self.validate_config()?;
        Ok(Arc::new(self))
    }
}
