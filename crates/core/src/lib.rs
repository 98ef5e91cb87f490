#![deny(missing_docs)]
//! Supernode progress tracking core modules.
//!
//! This crate provides the production implementations of the
//! supernode_api module traits: an in-memory progress manager backed by
//! a sharded state store, and a reaper that expires silent peers and
//! client sessions.

use supernode_api::{builder::Builder, config::Config};

/// Construct a production-ready default builder.
///
/// - `progress` - The default progress manager is
///   [factories::CoreProgressMgrFactory].
/// - `reaper` - The default reaper is [factories::CoreReaperFactory].
pub fn default_builder() -> Builder {
    Builder {
        config: Config::default(),
        progress: factories::CoreProgressMgrFactory::create(),
        reaper: factories::CoreReaperFactory::create(),
    }
}

pub mod factories;
