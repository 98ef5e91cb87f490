#![deny(missing_docs)]
//! Supernode API contains the progress tracking module traits and the
//! basic types required to define the api of those traits.
//!
//! If you want the production implementations, please see the
//! supernode_core crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub mod builder;
pub mod config;
pub use config::Config;

mod error;
pub use error::*;

pub mod id;
pub use id::{ClientId, PeerId, TaskId};

mod timestamp;
pub use timestamp::*;

pub mod state;
pub use state::*;

pub mod progress;
pub use progress::*;

pub mod reaper;
pub use reaper::*;
