//! Factories for generating instances of supernode modules.

pub mod mem_state_store;
pub use mem_state_store::MemStateStore;

pub mod core_progress;
pub use core_progress::{CoreProgressMgr, CoreProgressMgrFactory};

pub mod core_reaper;
pub use core_reaper::{CoreReaper, CoreReaperFactory};
