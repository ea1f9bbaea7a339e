// src/sync/mod.rs

//! Sync orchestration: state machine, paged crawl driver, blacklist.

mod orchestrator;
mod state;

pub use orchestrator::SyncOrchestrator;
pub use state::{PageRange, SyncDepth, SyncReport, SyncState, SyncStatus};
