// src/sync/state.rs

//! Explicit sync-run state, owned by the orchestrator.
//!
//! One instance per process. Status callers receive a copied snapshot,
//! never a handle to the mutable state; only the orchestrator's own
//! methods mutate it.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// How much of the catalog a sync pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDepth {
    /// Shallow pass: skip detail fetches for items whose listed episode
    /// label already matches the stored record.
    Latest,

    /// Deep pass: fetch detail for every listed item.
    Full,
}

/// Inclusive page range for a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u64,
    pub end: u64,
}

impl PageRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start == 0 {
            return Err(AppError::validation("page range starts at 1"));
        }
        if end < start {
            return Err(AppError::validation("page range end before start"));
        }
        Ok(Self { start, end })
    }

    pub fn pages(&self) -> std::ops::RangeInclusive<u64> {
        self.start..=self.end
    }
}

/// Aggregate outcome of one sync run.
///
/// Partial item failures never abort a run; they are tallied here. The
/// operator-visible result is always "completed with N failures".
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Pages actually crawled (per adapter)
    pub pages: u64,

    /// Items successfully reconciled and upserted
    pub processed: u64,

    /// Items that exhausted the retry budget
    pub failed: u64,

    /// Items skipped (blacklisted, or unchanged on a shallow pass)
    pub skipped: u64,

    /// Users notified across all items
    pub notified: u64,

    /// Whether the run ended on an explicit stop request
    pub stopped: bool,
}

/// Read-only status snapshot, safe to poll while a run is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub running: bool,
    pub blacklist_size: usize,
    pub current_page: u64,
}

/// Process-wide mutable sync state.
#[derive(Debug, Default)]
pub struct SyncState {
    running: AtomicBool,
    stop_requested: AtomicBool,
    current_page: AtomicU64,
    blacklist: Mutex<HashSet<String>>,
}

impl SyncState {
    /// Fresh idle state (process start).
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to move Idle -> Running. Fails if a run is already in flight;
    /// a concurrent trigger is rejected, never queued.
    pub fn try_begin_run(&self) -> Result<()> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AppError::SyncAlreadyRunning)?;
        self.stop_requested.store(false, Ordering::SeqCst);
        self.current_page.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Move Running -> Idle.
    pub fn end_run(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cooperative stop: checked between batches and pages, an in-flight
    /// batch always finishes.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn set_current_page(&self, page: u64) {
        self.current_page.store(page, Ordering::SeqCst);
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            running: self.is_running(),
            blacklist_size: self.blacklist.lock().expect("blacklist lock").len(),
            current_page: self.current_page.load(Ordering::SeqCst),
        }
    }

    // --- Blacklist: transient circuit breaker, process lifetime only ---

    pub fn is_blacklisted(&self, slug: &str) -> bool {
        self.blacklist.lock().expect("blacklist lock").contains(slug)
    }

    /// Returns false if the slug was already present.
    pub fn add_to_blacklist(&self, slug: &str) -> bool {
        self.blacklist
            .lock()
            .expect("blacklist lock")
            .insert(slug.to_string())
    }

    /// Returns true if the slug was present.
    pub fn remove_from_blacklist(&self, slug: &str) -> bool {
        self.blacklist.lock().expect("blacklist lock").remove(slug)
    }

    pub fn blacklist_snapshot(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self
            .blacklist
            .lock()
            .expect("blacklist lock")
            .iter()
            .cloned()
            .collect();
        slugs.sort();
        slugs
    }
}

/// Clears the running flag when a run exits by any path.
pub(crate) struct RunGuard<'a>(pub &'a SyncState);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.end_run();
    }
}
