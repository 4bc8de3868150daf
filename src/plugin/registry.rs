//! Plugin Registry Store
//!
//! Holds the published snapshot. Readers load it without locking; rebuilds
//! are serialized behind a single writer lock and publish atomically.

use arc_swap::ArcSwapOption;
use log::{debug, error, info};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::plugin::cache::{CacheBuilder, Snapshot};
use crate::plugin::error::RegistryResult;

/// Phase of the rebuild currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RebuildState {
    Idle = 0,
    Scanning = 1,
    Parsing = 2,
    Publishing = 3,
}

impl RebuildState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RebuildState::Scanning,
            2 => RebuildState::Parsing,
            3 => RebuildState::Publishing,
            _ => RebuildState::Idle,
        }
    }
}

impl fmt::Display for RebuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebuildState::Idle => "idle",
            RebuildState::Scanning => "scanning",
            RebuildState::Parsing => "parsing",
            RebuildState::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// Returns the state to `Idle` however the rebuild ends
struct IdleOnDrop<'a>(&'a AtomicU8);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(RebuildState::Idle as u8, Ordering::Release);
    }
}

/// Process-scoped holder of the published snapshot
pub struct RegistryStore {
    current: ArcSwapOption<Snapshot>,
    state: AtomicU8,
    writer: tokio::sync::Mutex<()>,
    /// Bumped after every completed storage write
    write_seq: AtomicU64,
    /// Highest write sequence the published snapshot is known to reflect
    published_seq: AtomicU64,
    generation: AtomicU64,
    /// Why the published snapshot is behind storage, if it is
    stale: ArcSwapOption<String>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::const_empty(),
            state: AtomicU8::new(RebuildState::Idle as u8),
            writer: tokio::sync::Mutex::new(()),
            write_seq: AtomicU64::new(0),
            published_seq: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            stale: ArcSwapOption::const_empty(),
        }
    }

    /// Currently published snapshot, if any
    pub fn load(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    pub fn state(&self) -> RebuildState {
        RebuildState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Generation of the published snapshot; zero before the first publish
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn write_sequence(&self) -> u64 {
        self.write_seq.load(Ordering::Acquire)
    }

    /// Record a completed storage write and return its sequence number
    pub fn record_write(&self) -> u64 {
        self.write_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Flag the published snapshot as behind storage
    pub fn mark_stale(&self, reason: impl Into<String>) {
        let reason = reason.into();
        error!("Plugin cache is stale: {}", reason);
        self.stale.store(Some(Arc::new(reason)));
    }

    pub fn stale_reason(&self) -> Option<String> {
        self.stale.load_full().map(|reason| reason.as_ref().clone())
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load().is_some()
    }

    /// Drop the published snapshot and all bookkeeping.
    ///
    /// The next read builds from scratch.
    pub fn reset(&self) {
        self.current.store(None);
        self.generation.store(0, Ordering::Release);
        self.published_seq.store(0, Ordering::Release);
        self.stale.store(None);
        debug!("Registry store reset");
    }

    fn set_state(&self, state: RebuildState) {
        debug!("Rebuild phase: {}", state);
        self.state.store(state as u8, Ordering::Release);
    }

    /// Build and publish a new snapshot.
    ///
    /// With `requested_after = Some(seq)` the call returns the published
    /// snapshot untouched when it already reflects write `seq` and is not
    /// stale, which coalesces rebuilds queued behind one another. `None`
    /// always rebuilds. On failure the previous snapshot stays published.
    pub async fn rebuild(&self, builder: &CacheBuilder, requested_after: Option<u64>) -> RegistryResult<Arc<Snapshot>> {
        let _writer = self.writer.lock().await;

        if let (Some(seq), Some(current)) = (requested_after, self.load()) {
            if self.published_seq.load(Ordering::Acquire) >= seq && !self.is_stale() {
                debug!("Write {} already reflected by generation {}", seq, current.generation());
                return Ok(current);
            }
        }

        let started_at = self.write_seq.load(Ordering::Acquire);
        let generation = self.generation() + 1;
        let _idle = IdleOnDrop(&self.state);

        let snapshot = match builder.build(generation, &|phase: RebuildState| self.set_state(phase)).await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                error!(
                    "Rebuild of generation {} failed, keeping generation {}: {}",
                    generation,
                    self.generation(),
                    e
                );
                return Err(e);
            }
        };

        self.set_state(RebuildState::Publishing);
        self.current.store(Some(Arc::clone(&snapshot)));
        self.generation.store(generation, Ordering::Release);
        self.published_seq.fetch_max(started_at, Ordering::AcqRel);
        self.stale.store(None);

        info!(
            "Published plugin cache generation {}: {} packages, {} actions, {} skipped",
            generation,
            snapshot.packages().len(),
            snapshot.descriptor_count(),
            snapshot.skipped().len()
        );

        Ok(snapshot)
    }
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::new()
    }
}
