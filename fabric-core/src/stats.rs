// SPDX-License-Identifier: MPL-2.0

//! Injectable stats reporting, replacing a singleton-stats pattern with a
//! trait each component reports events to (`spec.md` §9 redesign flag).

use std::sync::atomic::{AtomicU64, Ordering};

/// Events a component can report to a [`StatsSink`]. New variants may be
/// added; sinks that don't care about a given event simply ignore it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatEvent {
    FrameCaptured,
    FrameUnique,
    FrameDuplicate,
    CaptureFailed,
    TileOffloaded,
    TileSkipped,
}

/// Receives [`StatEvent`]s from orchestrator components. Implementors must
/// be cheap to call from the hot capture-loop path.
pub trait StatsSink: Send + Sync {
    fn record(&self, event: StatEvent);
}

/// A sink that discards every event; the default when no metrics are
/// requested.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn record(&self, _event: StatEvent) {}
}

/// An atomics-backed sink that tallies each event kind, useful for tests
/// and for deriving aggregate metrics records.
#[derive(Debug, Default)]
pub struct CountingStats {
    captured: AtomicU64,
    unique: AtomicU64,
    duplicate: AtomicU64,
    capture_failed: AtomicU64,
    tile_offloaded: AtomicU64,
    tile_skipped: AtomicU64,
}

impl CountingStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn unique(&self) -> u64 {
        self.unique.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn duplicate(&self) -> u64 {
        self.duplicate.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capture_failed(&self) -> u64 {
        self.capture_failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn tile_offloaded(&self) -> u64 {
        self.tile_offloaded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn tile_skipped(&self) -> u64 {
        self.tile_skipped.load(Ordering::Relaxed)
    }
}

impl StatsSink for CountingStats {
    fn record(&self, event: StatEvent) {
        let counter = match event {
            StatEvent::FrameCaptured => &self.captured,
            StatEvent::FrameUnique => &self.unique,
            StatEvent::FrameDuplicate => &self.duplicate,
            StatEvent::CaptureFailed => &self.capture_failed,
            StatEvent::TileOffloaded => &self.tile_offloaded,
            StatEvent::TileSkipped => &self.tile_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
