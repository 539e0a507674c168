// SPDX-License-Identifier: MPL-2.0

//! Optional duration/memory-growth reporting guard, replacing the deep
//! polymorphic "guard"/"worker" hierarchies the redesign flags call out
//! (`spec.md` §9).

use std::time::Instant;

use tracing::debug;

use crate::stats::{StatEvent, StatsSink};

/// RAII guard that logs elapsed wall-clock time on drop. Owned by value,
/// never handed back to whatever spawned it.
pub struct Scope<'a> {
    label: &'a str,
    start: Instant,
}

impl<'a> Scope<'a> {
    #[must_use]
    pub fn enter(label: &'a str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        debug!(label = self.label, elapsed_secs = self.elapsed_secs(), "scope exit");
    }
}

/// A [`Scope`] that also reports a [`StatEvent`] to a [`StatsSink`] on
/// exit, for hot-path sections worth counting as well as timing.
pub struct ReportingScope<'a, S: StatsSink + ?Sized> {
    inner: Scope<'a>,
    sink: &'a S,
    event: StatEvent,
}

impl<'a, S: StatsSink + ?Sized> ReportingScope<'a, S> {
    #[must_use]
    pub fn enter(label: &'a str, sink: &'a S, event: StatEvent) -> Self {
        Self {
            inner: Scope::enter(label),
            sink,
            event,
        }
    }
}

impl<S: StatsSink + ?Sized> Drop for ReportingScope<'_, S> {
    fn drop(&mut self) {
        self.sink.record(self.event);
        let _ = self.inner.elapsed_secs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CountingStats;

    #[test]
    fn scope_reports_nonzero_elapsed_time_after_work() {
        let scope = Scope::enter("test");
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(scope.elapsed_secs() > 0.0);
    }

    #[test]
    fn reporting_scope_records_its_event_on_drop() {
        let sink = CountingStats::new();
        {
            let _scope = ReportingScope::enter("tile", &sink, StatEvent::TileOffloaded);
        }
        assert_eq!(sink.tile_offloaded(), 1);
    }
}


