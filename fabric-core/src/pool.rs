// SPDX-License-Identifier: MPL-2.0

//! Coalescing frame history with time/budget eviction and a quick-lane SPSC
//! emit of changed frames (`spec.md` §4.7, C8).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::operand::{frames_identical, OperandMap};
use crate::raw_image::RawImage;
use crate::ring::SpscRing;

/// One history entry (`spec.md` §3 "Frame"). `t_end >= t_start` always.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: i64,
    pub t_start: f64,
    pub t_end: f64,
    pub run_len: u64,
    pub image: Arc<RawImage>,
    pub sig: OperandMap,
}

/// Retention, budget, and static-run-collapse knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    pub retention_seconds: f64,
    pub byte_budget: u64,
    pub static_grace_sec: f64,
    pub quick_lane_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            retention_seconds: 30.0,
            byte_budget: 256 * 1024 * 1024,
            static_grace_sec: 5.0,
            quick_lane_capacity: 64,
        }
    }
}

/// Outcome of a single [`FramePool::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Extended the tail entry's run; nothing published.
    Coalesced,
    /// A new unique entry was appended and published to the quick lane.
    Unique,
}

struct State {
    frames: VecDeque<Frame>,
    total_bytes: u64,
    latest: f64,
    in_static_run: bool,
    static_since: f64,
}

pub struct FramePool {
    config: PoolConfig,
    state: Mutex<State>,
    quick_lane: SpscRing<Arc<Frame>>,
}

impl FramePool {
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            quick_lane: SpscRing::new(config.quick_lane_capacity),
            config,
            state: Mutex::new(State {
                frames: VecDeque::new(),
                total_bytes: 0,
                latest: 0.0,
                in_static_run: false,
                static_since: 0.0,
            }),
        }
    }

    /// Push a newly-captured `image` at timestamp `t` with orchestrator
    /// frame counter `index`. See `spec.md` §4.7 for the full algorithm.
    pub fn push(&self, image: RawImage, index: i64, t: f64) -> PushOutcome {
        let sig = OperandMap::compute(&image);
        let mut state = self.state.lock().unwrap();
        state.latest = t;

        let coalesced = if let Some(last) = state.frames.back() {
            frames_identical(&image, &last.image, &sig, &last.sig)
        } else {
            false
        };

        let outcome = if coalesced {
            let last = state.frames.back_mut().unwrap();
            last.t_end = t;
            last.run_len += 1;

            if !state.in_static_run {
                state.in_static_run = true;
                state.static_since = t;
            }

            if t - state.static_since >= self.config.static_grace_sec {
                while state.frames.len() > 1 {
                    if let Some(evicted) = state.frames.pop_front() {
                        state.total_bytes -= evicted.image.byte_len() as u64;
                    }
                }
            }

            PushOutcome::Coalesced
        } else {
            state.in_static_run = false;
            let byte_len = image.byte_len() as u64;
            let frame = Arc::new(Frame {
                index,
                t_start: t,
                t_end: t,
                run_len: 1,
                image: Arc::new(image),
                sig,
            });
            state.total_bytes += byte_len;
            state.frames.push_back((*frame).clone());
            self.quick_lane.push(frame);
            PushOutcome::Unique
        };

        self.evict(&mut state);
        outcome
    }

    fn evict(&self, state: &mut State) {
        let latest = state.latest;
        while state.frames.len() >= 2 {
            let Some(front) = state.frames.front() else {
                break;
            };
            if front.t_end < latest - self.config.retention_seconds {
                if let Some(evicted) = state.frames.pop_front() {
                    state.total_bytes -= evicted.image.byte_len() as u64;
                }
            } else {
                break;
            }
        }

        while state.frames.len() >= 2 && state.total_bytes > self.config.byte_budget {
            if let Some(evicted) = state.frames.pop_front() {
                state.total_bytes -= evicted.image.byte_len() as u64;
            } else {
                break;
            }
        }
    }

    /// Pop the next handle from the quick lane, or `None` if empty.
    pub fn pop_quick(&self) -> Option<Arc<Frame>> {
        self.quick_lane.pop()
    }

    /// Frames whose `t_start >= latest - last_seconds`, oldest first.
    /// Always includes at least the newest frame when the deque is
    /// non-empty.
    #[must_use]
    pub fn snapshot_recent(&self, last_seconds: f64) -> Vec<Frame> {
        let state = self.state.lock().unwrap();
        let latest = state.latest;
        let mut out: Vec<Frame> = Vec::new();

        for frame in state.frames.iter().rev() {
            if frame.t_start >= latest - last_seconds || out.is_empty() {
                out.push(frame.clone());
            } else {
                break;
            }
        }

        out.reverse();
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.state.lock().unwrap().total_bytes
    }

    /// Re-expand a recent window back to real time: for each frame, emit
    /// `max(1, round((t_end - t_start) * fps))` copies via `sink`. Returns
    /// the total number of frames written.
    pub fn export_recent(
        &self,
        last_seconds: f64,
        fps: f64,
        mut sink: impl FnMut(&RawImage),
    ) -> u64 {
        let snapshot = self.snapshot_recent(last_seconds);
        let mut written = 0u64;

        for frame in &snapshot {
            let repeats = ((frame.t_end - frame.t_start) * fps).round().max(1.0) as u64;
            for _ in 0..repeats {
                sink(&frame.image);
            }
            written += repeats;
        }

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PoolConfig {
        PoolConfig {
            retention_seconds: 1000.0,
            byte_budget: u64::MAX,
            static_grace_sec: 2.0,
            quick_lane_capacity: 64,
        }
    }

    #[test]
    fn monotonic_push_times_are_preserved() {
        let pool = FramePool::new(cfg());
        pool.push(RawImage::solid(2, 2, 1, 1, 1), 0, 0.0);
        pool.push(RawImage::solid(2, 2, 2, 2, 2), 1, 0.1);
        pool.push(RawImage::solid(2, 2, 3, 3, 3), 2, 0.2);

        let snap = pool.snapshot_recent(1000.0);
        for w in snap.windows(2) {
            assert!(w[0].t_start <= w[1].t_start);
        }
        for frame in &snap {
            assert!(frame.t_start <= frame.t_end);
        }
    }

    #[test]
    fn coalesce_on_identity_creates_one_entry_and_one_quick_lane_push() {
        let pool = FramePool::new(cfg());
        let img = RawImage::solid(4, 4, 9, 9, 9);
        for i in 0..5 {
            pool.push(img.clone(), i, i as f64 * 0.1);
        }
        assert_eq!(pool.len(), 1);
        assert!(pool.pop_quick().is_some());
        assert!(pool.pop_quick().is_none());
    }

    #[test]
    fn pushing_tail_equal_frame_is_idempotent_for_deque_size() {
        let pool = FramePool::new(cfg());
        let img = RawImage::solid(4, 4, 1, 1, 1);
        pool.push(img.clone(), 0, 0.0);
        let len_before = pool.len();
        pool.push(img, 1, 0.1);
        assert_eq!(pool.len(), len_before);
    }

    #[test]
    fn alternating_frames_never_coalesce() {
        let pool = FramePool::new(cfg());
        let a = RawImage::solid(4, 4, 1, 1, 1);
        let b = RawImage::solid(4, 4, 2, 2, 2);
        for i in 0..30 {
            let img = if i % 2 == 0 { a.clone() } else { b.clone() };
            pool.push(img, i, i as f64 / 30.0);
        }
        assert_eq!(pool.len(), 30);
    }

    #[test]
    fn static_collapse_after_grace_period_shrinks_to_one() {
        let pool = FramePool::new(cfg());
        pool.push(RawImage::solid(4, 4, 1, 1, 1), 0, 0.0);
        pool.push(RawImage::solid(4, 4, 2, 2, 2), 1, 0.1);

        let img = RawImage::solid(4, 4, 3, 3, 3);
        pool.push(img.clone(), 2, 0.2);
        pool.push(img.clone(), 3, 0.3);
        // still within grace: collapse hasn't triggered yet, 3 entries total
        assert_eq!(pool.len(), 3);

        pool.push(img, 4, 5.0); // now sustained past static_grace_sec
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn retention_upper_bound_holds_after_push() {
        let mut config = cfg();
        config.retention_seconds = 1.0;
        let pool = FramePool::new(config);

        let a = RawImage::solid(4, 4, 1, 1, 1);
        let b = RawImage::solid(4, 4, 2, 2, 2);
        for i in 0..20 {
            let img = if i % 2 == 0 { a.clone() } else { b.clone() };
            pool.push(img, i, i as f64 * 0.2);
        }

        assert!(pool.len() >= 1);
        let snap = pool.snapshot_recent(1000.0);
        if snap.len() > 1 {
            let latest = snap.last().unwrap().t_end;
            assert!(snap.first().unwrap().t_end >= latest - config.retention_seconds);
        }
    }

    #[test]
    fn single_oversized_frame_degenerates_to_singleton() {
        let mut config = cfg();
        config.byte_budget = 10; // smaller than any real frame
        let pool = FramePool::new(config);

        let a = RawImage::solid(4, 4, 1, 1, 1);
        let b = RawImage::solid(4, 4, 2, 2, 2);
        pool.push(a, 0, 0.0);
        pool.push(b, 1, 0.1);

        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn export_recent_count_matches_temporal_extent() {
        let pool = FramePool::new(cfg());
        let a = RawImage::solid(2, 2, 1, 1, 1);
        pool.push(a.clone(), 0, 0.0);
        // extend the run so t_end - t_start = 0.5s
        pool.push(a, 1, 0.5);

        let mut written = Vec::new();
        let count = pool.export_recent(1000.0, 10.0, |img| written.push(img.clone()));

        assert_eq!(count, 5); // round(0.5 * 10) = 5
        assert_eq!(written.len(), 5);
    }

    #[test]
    fn export_recent_always_emits_at_least_one_frame() {
        let pool = FramePool::new(cfg());
        pool.push(RawImage::solid(2, 2, 1, 1, 1), 0, 0.0);

        let count = pool.export_recent(1000.0, 30.0, |_| {});
        assert_eq!(count, 1);
    }

    #[test]
    fn snapshot_always_includes_newest_frame() {
        let pool = FramePool::new(cfg());
        pool.push(RawImage::solid(2, 2, 1, 1, 1), 0, 0.0);
        pool.push(RawImage::solid(2, 2, 2, 2, 2), 1, 1000.0);

        let snap = pool.snapshot_recent(0.001);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].index, 1);
    }
}
