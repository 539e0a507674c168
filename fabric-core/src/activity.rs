// SPDX-License-Identifier: MPL-2.0

//! Per-frame sampled diff-ratio classifier with latched awake state
//! (`spec.md` §4.6, C7).

use crate::raw_image::RawImage;

/// Tunable thresholds and timings, independent of any particular CLI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityConfig {
    /// Sample every `stride`-th pixel (`>= 1`) when computing `diff_ratio`.
    pub stride: usize,
    /// Per-channel integer threshold a delta must exceed to count as changed.
    pub channel_threshold: u8,
    pub static_threshold: f64,
    pub wake_threshold: f64,
    pub dedupe_pause_sec: f64,
    pub static_reset_sec: f64,
    /// On a mid-band frame, freeze the static streak instead of resetting it.
    pub freeze_on_mid_band: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            stride: 4,
            channel_threshold: 8,
            static_threshold: 0.03,
            wake_threshold: 0.05,
            dedupe_pause_sec: 1.5,
            static_reset_sec: 2.0,
            freeze_on_mid_band: false,
        }
    }
}

/// Output of [`SceneActivityTracker::update`] (`spec.md` §3 "ActivityDecision").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityDecision {
    pub diff_ratio: f64,
    pub is_static: bool,
    pub is_awake: bool,
    pub is_mid_band: bool,
    pub dedupe_block: bool,
    pub allow_dedupe: bool,
    pub t_in_static: f64,
    pub t_since_high: f64,
}

/// Compute the fraction of strided-sampled pixels whose B/G/R delta exceeds
/// `threshold` in any channel. `cur` and `prev` must share the same
/// dimensions; a mismatch is treated as "fully changed" (ratio `1.0`).
#[must_use]
pub fn diff_ratio(cur: &RawImage, prev: &RawImage, stride: usize, threshold: u8) -> f64 {
    if cur.width() != prev.width() || cur.height() != prev.height() {
        return 1.0;
    }
    let total_pixels = cur.width() as u64 * cur.height() as u64;
    if total_pixels == 0 {
        return 0.0;
    }

    let stride = stride.max(1) as u64;
    let mut sampled = 0u64;
    let mut changed = 0u64;

    let mut i = 0u64;
    while i < total_pixels {
        let x = (i % u64::from(cur.width())) as u32;
        let y = (i / u64::from(cur.width())) as u32;
        let a = cur.pixel(x, y).unwrap();
        let b = prev.pixel(x, y).unwrap();

        sampled += 1;
        let db = (i32::from(a[0]) - i32::from(b[0])).unsigned_abs();
        let dg = (i32::from(a[1]) - i32::from(b[1])).unsigned_abs();
        let dr = (i32::from(a[2]) - i32::from(b[2])).unsigned_abs();
        if db > u32::from(threshold) || dg > u32::from(threshold) || dr > u32::from(threshold) {
            changed += 1;
        }

        i += stride;
    }

    changed as f64 / sampled as f64
}

/// Stateful classifier; one instance per capture stream.
pub struct SceneActivityTracker {
    config: ActivityConfig,
    awake: bool,
    dedupe_block_until: f64,
    static_run_start: Option<f64>,
    last_high_time: f64,
}

impl SceneActivityTracker {
    #[must_use]
    pub fn new(config: ActivityConfig) -> Self {
        Self {
            config,
            awake: false,
            dedupe_block_until: f64::NEG_INFINITY,
            static_run_start: None,
            last_high_time: f64::NEG_INFINITY,
        }
    }

    /// Classify `(cur, prev)` at time `t` seconds, updating latched state.
    pub fn update(&mut self, cur: &RawImage, prev: &RawImage, t: f64) -> ActivityDecision {
        let ratio = diff_ratio(cur, prev, self.config.stride, self.config.channel_threshold);

        let is_static = ratio <= self.config.static_threshold;
        let is_high = ratio >= self.config.wake_threshold;
        let is_mid_band = !is_static && !is_high;

        if is_high {
            self.awake = true;
            self.dedupe_block_until = t + self.config.dedupe_pause_sec;
            self.last_high_time = t;
            self.static_run_start = None;
        } else if is_mid_band {
            self.awake = true;
            if !self.config.freeze_on_mid_band {
                self.static_run_start = None;
            }
        } else {
            // static
            if self.static_run_start.is_none() {
                self.static_run_start = Some(t);
            }
            if self.awake {
                let t_in_static = t - self.static_run_start.unwrap_or(t);
                let t_since_high = t - self.last_high_time;
                if t_in_static >= self.config.static_reset_sec
                    && t_since_high >= self.config.dedupe_pause_sec
                {
                    self.awake = false;
                }
            }
        }

        let allow_dedupe = t >= self.dedupe_block_until;
        let t_in_static = self.static_run_start.map_or(0.0, |start| t - start);
        let t_since_high = t - self.last_high_time;

        ActivityDecision {
            diff_ratio: ratio,
            is_static,
            is_awake: self.awake,
            is_mid_band,
            dedupe_block: !allow_dedupe,
            allow_dedupe,
            t_in_static,
            t_since_high,
        }
    }
}
