// SPDX-License-Identifier: MPL-2.0

//! Per-tile route decision with a calibration window (`spec.md` §4.9, C11).

/// Route a tile's rendering work takes this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Cpu,
    Offload,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterConfig {
    pub epsilon: f64,
    pub k_percent: f64,
    pub calib_frames: u32,
    pub calib_min_seconds: f64,
    pub allow_skip_route: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.0,
            k_percent: 1.0,
            calib_frames: 30,
            calib_min_seconds: 1.0,
            allow_skip_route: true,
        }
    }
}

/// Tracks per-tile change percentages and the calibration state shared by
/// all tiles in one `StaticFrameEngine`.
pub struct OrRouter {
    config: RouterConfig,
    last_change_percent: Vec<f64>,
    calibrated: bool,
    frames_seen: u32,
    start: Option<f64>,
}

impl OrRouter {
    #[must_use]
    pub fn new(config: RouterConfig, tile_count: usize) -> Self {
        Self {
            config,
            last_change_percent: vec![0.0; tile_count],
            calibrated: false,
            frames_seen: 0,
            start: None,
        }
    }

    /// Call once per render frame, before any tile updates, with the
    /// current timestamp in seconds.
    pub fn begin_frame(&mut self, t: f64) {
        self.frames_seen += 1;
        let start = *self.start.get_or_insert(t);
        let elapsed = t - start;

        if !self.calibrated
            && self.frames_seen >= self.config.calib_frames
            && elapsed >= self.config.calib_min_seconds
        {
            self.calibrated = true;
        }
    }

    pub fn update_tile_change(&mut self, idx: usize, percent: f64) {
        self.last_change_percent[idx] = percent;
    }

    #[must_use]
    pub fn decide(&self, idx: usize) -> Route {
        let percent = self.last_change_percent[idx];
        if percent > self.config.k_percent {
            Route::Offload
        } else if self.config.allow_skip_route && self.calibrated && percent == 0.0 {
            Route::Skip
        } else {
            Route::Cpu
        }
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    #[must_use]
    pub fn epsilon(&self) -> f64 {
        if self.calibrated {
            self.config.epsilon
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_change_routes_to_offload() {
        let mut router = OrRouter::new(RouterConfig::default(), 1);
        router.begin_frame(0.0);
        router.update_tile_change(0, 50.0);
        assert_eq!(router.decide(0), Route::Offload);
    }

    #[test]
    fn skip_route_only_available_after_calibration() {
        let config = RouterConfig {
            calib_frames: 2,
            calib_min_seconds: 0.0,
            ..RouterConfig::default()
        };
        let mut router = OrRouter::new(config, 1);

        router.begin_frame(0.0);
        router.update_tile_change(0, 0.0);
        assert_eq!(router.decide(0), Route::Cpu); // not calibrated yet

        router.begin_frame(0.1);
        router.update_tile_change(0, 0.0);
        assert_eq!(router.decide(0), Route::Skip); // calibrated, unchanged
    }

    #[test]
    fn skip_gate_invariant_never_skips_before_calibrated() {
        let config = RouterConfig {
            calib_frames: 100,
            calib_min_seconds: 0.0,
            ..RouterConfig::default()
        };
        let mut router = OrRouter::new(config, 1);
        for i in 0..10 {
            router.begin_frame(f64::from(i));
            router.update_tile_change(0, 0.0);
            if router.decide(0) == Route::Skip {
                assert!(router.is_calibrated());
            }
        }
    }

    #[test]
    fn calibration_requires_both_frames_and_elapsed_time() {
        let config = RouterConfig {
            calib_frames: 5,
            calib_min_seconds: 10.0,
            ..RouterConfig::default()
        };
        let mut router = OrRouter::new(config, 1);
        for i in 0..10 {
            router.begin_frame(f64::from(i) * 0.01); // plenty of frames, not enough time
        }
        assert!(!router.is_calibrated());
    }
}


