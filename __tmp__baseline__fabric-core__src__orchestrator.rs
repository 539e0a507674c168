// SPDX-License-Identifier: MPL-2.0

//! Drives the capture -> dedupe -> coalesce -> retain -> emit loop at a
//! target tick rate with drift-resistant absolute-deadline scheduling
//! (`spec.md` §4.12, C9).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::activity::{ActivityConfig, SceneActivityTracker};
use crate::capture::Capture;
use crate::correction::CorrectionQueue;
use crate::error::Error;
use crate::operand::{frames_identical, OperandMap};
use crate::pool::{FramePool, PoolConfig, PushOutcome};
use crate::raw_image::RawImage;
use crate::resize::bilinear_resize;
use crate::sinks::{write_bmp, FrameMetric, MetricsSink};
use crate::stats::{StatEvent, StatsSink};

/// Sleeps until `start + k * tick_period` for increasing `k`, never
/// catching up on a missed tick: a slow iteration simply resyncs to the
/// next absolute deadline instead of accumulating drift.
pub struct TickScheduler {
    start: Instant,
    tick_period: Duration,
    next_index: u64,
}

impl TickScheduler {
    #[must_use]
    pub fn new(fps: f64) -> Self {
        let period_secs = if fps > 0.0 { 1.0 / fps } else { 1.0 };
        Self {
            start: Instant::now(),
            tick_period: Duration::from_secs_f64(period_secs),
            next_index: 0,
        }
    }

    /// The absolute deadline for tick `k`, independent of drift on prior
    /// ticks: `start + k * tick_period`.
    #[must_use]
    pub fn deadline_for(&self, k: u64) -> Instant {
        self.start + self.tick_period * k as u32
    }

    /// Block until the next scheduled tick's deadline, then advance.
    pub fn wait_for_next_tick(&mut self) {
        let deadline = self.deadline_for(self.next_index);
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.next_index += 1;
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Knobs threaded from the CLI into one orchestrator run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub display_index: u32,
    pub fps: f64,
    pub ticks: u64,
    pub resize: Option<(u32, u32)>,
    pub record_base: Option<PathBuf>,
    pub metrics_path: Option<PathBuf>,
    pub adaptive: bool,
}

/// Final one-line summary the orchestrator always prints (`spec.md` §7).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub ticks_attempted: u64,
    pub captured: u64,
    pub unique: u64,
    pub duplicates: u64,
    pub capture_failures: u64,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "captured={} unique={} duplicates={} capture_failures={} ticks={}",
            self.captured, self.unique, self.duplicates, self.capture_failures, self.ticks_attempted
        )
    }
}

/// Drives one capture session end to end.
pub struct CaptureOrchestrator<'a> {
    capture: &'a mut dyn Capture,
    config: OrchestratorConfig,
    pool: FramePool,
    correction: CorrectionQueue,
    activity: Option<SceneActivityTracker>,
    stats: Arc<dyn StatsSink>,
    prev: Option<(RawImage, OperandMap)>,
    metrics: Option<MetricsSink>,
}

impl<'a> CaptureOrchestrator<'a> {
    /// Validates the requested display exists before any ticking begins.
    pub fn new(
        capture: &'a mut dyn Capture,
        config: OrchestratorConfig,
        pool_config: PoolConfig,
        correction: CorrectionQueue,
        activity_config: Option<ActivityConfig>,
        stats: Arc<dyn StatsSink>,
    ) -> Result<Self, Error> {
        if capture.by_index(config.display_index).is_none() {
            return Err(Error::DisplayNotFound(config.display_index));
        }

        let metrics = match &config.metrics_path {
            Some(path) => Some(MetricsSink::create(path).map_err(|_| {
                Error::RecordingDirUncreatable(
                    path.clone(),
                    std::io::Error::new(std::io::ErrorKind::Other, "metrics sink create failed"),
                )
            })?),
            None => None,
        };

        if let Some(base) = &config.record_base {
            if let Some(parent) = base.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| Error::RecordingDirUncreatable(parent.to_path_buf(), e))?;
                }
            }
        }

        Ok(Self {
            capture,
            pool: FramePool::new(pool_config),
            correction,
            activity: activity_config.map(SceneActivityTracker::new),
            stats,
            prev: None,
            metrics,
            config,
        })
    }

    #[must_use]
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Run the full tick loop, returning the final summary.
    pub fn run(&mut self) -> Summary {
        let mut scheduler = TickScheduler::new(self.config.fps);
        let mut summary = Summary::default();
        let mut frame_counter: i64 = 0;

        for tick in 0..self.config.ticks {
            summary.ticks_attempted += 1;
            let t_rel = tick as f64 / self.config.fps.max(1.0);

            let raw = self.capture.capture(self.config.display_index);
            if !raw.ok() {
                self.stats.record(StatEvent::CaptureFailed);
                summary.capture_failures += 1;
                scheduler.wait_for_next_tick();
                continue;
            }
            self.stats.record(StatEvent::FrameCaptured);
            summary.captured += 1;

            let mut image = match self.config.resize {
                Some((w, h)) => bilinear_resize(&raw, w, h),
                None => raw,
            };

            let decision = match (&mut self.activity, &self.prev) {
                (Some(tracker), Some((prev_image, _))) => {
                    Some(tracker.update(&image, prev_image, t_rel))
                }
                _ => None,
            };
            let allow_dedupe = decision.map_or(true, |d| d.allow_dedupe);
            let dedupe_block = decision.map_or(false, |d| d.dedupe_block);
            let diff_ratio = decision.map_or(0.0, |d| d.diff_ratio);

            self.correction.apply_all(&mut image);
            let sig = OperandMap::compute(&image);

            let identical = allow_dedupe
                && self
                    .prev
                    .as_ref()
                    .is_some_and(|(prev_image, prev_sig)| {
                        frames_identical(&image, prev_image, &sig, prev_sig)
                    });

            let outcome = self.pool.push(image.clone(), frame_counter, t_rel);
            match outcome {
                PushOutcome::Unique => {
                    self.stats.record(StatEvent::FrameUnique);
                    summary.unique += 1;
                }
                PushOutcome::Coalesced => {
                    self.stats.record(StatEvent::FrameDuplicate);
                    summary.duplicates += 1;
                }
            }

            if let Some(base) = self.config.record_base.clone() {
                if dedupe_block || !identical {
                    let path = crate::sinks::numbered_path(&base, frame_counter as u64);
                    if let Err(e) = write_bmp(&path, &image) {
                        warn!(?path, error = %e, "record sink write failed");
                    }
                }
            }

            if let Some(metrics) = &mut self.metrics {
                let record = FrameMetric::new(
                    t_rel,
                    frame_counter,
                    t_rel,
                    u8::from(outcome == PushOutcome::Unique),
                    summary.duplicates,
                    self.pool.len(),
                    0.0,
                    diff_ratio,
                    u8::from(dedupe_block),
                );
                if let Err(e) = metrics.write_frame(&record) {
                    warn!(error = %e, "metrics sink write failed");
                }
            }

            self.prev = Some((image, sig));
            frame_counter += 1;

            if tick + 1 < self.config.ticks {
                scheduler.wait_for_next_tick();
            }
        }

        info!(%summary, "capture session complete");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FixtureCapture;
    use crate::stats::NullStats;

    fn orchestrator_config(ticks: u64, fps: f64) -> OrchestratorConfig {
        OrchestratorConfig {
            display_index: 1,
            fps,
            ticks,
            resize: None,
            record_base: None,
            metrics_path: None,
            adaptive: false,
        }
    }

    #[test]
    fn snapshot_scenario_produces_one_unique_frame() {
        let mut capture = FixtureCapture::repeating(RawImage::solid(16, 16, 0, 0, 255));
        let mut orchestrator = CaptureOrchestrator::new(
            &mut capture,
            orchestrator_config(1, 30.0),
            PoolConfig::default(),
            CorrectionQueue::new(),
            None,
            Arc::new(NullStats),
        )
        .unwrap();

        let summary = orchestrator.run();
        assert_eq!(summary.ticks_attempted, 1);
        assert_eq!(summary.unique, 1);
        assert_eq!(summary.duplicates, 0);
        assert_eq!(orchestrator.pool().len(), 1);
    }

    #[test]
    fn static_loop_coalesces_every_tick_after_the_first() {
        let mut capture = FixtureCapture::repeating(RawImage::solid(8, 8, 1, 1, 1));
        let mut orchestrator = CaptureOrchestrator::new(
            &mut capture,
            orchestrator_config(60, 1000.0),
            PoolConfig::default(),
            CorrectionQueue::new(),
            None,
            Arc::new(NullStats),
        )
        .unwrap();

        let summary = orchestrator.run();
        assert_eq!(summary.unique, 1);
        assert_eq!(summary.duplicates, 59);
        assert_eq!(orchestrator.pool().len(), 1);
    }

    #[test]
    fn alternating_scenario_never_coalesces() {
        let a = RawImage::solid(8, 8, 1, 1, 1);
        let b = RawImage::solid(8, 8, 2, 2, 2);
        let mut capture = FixtureCapture::new(vec![a, b].into_iter().cycle().take(30).collect());
        let mut orchestrator = CaptureOrchestrator::new(
            &mut capture,
            orchestrator_config(30, 1000.0),
            PoolConfig {
                retention_seconds: 1000.0,
                byte_budget: u64::MAX,
                ..PoolConfig::default()
            },
            CorrectionQueue::new(),
            None,
            Arc::new(NullStats),
        )
        .unwrap();

        let summary = orchestrator.run();
        assert_eq!(summary.unique, 30);
        assert_eq!(summary.duplicates, 0);
    }

    #[test]
    fn missing_display_is_rejected_before_any_tick_runs() {
        let mut capture = FixtureCapture::failing();
        let mut config = orchestrator_config(1, 30.0);
        config.display_index = 99;
        let result = CaptureOrchestrator::new(
            &mut capture,
            config,
            PoolConfig::default(),
            CorrectionQueue::new(),
            None,
            Arc::new(NullStats),
        );
        assert!(matches!(result, Err(Error::DisplayNotFound(_))));
    }

    #[test]
    fn capture_failures_are_skipped_without_advancing_the_pool() {
        let mut capture = FixtureCapture::new(vec![RawImage::empty(), RawImage::solid(4, 4, 1, 1, 1)]);
        let mut orchestrator = CaptureOrchestrator::new(
            &mut capture,
            orchestrator_config(2, 1000.0),
            PoolConfig::default(),
            CorrectionQueue::new(),
            None,
            Arc::new(NullStats),
        )
        .unwrap();

        let summary = orchestrator.run();
        assert_eq!(summary.capture_failures, 1);
        assert_eq!(summary.captured, 1);
        assert_eq!(orchestrator.pool().len(), 1);
    }

    #[test]
    fn tick_deadlines_are_monotonically_spaced_by_the_period() {
        let scheduler = TickScheduler::new(10.0);
        let d0 = scheduler.deadline_for(0);
        let d5 = scheduler.deadline_for(5);
        let d10 = scheduler.deadline_for(10);
        assert!(d5 > d0);
        assert!(d10 > d5);
        assert_eq!((d10 - d0).as_secs_f64(), 2.0 * (d5 - d0).as_secs_f64());
    }
}


