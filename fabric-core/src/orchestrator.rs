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
use crate::live::{LiveViewer, NullLiveViewer};
use crate::operand::{frames_identical, OperandMap};
use crate::pool::{FramePool, PoolConfig, PushOutcome};
use crate::raw_image::RawImage;
use crate::resize::bilinear_resize;
use crate::sinks::{write_bmp, AggregateMetric, FrameMetric, MetricsSink};
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
    pub live: bool,
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
    last_aggregate_t: f64,
    viewer: Box<dyn LiveViewer>,
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
            last_aggregate_t: f64::NEG_INFINITY,
            viewer: Box::new(NullLiveViewer),
            config,
        })
    }

    /// Swap in a real live-viewer backend. Only ever invoked when
    /// `config.live` is set; otherwise the default [`NullLiveViewer`] is
    /// never called.
    pub fn set_live_viewer(&mut self, viewer: Box<dyn LiveViewer>) {
        self.viewer = viewer;
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

            if self.config.live {
                self.viewer.present(&image);
            }

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

                if t_rel - self.last_aggregate_t >= 1.0 {
                    let aggregate = AggregateMetric::new(
                        t_rel,
                        summary.captured,
                        summary.unique,
                        summary.duplicates,
                        self.pool.len(),
                        self.pool.total_bytes(),
                    );
                    if let Err(e) = metrics.write_aggregate(&aggregate) {
                        warn!(error = %e, "aggregate metrics sink write failed");
                    }
                    self.last_aggregate_t = t_rel;
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
