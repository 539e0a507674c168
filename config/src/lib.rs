// SPDX-License-Identifier: MPL-2.0

//! Command-line surface and plain configuration structs for `frame-fabric`.
//!
//! This crate is the analogue of the teacher's `cosmic-bg-config`: it keeps
//! config types out of the orchestrator crate so both the capture binary and
//! the standalone render binary can share them without pulling in `clap`.

pub mod error;
pub mod size;

use std::path::PathBuf;

use clap::Parser;

pub use error::ConfigError;
pub use size::Size;

// Config structs for each `fabric-core` component live next to their owner
// and are re-exported here so the CLI only needs to depend on this crate.
pub use fabric_core::activity::ActivityConfig;
pub use fabric_core::gate::GateConfig;
pub use fabric_core::pool::PoolConfig;
pub use fabric_core::router::RouterConfig;
pub use fabric_core::accumulator::AccumulatorConfig;
pub use fabric_core::engine::RenderConfig;

/// Real-time screen-capture and frame-processing pipeline.
#[derive(Parser, Debug, Clone)]
#[command(name = "frame-fabric", version, about)]
pub struct Cli {
    /// Enter capture mode on the given display index.
    #[arg(long = "capture")]
    pub capture: Option<u32>,

    /// Show a live preview window while capturing.
    #[arg(long)]
    pub live: bool,

    /// Target capture tick rate in frames per second.
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Capture duration in seconds. `<= 0` captures a single snapshot.
    #[arg(long, default_value_t = 1)]
    pub seconds: i32,

    /// Resize each captured frame to `WxH`.
    #[arg(long)]
    pub resize: Option<Size>,

    /// Write non-duplicate frames as `BASE_%06d.bmp`.
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Skip the preflight static-scene wait.
    #[arg(long = "no-static-gate")]
    pub no_static_gate: bool,

    /// Required stable seconds for the static-scene gate.
    #[arg(long = "static-sec", default_value_t = 1.0)]
    pub static_sec: f64,

    /// Static-scene gate timeout in seconds.
    #[arg(long = "static-timeout", default_value_t = 10.0)]
    pub static_timeout: f64,

    /// Use signature-only equality (no byte compare) in the static gate.
    #[arg(long = "static-tolerant")]
    pub static_tolerant: bool,

    /// Apply a persistent BT.601 luma (grayscale) correction.
    #[arg(long)]
    pub grayscale: bool,

    /// Apply a gamma correction.
    #[arg(long)]
    pub gamma: Option<f64>,

    /// Apply an additive brightness correction in `[-1, 1]`.
    #[arg(long)]
    pub brightness: Option<f64>,

    /// Apply a multiplicative contrast correction around `0.5`.
    #[arg(long)]
    pub contrast: Option<f64>,

    /// Apply box pixelation with the given block size (`>= 2`).
    #[arg(long)]
    pub pixelate: Option<u32>,

    /// Disable activity-tracker gating (always allow dedupe).
    #[arg(long = "no-adaptive")]
    pub no_adaptive: bool,

    /// Write JSONL metrics to the given path.
    #[arg(long)]
    pub metrics: Option<PathBuf>,
}

/// CLI surface for the standalone synthetic-frame renderer (`fabric-render`).
///
/// `spec.md` §6 has no CLI table entry for the render path (it is exercised
/// as a library API); this is the enrichment that makes `StaticFrameEngine`
/// runnable standalone, following the same `clap`-derive shape as [`Cli`].
#[derive(Parser, Debug, Clone)]
#[command(name = "fabric-render", version, about)]
pub struct RenderCli {
    /// Output frame width.
    #[arg(long, default_value_t = 256)]
    pub width: u32,

    /// Output frame height.
    #[arg(long, default_value_t = 256)]
    pub height: u32,

    /// Tile width.
    #[arg(long = "tile-w", default_value_t = 32)]
    pub tile_w: u32,

    /// Tile height.
    #[arg(long = "tile-h", default_value_t = 32)]
    pub tile_h: u32,

    /// Supersamples per pixel along each axis.
    #[arg(long, default_value_t = 2)]
    pub spp: u32,

    /// Jitter subpixel sample positions instead of sampling at pixel centers.
    #[arg(long)]
    pub jitter: bool,

    /// Gamma applied to the rendered gradient.
    #[arg(long, default_value_t = 2.2)]
    pub gamma: f64,

    /// Number of frames to render.
    #[arg(long, default_value_t = 30)]
    pub frames: u32,

    /// Directory to write each frame as a numbered BMP, if given.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Write a PNG snapshot of the final frame to this path, if given.
    #[arg(long)]
    pub png: Option<PathBuf>,
}

/// Resize target derived from `--resize`, or "no resize" when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeSpec {
    pub width: u32,
    pub height: u32,
}

impl From<Size> for ResizeSpec {
    fn from(size: Size) -> Self {
        Self {
            width: size.width,
            height: size.height,
        }
    }
}

impl Cli {
    #[must_use]
    pub fn activity_config(&self) -> ActivityConfig {
        ActivityConfig::default()
    }

    #[must_use]
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            required_static_seconds: self.static_sec,
            timeout_seconds: self.static_timeout,
            tolerant: self.static_tolerant,
            fps_hint: f64::from(self.fps),
        }
    }

    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
    }
}

impl RenderCli {
    #[must_use]
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            width: self.width,
            height: self.height,
            tile_w: self.tile_w,
            tile_h: self.tile_h,
            spp_x: self.spp,
            spp_y: self.spp,
            jitter: self.jitter,
            gamma: self.gamma,
            weight_cap: AccumulatorConfig::default().weight_cap,
            worker_count: fabric_core::engine::default_worker_count(),
        }
    }

    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig::default()
    }
}
