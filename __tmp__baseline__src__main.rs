// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use clap::Parser;
use eyre::Context;
use fabric_config::Cli;
use fabric_core::activity::ActivityConfig;
use fabric_core::capture::{Capture, Monitor};
use fabric_core::correction::CorrectionQueue;
use fabric_core::error::Error;
use fabric_core::gate::{self, GateConfig, ResizeTo};
use fabric_core::orchestrator::{CaptureOrchestrator, OrchestratorConfig};
use fabric_core::pool::PoolConfig;
use fabric_core::raw_image::RawImage;
use fabric_core::stats::{CountingStats, StatsSink};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

/// The capture backend this build ships with.
///
/// `spec.md` §1 treats the per-OS screen-grab primitive as an opaque
/// boundary the implementer supplies; this crate ships no real grabber, only
/// the contract. Any `--capture N` request against this stub surfaces
/// [`Error::UnsupportedPlatform`], matching the "no real backend in this
/// build" framing rather than crashing or silently returning blank frames.
struct PlatformCapture;

impl Capture for PlatformCapture {
    fn capture(&mut self, _display_index: u32) -> RawImage {
        RawImage::empty()
    }

    fn enumerate_displays(&self) -> Vec<Monitor> {
        Vec::new()
    }
}

fn init_logger() {
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);

    let log_format = tracing_subscriber::fmt::format()
        .pretty()
        .without_time()
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_thread_names(true);

    let log_filter = tracing_subscriber::fmt::Layer::default()
        .with_writer(std::io::stderr)
        .event_format(log_format)
        .with_filter(tracing_subscriber::filter::filter_fn(move |metadata| {
            metadata.level() == &tracing::Level::ERROR
                || (metadata.target().starts_with("frame_fabric") && metadata.level() <= &log_level)
                || (metadata.target().starts_with("fabric_core") && metadata.level() <= &log_level)
        }));

    tracing_subscriber::registry().with(log_filter).init();
}

/// Build the `CorrectionQueue` implied by the color-correction flags, in the
/// order the CLI table in `spec.md` §6 lists them.
fn build_corrections(cli: &Cli) -> CorrectionQueue {
    let queue = CorrectionQueue::new();

    if cli.grayscale {
        queue.enqueue_persistent(Arc::new(|img: &mut RawImage| {
            for px in img.bytes_mut().chunks_exact_mut(4) {
                let (b, g, r) = (f64::from(px[0]), f64::from(px[1]), f64::from(px[2]));
                // BT.601 luma.
                let y = (0.114 * b + 0.587 * g + 0.299 * r).round().clamp(0.0, 255.0) as u8;
                px[0] = y;
                px[1] = y;
                px[2] = y;
            }
        }));
    }

    if let Some(gamma) = cli.gamma {
        let inv_gamma = 1.0 / gamma;
        queue.enqueue_persistent(Arc::new(move |img: &mut RawImage| {
            for px in img.bytes_mut().chunks_exact_mut(4) {
                for c in &mut px[0..3] {
                    let v = (f64::from(*c) / 255.0).powf(inv_gamma);
                    *c = (v * 255.0).round().clamp(0.0, 255.0) as u8;
                }
            }
        }));
    }

    if let Some(brightness) = cli.brightness {
        let delta = brightness.clamp(-1.0, 1.0) * 255.0;
        queue.enqueue_persistent(Arc::new(move |img: &mut RawImage| {
            for px in img.bytes_mut().chunks_exact_mut(4) {
                for c in &mut px[0..3] {
                    *c = (f64::from(*c) + delta).round().clamp(0.0, 255.0) as u8;
                }
            }
        }));
    }

    if let Some(contrast) = cli.contrast {
        let factor = contrast.max(0.0);
        queue.enqueue_persistent(Arc::new(move |img: &mut RawImage| {
            for px in img.bytes_mut().chunks_exact_mut(4) {
                for c in &mut px[0..3] {
                    let v = (f64::from(*c) - 127.5) * factor + 127.5;
                    *c = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        }));
    }

    if let Some(block) = cli.pixelate {
        let block = block.max(2);
        queue.enqueue_persistent(Arc::new(move |img: &mut RawImage| {
            box_pixelate(img, block);
        }));
    }

    queue
}

/// Box-pixelate `img` in place: replace each `block x block` tile with its
/// average color.
fn box_pixelate(img: &mut RawImage, block: u32) {
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return;
    }

    let source = img.bytes().to_vec();
    let dest = img.bytes_mut();

    let mut by = 0;
    while by < height {
        let y1 = (by + block).min(height);
        let mut bx = 0;
        while bx < width {
            let x1 = (bx + block).min(width);

            let mut sums = [0u64; 3];
            let mut count = 0u64;
            for y in by..y1 {
                for x in bx..x1 {
                    let idx = (y as usize * width as usize + x as usize) * 4;
                    sums[0] += u64::from(source[idx]);
                    sums[1] += u64::from(source[idx + 1]);
                    sums[2] += u64::from(source[idx + 2]);
                    count += 1;
                }
            }
            let avg = sums.map(|s| (s / count.max(1)) as u8);

            for y in by..y1 {
                for x in bx..x1 {
                    let idx = (y as usize * width as usize + x as usize) * 4;
                    dest[idx] = avg[0];
                    dest[idx + 1] = avg[1];
                    dest[idx + 2] = avg[2];
                }
            }

            bx += block;
        }
        by += block;
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let Some(display_index) = cli.capture else {
        info!("no --capture N given; nothing to do");
        return Ok(());
    };

    let resize = cli.resize.map(|s| (s.width, s.height));
    let mut capture = PlatformCapture;

    if !cli.no_static_gate {
        let gate_config = GateConfig {
            required_static_seconds: cli.static_sec,
            timeout_seconds: cli.static_timeout,
            tolerant: cli.static_tolerant,
            fps_hint: f64::from(cli.fps),
        };
        let resize_to = resize.map(|(w, h)| ResizeTo { width: w, height: h });

        match gate::run(&mut capture, display_index, &gate_config, resize_to) {
            Ok(stable_seconds) => info!(stable_seconds, "static-scene gate passed"),
            Err(failure) => {
                return Err(Error::StaticGateTimeout {
                    elapsed: failure.elapsed_seconds,
                    required: gate_config.required_static_seconds,
                });
            }
        }
    }

    let ticks = if cli.seconds <= 0 {
        1
    } else {
        (cli.seconds as u64) * u64::from(cli.fps.max(1))
    };

    let orchestrator_config = OrchestratorConfig {
        display_index,
        fps: f64::from(cli.fps),
        ticks,
        resize,
        record_base: cli.record.clone(),
        metrics_path: cli.metrics.clone(),
        adaptive: !cli.no_adaptive,
    };

    let activity_config = if cli.no_adaptive {
        None
    } else {
        Some(ActivityConfig::default())
    };

    let stats: Arc<dyn StatsSink> = Arc::new(CountingStats::new());

    let mut orchestrator = CaptureOrchestrator::new(
        &mut capture,
        orchestrator_config,
        PoolConfig::default(),
        build_corrections(&cli),
        activity_config,
        stats,
    )?;

    let summary = orchestrator.run();
    println!("{summary}");

    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    if std::env::var("RUST_SPANTRACE").is_err() {
        unsafe {
            std::env::set_var("RUST_SPANTRACE", "0");
        }
    }

    init_logger();

    let cli = Cli::parse();

    if let Err(err) = run(cli).wrap_err("frame-fabric run failed") {
        error!(error = %err, "frame-fabric exiting with error");
        eprintln!("{err:#}");
        let code = err
            .downcast_ref::<Error>()
            .map_or(1, Error::exit_code);
        std::process::exit(code);
    }

    Ok(())
}
</content>

