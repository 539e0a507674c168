// SPDX-License-Identifier: MPL-2.0

//! Standalone driver for the tile-parallel synthetic static-frame engine
//! (`spec.md` §1/§4.11, C13). Independent of the capture path: no display,
//! no dedupe, just the visible-spectrum gradient renderer.

use clap::Parser;
use fabric_config::RenderCli;
use fabric_core::engine::StaticFrameEngine;
use fabric_core::sinks::{numbered_path, write_bmp};
use tracing::{info, warn};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .pretty()
        .without_time()
        .with_target(false)
        .init();

    let cli = RenderCli::parse();
    let engine = StaticFrameEngine::new(cli.render_config(), cli.router_config());

    if let Some(out) = &cli.out {
        std::fs::create_dir_all(out)?;
    }

    let mut last_image = None;
    for frame_index in 0..cli.frames {
        let t = f64::from(frame_index) / 30.0;
        let output = engine.render_next_frame(t);
        let dirty_tiles = output.dirty_mask.iter().filter(|&&d| d).count();

        info!(
            frame_index,
            dirty_tiles,
            total_tiles = output.dirty_mask.len(),
            calibrated = output.calibration_complete,
            "rendered frame"
        );

        if let Some(out) = &cli.out {
            let path = numbered_path(&out.join("frame"), u64::from(frame_index));
            if let Err(e) = write_bmp(&path, &output.image) {
                warn!(?path, error = %e, "failed to write rendered frame");
            }
        }

        last_image = Some(output.image);
    }

    if let (Some(png_path), Some(image)) = (&cli.png, &last_image) {
        let buffer = image::RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let px = image.pixel(x, y).expect("in bounds");
            image::Rgb([px[2], px[1], px[0]])
        });
        buffer.save(png_path)?;
        info!(?png_path, "wrote final-frame PNG snapshot");
    }

    Ok(())
}
</content>


