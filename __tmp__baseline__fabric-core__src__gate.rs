// SPDX-License-Identifier: MPL-2.0

//! Blocking preflight: wait for a stable scene or fail (`spec.md` §4.5, C6).

use crate::capture::Capture;
use crate::operand::{frames_identical, signature_equal, OperandMap};
use crate::raw_image::RawImage;
use crate::resize::bilinear_resize;

/// Configuration for [`run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    pub required_static_seconds: f64,
    pub timeout_seconds: f64,
    /// Accept signature-only equality (no byte compare).
    pub tolerant: bool,
    pub fps_hint: f64,
}

/// Resize target applied before comparison, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResizeTo {
    pub width: u32,
    pub height: u32,
}

/// Outcome of a failed gate run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateFailure {
    pub last_diff_ratio: f64,
    pub elapsed_seconds: f64,
}

/// Run the static-scene preflight against `capture` on `display_index`.
///
/// Captures at `config.fps_hint` per tick (the caller is expected to drive
/// one tick per call of the supplied `tick` closure — here we model time by
/// counting ticks, since a real clock is a concern of the orchestrator, not
/// this pure decision function). `ticks` is the sequence of frames the
/// caller observed, already captured; this lets the gate be exercised
/// deterministically without sleeping in tests.
pub fn evaluate(
    config: &GateConfig,
    resize: Option<ResizeTo>,
    frames: impl IntoIterator<Item = RawImage>,
) -> Result<f64, GateFailure> {
    let tick_period = 1.0 / config.fps_hint.max(1.0);
    let mut consecutive = 0u64;
    let mut prev: Option<(RawImage, OperandMap)> = None;
    let mut elapsed = 0.0f64;
    let mut last_diff_ratio = 1.0;

    for raw in frames {
        elapsed += tick_period;
        if elapsed > config.timeout_seconds {
            break;
        }

        let frame = match resize {
            Some(r) => bilinear_resize(&raw, r.width, r.height),
            None => raw,
        };
        if !frame.ok() {
            consecutive = 0;
            prev = None;
            continue;
        }

        let sig = OperandMap::compute(&frame);

        let matched = match &prev {
            Some((prev_frame, prev_sig)) => {
                if config.tolerant {
                    signature_equal(&sig, prev_sig)
                } else {
                    frames_identical(&frame, prev_frame, &sig, prev_sig)
                }
            }
            None => false,
        };

        if matched {
            consecutive += 1;
            last_diff_ratio = 0.0;
        } else {
            consecutive = 0;
            last_diff_ratio = 1.0;
        }

        prev = Some((frame, sig));

        let stable_seconds = consecutive as f64 * tick_period;
        if stable_seconds >= config.required_static_seconds {
            return Ok(stable_seconds);
        }
    }

    Err(GateFailure {
        last_diff_ratio,
        elapsed_seconds: elapsed,
    })
}

/// Drive the gate live against a real `Capture`, one tick per loop
/// iteration, stopping at `config.timeout_seconds`.
pub fn run(
    capture: &mut dyn Capture,
    display_index: u32,
    config: &GateConfig,
    resize: Option<ResizeTo>,
) -> Result<f64, GateFailure> {
    let tick_period = 1.0 / config.fps_hint.max(1.0);
    let max_ticks = (config.timeout_seconds / tick_period).ceil() as u64 + 1;
    let frames = (0..max_ticks).map(|_| capture.capture(display_index));
    evaluate(config, resize, frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(required: f64, timeout: f64, fps: f64) -> GateConfig {
        GateConfig {
            required_static_seconds: required,
            timeout_seconds: timeout,
            tolerant: false,
            fps_hint: fps,
        }
    }

    #[test]
    fn gate_passes_on_sustained_identical_frames() {
        let frame = RawImage::solid(8, 8, 1, 2, 3);
        let frames = std::iter::repeat(frame).take(60);
        let result = evaluate(&cfg(1.0, 5.0, 30.0), None, frames);
        assert!(result.is_ok());
        assert!(result.unwrap() >= 1.0);
    }

    #[test]
    fn gate_fails_when_every_frame_differs() {
        let a = RawImage::solid(4, 4, 1, 1, 1);
        let b = RawImage::solid(4, 4, 2, 2, 2);
        let frames = (0..30).map(|i| if i % 2 == 0 { a.clone() } else { b.clone() });
        let result = evaluate(&cfg(2.0, 1.0, 30.0), None, frames);
        assert!(result.is_err());
    }

    #[test]
    fn required_exceeding_timeout_always_times_out() {
        let frame = RawImage::solid(4, 4, 1, 1, 1);
        let frames = std::iter::repeat(frame).take(10);
        let result = evaluate(&cfg(2.0, 1.0, 30.0), None, frames);
        assert!(result.is_err());
    }

    #[test]
    fn tolerant_mode_accepts_signature_only_equality() {
        let a = RawImage::solid(4, 4, 1, 2, 3);
        let frames = std::iter::repeat(a).take(60);
        let mut c = cfg(1.0, 5.0, 30.0);
        c.tolerant = true;
        assert!(evaluate(&c, None, frames).is_ok());
    }
}


