// SPDX-License-Identifier: MPL-2.0

//! The streaming frame fabric: capture -> dedupe -> coalesce -> retain ->
//! emit, plus the tile-parallel static-frame render engine. See `spec.md`
//! for the full specification this crate implements.

pub mod accumulator;
pub mod activity;
pub mod capture;
pub mod correction;
pub mod engine;
pub mod error;
pub mod gate;
pub mod live;
pub mod operand;
pub mod orchestrator;
pub mod pool;
pub mod raw_image;
pub mod resize;
pub mod ring;
pub mod router;
pub mod scope;
pub mod sinks;
pub mod spectrum;
pub mod stats;
pub mod tiler;
</content>
