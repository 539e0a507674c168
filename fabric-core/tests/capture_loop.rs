// SPDX-License-Identifier: MPL-2.0

//! End-to-end scenarios from `spec.md` §8 driven through the public
//! `fabric-core` API: a deterministic `Capture` fixture feeding a real
//! `CaptureOrchestrator`, checking pool state, written files, and exit-code
//! semantics together rather than each component in isolation.

use std::sync::Arc;

use fabric_core::capture::FixtureCapture;
use fabric_core::correction::CorrectionQueue;
use fabric_core::error::Error;
use fabric_core::gate::{self, GateConfig};
use fabric_core::orchestrator::{CaptureOrchestrator, OrchestratorConfig};
use fabric_core::pool::PoolConfig;
use fabric_core::raw_image::RawImage;
use fabric_core::stats::NullStats;

fn orchestrator_config(ticks: u64, fps: f64, record_base: Option<std::path::PathBuf>) -> OrchestratorConfig {
    OrchestratorConfig {
        display_index: 1,
        fps,
        ticks,
        resize: None,
        record_base,
        metrics_path: None,
        adaptive: false,
        live: false,
    }
}

/// Scenario 6 ("Record dedupe"): pattern `[A, A, A, B, B, A]` should write
/// exactly three BMPs, at the indices where the image first changes, and
/// report `duplicates_skipped == 3`.
#[test]
fn record_dedupe_writes_only_on_change() {
    let a = RawImage::solid(4, 4, 10, 20, 30);
    let b = RawImage::solid(4, 4, 200, 150, 100);
    let pattern = vec![
        a.clone(),
        a.clone(),
        a.clone(),
        b.clone(),
        b.clone(),
        a.clone(),
    ];

    let dir = std::env::temp_dir().join(format!(
        "fabric-core-record-dedupe-{}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let base = dir.join("frame");

    let mut capture = FixtureCapture::new(pattern);
    let mut orchestrator = CaptureOrchestrator::new(
        &mut capture,
        orchestrator_config(6, 1000.0, Some(base.clone())),
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

    assert_eq!(summary.unique, 3);
    assert_eq!(summary.duplicates, 3);

    for index in [0u64, 3, 5] {
        let path = fabric_core::sinks::numbered_path(&base, index);
        assert!(path.exists(), "expected {path:?} to exist");
    }
    for index in [1u64, 2, 4] {
        let path = fabric_core::sinks::numbered_path(&base, index);
        assert!(!path.exists(), "expected {path:?} to be absent");
    }

    std::fs::remove_dir_all(&dir).ok();
}

/// Scenario 4 ("Static gate pass"): a sustained-identical fixture should let
/// the gate succeed before the orchestrator ticks at all.
#[test]
fn static_gate_passes_then_orchestrator_runs() {
    let frame = RawImage::solid(8, 8, 5, 5, 5);
    let mut capture = FixtureCapture::repeating(frame);

    let gate_config = GateConfig {
        required_static_seconds: 1.0,
        timeout_seconds: 5.0,
        tolerant: false,
        fps_hint: 30.0,
    };
    let stable = gate::run(&mut capture, 1, &gate_config, None).unwrap();
    assert!(stable >= 1.0);

    let mut orchestrator = CaptureOrchestrator::new(
        &mut capture,
        orchestrator_config(5, 30.0, None),
        PoolConfig::default(),
        CorrectionQueue::new(),
        None,
        Arc::new(NullStats),
    )
    .unwrap();
    let summary = orchestrator.run();
    assert_eq!(summary.ticks_attempted, 5);
}

/// Scenario 5 ("Static gate fail"): an always-different fixture must time
/// out, and the orchestrator is never even constructed in the real CLI path
/// (`spec.md` §6 exit code 2).
#[test]
fn static_gate_times_out_on_constant_change() {
    let a = RawImage::solid(4, 4, 1, 1, 1);
    let b = RawImage::solid(4, 4, 2, 2, 2);
    let mut capture = FixtureCapture::new(
        (0..30)
            .map(|i| if i % 2 == 0 { a.clone() } else { b.clone() })
            .collect(),
    );

    let gate_config = GateConfig {
        required_static_seconds: 2.0,
        timeout_seconds: 1.0,
        tolerant: false,
        fps_hint: 30.0,
    };
    let result = gate::run(&mut capture, 1, &gate_config, None);
    assert!(result.is_err());
}

/// A display index the capture fixture doesn't know about is rejected with
/// the startup-class error, never surfacing as a data-path panic.
#[test]
fn unknown_display_index_is_a_startup_error_with_exit_code_one() {
    let mut capture = FixtureCapture::repeating(RawImage::solid(4, 4, 1, 1, 1));
    let mut config = orchestrator_config(1, 30.0, None);
    config.display_index = 99;
    let result = CaptureOrchestrator::new(
        &mut capture,
        config,
        PoolConfig::default(),
        CorrectionQueue::new(),
        None,
        Arc::new(NullStats),
    );

    match result {
        Err(err @ Error::DisplayNotFound(99)) => assert_eq!(err.exit_code(), 1),
        other => panic!("expected DisplayNotFound(99), got {other:?}"),
    }
}
</content>
