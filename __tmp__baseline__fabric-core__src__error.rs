// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use thiserror::Error;

/// Startup-class and fatal-path failures (`spec.md` §7 "Startup" / "Resource
/// exhaustion" surfaced past a retry budget). Data-path functions never
/// return this type — they degrade via `Option`/`bool` per the spec's
/// "no exceptions in the data path" policy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("display {0} not found")]
    DisplayNotFound(u32),

    #[error("could not create recording directory {0:?}: {1}")]
    RecordingDirUncreatable(PathBuf, #[source] std::io::Error),

    #[error("sink write failed after exhausting retry budget: {0}")]
    SinkRetriesExhausted(String),

    #[error("static scene gate timed out after {elapsed:.2}s (required {required:.2}s)")]
    StaticGateTimeout { elapsed: f64, required: f64 },

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl Error {
    /// Process exit code per `spec.md` §6.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::DisplayNotFound(_) | Error::UnsupportedPlatform(_) => 1,
            Error::StaticGateTimeout { .. } => 2,
            Error::RecordingDirUncreatable(..) | Error::SinkRetriesExhausted(_) => 1,
        }
    }
}


