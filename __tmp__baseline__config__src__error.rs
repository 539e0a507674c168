// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

/// Configuration-time errors: malformed CLI input, invalid combinations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid size `{0}`, expected WxH")]
    InvalidSize(String),
}


