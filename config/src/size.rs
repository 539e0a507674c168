// SPDX-License-Identifier: MPL-2.0

use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// A `WxH` pixel size, as accepted by `--resize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| ConfigError::InvalidSize(s.to_string()))?;

        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidSize(s.to_string()))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidSize(s.to_string()))?;

        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidSize(s.to_string()));
        }

        Ok(Self { width, height })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_size() {
        assert_eq!("1920x1080".parse::<Size>().unwrap(), Size::new(1920, 1080));
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!("0x100".parse::<Size>().is_err());
        assert!("100x0".parse::<Size>().is_err());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("nope".parse::<Size>().is_err());
        assert!("100x".parse::<Size>().is_err());
    }
}
