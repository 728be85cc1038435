//! Boundary errors.
//!
//! These are shape and precondition checks done once per call; the per-pixel
//! loops never fail.

use thiserror::Error;

use crate::core::config::{ConfigError, RasterConfig};

#[derive(Debug, Error, PartialEq)]
pub enum RasterError {
    #[error("invalid raster config: {0}")]
    Config(#[from] ConfigError),

    #[error("image size {width}x{height} is not a multiple of tile size {tile_size}")]
    NotTileMultiple {
        width: u32,
        height: u32,
        tile_size: u32,
    },

    #[error("feature size must be at least 1")]
    ZeroFeatureSize,

    #[error("{what}: expected {expected} values, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: expected {expected_width}x{expected_height}x{expected_channels}, got {width}x{height}x{channels}")]
    ImageShape {
        what: &'static str,
        expected_width: u32,
        expected_height: u32,
        expected_channels: usize,
        width: u32,
        height: u32,
        channels: usize,
    },

    #[error("tile mapping is inconsistent: {0}")]
    InvalidMapping(String),

    #[error("backward config {backward:?} differs from the forward config {forward:?}")]
    ConfigMismatch {
        forward: RasterConfig,
        backward: RasterConfig,
    },
}

/// Check a buffer length, naming the buffer in the error.
pub(crate) fn expect_len(what: &'static str, expected: usize, actual: usize) -> Result<(), RasterError> {
    if expected == actual {
        Ok(())
    } else {
        Err(RasterError::LengthMismatch {
            what,
            expected,
            actual,
        })
    }
}
