//! Rasterizer configuration.
//!
//! Every constant that decides whether a splat contributes to a pixel lives
//! here, so the forward and backward passes read them from the same place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by [`RasterConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tile_size must be at least 1")]
    ZeroTileSize,

    #[error("clamp_max_alpha must lie in (0, 1), got {0}")]
    ClampMaxAlpha(f32),

    #[error("alpha_threshold must lie in [0, clamp_max_alpha), got {0}")]
    AlphaThreshold(f32),

    #[error("saturate_threshold must lie in (0, 1], got {0}")]
    SaturateThreshold(f32),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Edge length of a square screen tile in pixels
    pub tile_size: u32,

    /// Upper bound on a single splat's alpha; keeps `1 - alpha` away from zero
    pub clamp_max_alpha: f32,

    /// Splats with `opacity * density` below this are skipped.
    ///
    /// Tile binning uses the exact footprint where this test passes. At 0
    /// every splat reaches every pixel and is listed in every tile.
    pub alpha_threshold: f32,

    /// A pixel stops compositing once its accumulated alpha reaches this
    pub saturate_threshold: f32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            tile_size: 16,
            clamp_max_alpha: 0.99,
            alpha_threshold: 1.0 / 255.0,
            saturate_threshold: 0.9999,
        }
    }
}

impl RasterConfig {
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 {
            return Err(ConfigError::ZeroTileSize);
        }
        if !(self.clamp_max_alpha > 0.0 && self.clamp_max_alpha < 1.0) {
            return Err(ConfigError::ClampMaxAlpha(self.clamp_max_alpha));
        }
        if !(self.alpha_threshold >= 0.0 && self.alpha_threshold < self.clamp_max_alpha) {
            return Err(ConfigError::AlphaThreshold(self.alpha_threshold));
        }
        if !(self.saturate_threshold > 0.0 && self.saturate_threshold <= 1.0) {
            return Err(ConfigError::SaturateThreshold(self.saturate_threshold));
        }
        Ok(())
    }

    /// Pixels per tile, which is also the staging page length.
    pub fn tile_area(&self) -> usize {
        (self.tile_size as usize) * (self.tile_size as usize)
    }

    /// Apply the threshold/clamp policy to a raw alpha (`opacity * density`).
    ///
    /// `None` means the splat is skipped at this pixel. NaN is skipped too.
    #[inline]
    pub fn splat_alpha(&self, alpha_raw: f32) -> Option<f32> {
        if alpha_raw >= self.alpha_threshold {
            Some(alpha_raw.min(self.clamp_max_alpha))
        } else {
            None
        }
    }

    /// True when the clamp was active for this raw alpha.
    #[inline]
    pub fn is_clamped(&self, alpha_raw: f32) -> bool {
        alpha_raw > self.clamp_max_alpha
    }

    /// Early-termination test on the running transmittance.
    #[inline]
    pub fn is_saturated(&self, transmittance: f32) -> bool {
        transmittance < 1.0 - self.saturate_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RasterConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.tile_area(), 256);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = RasterConfig::default();

        assert_eq!(
            base.with_tile_size(0).validate(),
            Err(ConfigError::ZeroTileSize)
        );
        for clamp in [0.0, 1.0, 1.5, f32::NAN] {
            let config = RasterConfig {
                clamp_max_alpha: clamp,
                ..base
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::ClampMaxAlpha(_))
            ));
        }
        let config = RasterConfig {
            alpha_threshold: 0.995,
            ..base
        };
        assert_eq!(config.validate(), Err(ConfigError::AlphaThreshold(0.995)));
        let config = RasterConfig {
            saturate_threshold: 0.0,
            ..base
        };
        assert_eq!(config.validate(), Err(ConfigError::SaturateThreshold(0.0)));
    }

    #[test]
    fn test_splat_alpha_policy() {
        let config = RasterConfig::default();
        assert_eq!(config.splat_alpha(0.001), None);
        assert_eq!(config.splat_alpha(f32::NAN), None);
        assert_eq!(config.splat_alpha(0.5), Some(0.5));
        assert_eq!(config.splat_alpha(1.0), Some(0.99));
        assert!(config.is_clamped(1.0));
        assert!(!config.is_clamped(0.5));
    }

    #[test]
    fn test_saturation() {
        let config = RasterConfig::default();
        assert!(!config.is_saturated(1.0));
        assert!(!config.is_saturated(2e-4));
        assert!(config.is_saturated(1e-6));
    }

    #[test]
    fn test_deserialize_partial_json_uses_defaults() {
        let config: RasterConfig = serde_json::from_str(r#"{ "tile_size": 8 }"#).unwrap();
        assert_eq!(config.tile_size, 8);
        assert_eq!(config.clamp_max_alpha, 0.99);
        assert_eq!(config.saturate_threshold, 0.9999);
    }
}
