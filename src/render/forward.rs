//! Forward compositor.
//!
//! Per pixel, front-to-back (ascending depth):
//!   T = 1, C = 0
//!   for each splat i in the tile list:
//!     a_i = min(opacity_i * p_i(pixel), clamp_max_alpha), skipped if below alpha_threshold
//!     C += f_i * a_i * T
//!     T *= 1 - a_i
//!     stop once T < 1 - saturate_threshold
//!
//! `C` is written as-is (premultiplied, not divided by coverage). Alongside it
//! we save the final `T` and `last_valid`, which is everything the backward
//! pass needs to rebuild each `a_i` and `T` in reverse. Coverage is `1 - T`;
//! at a saturated pixel (`T < 1e-4`) that value in f32 keeps only a few
//! digits of `T`, so `T` is what gets stored.

use rayon::prelude::*;

use crate::core::{FeatureImage, RasterConfig, RasterError};
use crate::render::block::{Splats, TileBlock};
use crate::render::tiles::{TileGrid, TileMapping};

/// Saved forward state for a padded image.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterOutput {
    /// Accumulated features, H × W × F
    pub image: FeatureImage,

    /// Final transmittance per pixel
    pub transmittance: Vec<f32>,

    /// Per pixel: exclusive end (absolute index into `overlap_to_point`) of the
    /// list prefix that contributed. Equal to the tile's range start when
    /// nothing did.
    pub last_valid: Vec<u32>,

    /// Threshold, clamp and saturation constants the image was composited with
    pub config: RasterConfig,
}

impl RasterOutput {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[inline]
    pub(crate) fn pixel_index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width() as usize + x as usize
    }

    pub fn transmittance_at(&self, x: u32, y: u32) -> f32 {
        self.transmittance[self.pixel_index(x, y)]
    }

    /// Accumulated alpha (coverage), `1 - T_final`
    pub fn alpha_at(&self, x: u32, y: u32) -> f32 {
        1.0 - self.transmittance_at(x, y)
    }

    pub fn last_valid_at(&self, x: u32, y: u32) -> u32 {
        self.last_valid[self.pixel_index(x, y)]
    }
}

/// Result of compositing one tile.
struct TileForward {
    features: Vec<f32>,
    transmittance: Vec<f32>,
    last_valid: Vec<u32>,
}

fn composite_tile(
    splats: Splats<'_>,
    mapping: &TileMapping,
    tile: usize,
    config: &RasterConfig,
) -> TileForward {
    let grid: TileGrid = mapping.grid;
    let area = grid.tile_area();
    let f = splats.feature_size;

    let mut block = TileBlock::new(splats, mapping, tile);
    let start = block.range().start;

    let mut features = vec![0.0f32; area * f];
    let mut transmittance = vec![1.0f32; area];
    let mut last_valid = vec![start; area];
    let mut saturated = vec![false; area];
    let mut remaining = area;

    for page in 0..block.num_pages() {
        block.load_front(page);

        for lane in 0..area {
            if saturated[lane] {
                continue;
            }
            let pixel = grid.pixel_center(tile, lane);
            let accum = &mut features[lane * f..(lane + 1) * f];
            let mut t = transmittance[lane];

            for entry in block.entries() {
                let point = entry.point;
                let Some(alpha) = config.splat_alpha(point.opacity * point.density_at(&pixel))
                else {
                    continue;
                };

                let weight = alpha * t;
                for (c, &feature) in accum.iter_mut().zip(entry.feature) {
                    *c += feature * weight;
                }
                t *= 1.0 - alpha;
                last_valid[lane] = entry.list_index + 1;

                if config.is_saturated(t) {
                    saturated[lane] = true;
                    remaining -= 1;
                    break;
                }
            }
            transmittance[lane] = t;
        }

        if remaining == 0 {
            break;
        }
    }

    TileForward {
        features,
        transmittance,
        last_valid,
    }
}

/// Composite every pixel of the padded image described by `mapping`.
///
/// Tiles run in parallel; within a tile every pixel lane shares the staged
/// pages of the tile's splat list.
#[tracing::instrument(skip_all, fields(points = splats.len(), overlaps = mapping.num_overlaps()))]
pub fn rasterize(
    splats: Splats<'_>,
    mapping: &TileMapping,
    config: &RasterConfig,
) -> Result<RasterOutput, RasterError> {
    config.validate()?;
    if mapping.grid.tile_size != config.tile_size {
        return Err(RasterError::NotTileMultiple {
            width: mapping.grid.width,
            height: mapping.grid.height,
            tile_size: config.tile_size,
        });
    }
    mapping.check_points(splats.len())?;

    let grid = mapping.grid;
    let f = splats.feature_size;

    let tiles: Vec<TileForward> = (0..grid.num_tiles())
        .into_par_iter()
        .map(|tile| composite_tile(splats, mapping, tile, config))
        .collect();

    let mut image = FeatureImage::new(grid.width, grid.height, f);
    let mut transmittance = vec![1.0f32; grid.width as usize * grid.height as usize];
    let mut last_valid = vec![0u32; transmittance.len()];

    for (tile, result) in tiles.into_iter().enumerate() {
        for lane in 0..grid.tile_area() {
            let (x, y) = grid.pixel(tile, lane);
            let idx = y as usize * grid.width as usize + x as usize;
            image
                .pixel_mut(x, y)
                .copy_from_slice(&result.features[lane * f..(lane + 1) * f]);
            transmittance[idx] = result.transmittance[lane];
            last_valid[idx] = result.last_valid[lane];
        }
    }

    tracing::debug!(tiles = grid.num_tiles(), "forward rasterization complete");

    Ok(RasterOutput {
        image,
        transmittance,
        last_valid,
        config: *config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Gaussian2D;
    use crate::render::tiles::map_to_tiles;
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};

    fn disc(x: f32, y: f32, sigma: f32, opacity: f32) -> Gaussian2D {
        Gaussian2D::from_covariance(
            Vector2::new(x, y),
            Vector3::new(sigma * sigma, 0.0, sigma * sigma),
            opacity,
        )
        .unwrap()
    }

    fn render(
        points: &[Gaussian2D],
        features: &[f32],
        feature_size: usize,
        depths: &[f32],
        size: u32,
        ts: u32,
    ) -> RasterOutput {
        let config = RasterConfig::default().with_tile_size(ts);
        let grid = TileGrid::new(size, size, ts).unwrap();
        let mapping = map_to_tiles(points, depths, grid, &config).unwrap();
        let splats = Splats::new(points, features, feature_size).unwrap();
        rasterize(splats, &mapping, &config).unwrap()
    }

    #[test]
    fn test_single_splat_center_pixel() {
        // Mean at a pixel center so density there is exactly 1.
        let points = vec![disc(1.5, 1.5, 1.0, 0.5)];
        let out = render(&points, &[1.0, 2.0], 2, &[1.0], 4, 4);

        assert_relative_eq!(out.image.pixel(1, 1)[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(out.image.pixel(1, 1)[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(out.alpha_at(1, 1), 0.5, epsilon = 1e-6);
        assert_eq!(out.last_valid_at(1, 1), 1);

        // One pixel away: exp(-0.5) falloff.
        assert_relative_eq!(
            out.image.pixel(2, 1)[0],
            0.5 * (-0.5f32).exp(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_front_splat_occludes() {
        let points = vec![disc(1.5, 1.5, 1.0, 0.5), disc(1.5, 1.5, 1.0, 0.5)];
        let features = vec![1.0, 0.0, 0.0, 1.0];
        let out = render(&points, &features, 2, &[2.0, 1.0], 4, 4);

        // Splat 1 is in front: 0.5 of its feature, then 0.5 * 0.5 of splat 0.
        let p = out.image.pixel(1, 1);
        assert_relative_eq!(p[0], 0.25, epsilon = 1e-6);
        assert_relative_eq!(p[1], 0.5, epsilon = 1e-6);
        assert_relative_eq!(out.alpha_at(1, 1), 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_image_is_transparent() {
        let out = render(&[], &[], 3, &[], 8, 4);
        assert!(out.image.data().iter().all(|&v| v == 0.0));
        assert!(out.transmittance.iter().all(|&t| t == 1.0));
        assert!(out.last_valid.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_long_list_spans_multiple_pages() {
        // 2×2 tiles → pages of 4; 10 faint splats stacked on one pixel.
        let points = vec![disc(0.5, 0.5, 0.5, 0.1); 10];
        let features = vec![1.0; 10];
        let depths: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let out = render(&points, &features, 1, &depths, 2, 2);

        let expected_t = 0.9f32.powi(10);
        assert_relative_eq!(out.alpha_at(0, 0), 1.0 - expected_t, epsilon = 1e-5);
        assert_relative_eq!(out.image.pixel(0, 0)[0], 1.0 - expected_t, epsilon = 1e-5);
        assert_eq!(out.last_valid_at(0, 0), 10);
    }

    #[test]
    fn test_zero_threshold_has_no_tile_seam() {
        let config = RasterConfig {
            tile_size: 4,
            alpha_threshold: 0.0,
            ..RasterConfig::default()
        };
        let grid = TileGrid::new(12, 4, 4).unwrap();
        let points = vec![disc(4.0, 2.5, 1.0, 1.0)];
        let mapping = map_to_tiles(&points, &[0.0], grid, &config).unwrap();
        let out = rasterize(Splats::new(&points, &[1.0], 1).unwrap(), &mapping, &config).unwrap();

        // Two tiles to the right of the mean: dx = 4.5, dy = 0.
        let expected = (-0.5f32 * 4.5 * 4.5).exp();
        assert!(out.image.pixel(8, 2)[0] > 0.0);
        assert_relative_eq!(out.image.pixel(8, 2)[0], expected, max_relative = 1e-5);
        assert_relative_eq!(out.image.pixel(11, 2)[0], (-0.5f32 * 7.5 * 7.5).exp(), max_relative = 1e-4);
    }

    #[test]
    fn test_rejects_mismatched_mapping() {
        let config = RasterConfig::default().with_tile_size(4);
        let grid = TileGrid::new(4, 4, 4).unwrap();
        let points = vec![disc(1.5, 1.5, 1.0, 0.5); 2];
        let mapping = map_to_tiles(&points, &[0.0, 1.0], grid, &config).unwrap();

        let fewer = &points[..1];
        let splats = Splats::new(fewer, &[1.0], 1).unwrap();
        assert!(matches!(
            rasterize(splats, &mapping, &config),
            Err(RasterError::InvalidMapping(_))
        ));
    }
}
