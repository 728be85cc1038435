//! Backward pass of the tile compositor.
//!
//! Forward (per pixel, front-to-back over the tile list):
//!   C = Σ_i f_i a_i T_i,   T_i = Π_{j<i} (1 - a_j)
//!
//! Differentiating w.r.t. a_i:
//!   dC/da_i = f_i T_i - 1/(1 - a_i) * Σ_{j>i} f_j a_j T_j
//!
//! Walking back-to-front we keep the suffix sum
//!   w_i = Σ_{j>i} f_j a_j T_j,   w_last = 0,   w_{i-1} = w_i + f_i a_i T_i
//! and rebuild T_i from the saved final transmittance by dividing out
//! (1 - a_i) instead of storing per-splat state:
//!   T_final = 1 - alpha,   T_i = T_{i+1} / (1 - a_i)
//!
//! a_i is recomputed with the same density, threshold and clamp as the
//! forward pass, so the entries that are skipped here are exactly the ones
//! skipped there.

use rayon::prelude::*;
use std::ops::AddAssign;

use crate::core::{expect_len, FeatureImage, Gaussian2D, RasterConfig, RasterError};
use crate::diff::gaussian2d_grad::conic_pdf_with_grad;
use crate::render::{RasterOutput, Splats, TileBlock, TileMapping};

/// Gradients with the same layout as the rasterizer inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterGrads {
    /// dL/d(mean, conic, opacity) per splat
    pub points: Vec<Gaussian2D>,

    /// dL/d(feature), flat `N × F`
    pub features: Vec<f32>,
}

impl RasterGrads {
    pub fn zeros(num_points: usize, feature_size: usize) -> Self {
        Self {
            points: vec![Gaussian2D::zeros(); num_points],
            features: vec![0.0; num_points * feature_size],
        }
    }
}

impl AddAssign<&RasterGrads> for RasterGrads {
    fn add_assign(&mut self, rhs: &RasterGrads) {
        for (a, b) in self.points.iter_mut().zip(&rhs.points) {
            *a += *b;
        }
        for (a, b) in self.features.iter_mut().zip(&rhs.features) {
            *a += *b;
        }
    }
}

/// Gradients of one tile, indexed by position in the tile's list.
///
/// Accumulating per list entry first keeps the hot loop free of scattered
/// writes; the result is added into the worker's full buffers afterwards.
struct TileGrads {
    points: Vec<Gaussian2D>,
    features: Vec<f32>,
}

fn backprop_tile(
    splats: Splats<'_>,
    mapping: &TileMapping,
    tile: usize,
    forward: &RasterOutput,
    grad_image: &FeatureImage,
    config: &RasterConfig,
    acc: &mut RasterGrads,
) {
    let grid = mapping.grid;
    let area = grid.tile_area();
    let f = splats.feature_size;

    let mut block = TileBlock::new(splats, mapping, tile);
    let range = block.range();
    if range.is_empty() {
        return;
    }

    let mut local = TileGrads {
        points: vec![Gaussian2D::zeros(); range.len()],
        features: vec![0.0; range.len() * f],
    };

    // Per-lane reverse state.
    let mut transmittance = vec![0.0f32; area];
    let mut last_valid = vec![0u32; area];
    let mut suffix = vec![0.0f32; area * f];
    for lane in 0..area {
        let (x, y) = grid.pixel(tile, lane);
        transmittance[lane] = forward.transmittance_at(x, y);
        last_valid[lane] = forward.last_valid_at(x, y);
    }

    for page in 0..block.num_pages() {
        block.load_back(page);

        for lane in 0..area {
            let last = last_valid[lane];
            if last <= range.start {
                continue;
            }
            let (x, y) = grid.pixel(tile, lane);
            let pixel = grid.pixel_center(tile, lane);
            let grad_pixel = grad_image.pixel(x, y);
            let w = &mut suffix[lane * f..(lane + 1) * f];
            let mut t = transmittance[lane];

            for entry in block.entries() {
                if entry.list_index >= last {
                    continue;
                }
                let point = entry.point;
                let pdf = conic_pdf_with_grad(&pixel, &point.mean, &point.conic);
                let alpha_raw = point.opacity * pdf.value;
                let Some(alpha) = config.splat_alpha(alpha_raw) else {
                    continue;
                };

                let one_minus_alpha = 1.0 - alpha;
                t /= one_minus_alpha;

                let slot = (entry.list_index - range.start) as usize;
                let grad_feature = &mut local.features[slot * f..(slot + 1) * f];
                let weight = alpha * t;

                let mut alpha_grad = 0.0f32;
                for k in 0..f {
                    let feature = entry.feature[k];
                    alpha_grad += (feature * t - w[k] / one_minus_alpha) * grad_pixel[k];
                    w[k] += feature * weight;
                    grad_feature[k] += weight * grad_pixel[k];
                }

                // d(min(raw, clamp))/d(raw) = 0 once clamped
                if !config.is_clamped(alpha_raw) {
                    local.points[slot] += Gaussian2D::new(
                        pdf.d_mean * point.opacity,
                        pdf.d_conic * point.opacity,
                        pdf.value,
                    ) * alpha_grad;
                }
            }
            transmittance[lane] = t;
        }
    }

    let list = mapping.tile_points(tile);
    for (slot, &point) in list.iter().enumerate() {
        let point = point as usize;
        acc.points[point] += local.points[slot];
        for (a, g) in acc.features[point * f..(point + 1) * f]
            .iter_mut()
            .zip(&local.features[slot * f..(slot + 1) * f])
        {
            *a += *g;
        }
    }
}

/// Back-propagate `grad_image` (dL/d image, padded size) to every splat.
///
/// `mapping` and `forward` must be the exact artifacts used to produce the
/// image, and `config` must equal `forward.config`; a different config is
/// rejected with [`RasterError::ConfigMismatch`]. Tiles run in parallel; each
/// worker accumulates into its own buffers and the buffers are summed at the
/// end, so the result does not depend on scheduling beyond floating-point
/// reassociation.
///
/// Where the clamp is active (`opacity * pdf > clamp_max_alpha`) the splat's
/// alpha does not depend on its mean, conic or opacity, so that pixel adds
/// nothing to those gradients; only its feature gradient and the
/// transmittance seen by splats behind it are affected. A splat whose core
/// is clamped therefore gets mean, conic and opacity gradients only from its
/// unclamped fringe, and an opacity pushed past the clamp receives no pull
/// back from pixels where it is clamped.
#[tracing::instrument(skip_all, fields(points = splats.len(), overlaps = mapping.num_overlaps()))]
pub fn rasterize_backward(
    splats: Splats<'_>,
    mapping: &TileMapping,
    forward: &RasterOutput,
    grad_image: &FeatureImage,
    config: &RasterConfig,
) -> Result<RasterGrads, RasterError> {
    config.validate()?;
    if forward.config != *config {
        return Err(RasterError::ConfigMismatch {
            forward: forward.config,
            backward: *config,
        });
    }
    mapping.check_points(splats.len())?;

    let grid = mapping.grid;
    let f = splats.feature_size;
    if grid.tile_size != config.tile_size {
        return Err(RasterError::NotTileMultiple {
            width: grid.width,
            height: grid.height,
            tile_size: config.tile_size,
        });
    }
    for (what, image) in [("grad image", grad_image), ("forward image", &forward.image)] {
        if image.width() != grid.width || image.height() != grid.height || image.channels() != f {
            return Err(RasterError::ImageShape {
                what,
                expected_width: grid.width,
                expected_height: grid.height,
                expected_channels: f,
                width: image.width(),
                height: image.height(),
                channels: image.channels(),
            });
        }
    }
    let pixels = grid.width as usize * grid.height as usize;
    expect_len("forward transmittance", pixels, forward.transmittance.len())?;
    expect_len("forward last_valid", pixels, forward.last_valid.len())?;

    let n = splats.len();
    let grads = (0..grid.num_tiles())
        .into_par_iter()
        .fold(
            || RasterGrads::zeros(n, f),
            |mut acc, tile| {
                backprop_tile(splats, mapping, tile, forward, grad_image, config, &mut acc);
                acc
            },
        )
        .reduce(
            || RasterGrads::zeros(n, f),
            |mut a, b| {
                a += &b;
                a
            },
        );

    tracing::debug!(tiles = grid.num_tiles(), "backward rasterization complete");

    Ok(grads)
}
