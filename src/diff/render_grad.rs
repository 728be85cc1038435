//! Backward pass of `render_gaussians`.
//!
//! crop → zero-pad the upstream gradient, rasterize backward on the saved
//! mapping and forward state, then chain each point gradient through the
//! splat projection.

use serde::{Deserialize, Serialize};

use crate::core::{FeatureImage, RasterConfig, RasterError, SplatCloud};
use crate::diff::project_grad::{project_backward, SplatGrad};
use crate::diff::rasterize_grad::rasterize_backward;
use crate::render::RenderContext;

/// Gradients w.r.t. every optimizable value of a [`SplatCloud`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudGrads {
    pub splats: Vec<SplatGrad>,

    /// dL/d(feature), flat `N × F`
    pub features: Vec<f32>,
}

impl CloudGrads {
    /// L2 norms of the (position, log_scaling, rotation, alpha_logit, feature)
    /// gradient blocks.
    pub fn norms(&self) -> [f32; 5] {
        let mut sq = [0.0f32; 5];
        for g in &self.splats {
            sq[0] += g.position.norm_squared();
            sq[1] += g.log_scaling.norm_squared();
            sq[2] += g.rotation.norm_squared();
            sq[3] += g.alpha_logit * g.alpha_logit;
        }
        sq[4] = self.features.iter().map(|v| v * v).sum();
        sq.map(f32::sqrt)
    }
}

/// Back-propagate `grad_image` (dL/d of the cropped image returned by
/// `render_gaussians`) to `cloud`.
///
/// `context` must come from rendering this same `cloud` with `config`;
/// a config other than the one stored in `context.raster` is rejected.
#[tracing::instrument(skip_all, fields(splats = cloud.len()))]
pub fn render_gaussians_backward(
    cloud: &SplatCloud,
    context: &RenderContext,
    grad_image: &FeatureImage,
    config: &RasterConfig,
) -> Result<CloudGrads, RasterError> {
    let (width, height) = context.image_size;
    let f = cloud.feature_size();
    if grad_image.width() != width || grad_image.height() != height || grad_image.channels() != f
    {
        return Err(RasterError::ImageShape {
            what: "render grad image",
            expected_width: width,
            expected_height: height,
            expected_channels: f,
            width: grad_image.width(),
            height: grad_image.height(),
            channels: grad_image.channels(),
        });
    }
    crate::core::expect_len("render context points", cloud.len(), context.points.len())?;

    // Padding pixels never reach the loss.
    let padded = grad_image.pad(context.grid.width, context.grid.height);
    let splats = context.splats(cloud)?;
    let raster = rasterize_backward(splats, &context.mapping, &context.raster, &padded, config)?;

    let splat_grads = cloud
        .splats
        .iter()
        .zip(&raster.points)
        .map(|(splat, d_point)| project_backward(splat, d_point))
        .collect();

    Ok(CloudGrads {
        splats: splat_grads,
        features: raster.features,
    })
}
