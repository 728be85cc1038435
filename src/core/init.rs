//! Initialization utilities for splat clouds.

use nalgebra::Vector2;
use rand::Rng;

use crate::core::error::RasterError;
use crate::core::math::inverse_sigmoid;
use crate::core::splat::{Splat, SplatCloud};

/// Scatter `count` splats uniformly over a `width × height` image.
///
/// Scales are drawn so splat radii stay between roughly 1% and 8% of the
/// smaller image side; opacities between 0.3 and 0.95; features uniform in
/// [0, 1); depths uniform in [0, 1).
pub fn random_cloud<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    image_size: (u32, u32),
    feature_size: usize,
) -> Result<SplatCloud, RasterError> {
    let (width, height) = image_size;
    let side = width.min(height).max(1) as f32;
    let min_log_scale = (0.01 * side).max(0.5).ln();
    let max_log_scale = (0.08 * side).max(1.0).ln();

    let mut cloud = SplatCloud::new(feature_size)?;
    let mut feature = vec![0.0f32; feature_size];

    for _ in 0..count {
        let position = Vector2::new(
            rng.gen_range(0.0..width.max(1) as f32),
            rng.gen_range(0.0..height.max(1) as f32),
        );
        let log_scaling = Vector2::new(
            rng.gen_range(min_log_scale..=max_log_scale),
            rng.gen_range(min_log_scale..=max_log_scale),
        );
        let angle: f32 = rng.gen_range(0.0..std::f32::consts::PI);
        let rotation = Vector2::new(angle.cos(), angle.sin());
        let alpha_logit = inverse_sigmoid(rng.gen_range(0.3..0.95));
        let depth = rng.gen_range(0.0..1.0);

        for f in feature.iter_mut() {
            *f = rng.gen_range(0.0..1.0);
        }
        cloud.push(
            Splat::new(position, log_scaling, rotation, alpha_logit, depth),
            &feature,
        )?;
    }

    Ok(cloud)
}
