//! Gradients of `Splat::project` (splat parameters → screen-space record).
//!
//! Forward:
//!   v1 = r / |r|,  v2 = (-v1.y, v1.x)
//!   ix = exp(-2 log_s.x),  iy = exp(-2 log_s.y)
//!   conic = [v1.x² ix + v1.y² iy,  v1.x v1.y (ix - iy),  v1.y² ix + v1.x² iy]
//!   opacity = sigmoid(alpha_logit)
//!   mean = position

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::core::{sigmoid, Gaussian2D, Splat};

/// Gradient w.r.t. the optimizable parameters of one splat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SplatGrad {
    pub position: Vector2<f32>,
    pub log_scaling: Vector2<f32>,
    pub rotation: Vector2<f32>,
    pub alpha_logit: f32,
}

/// Chain dL/d(Gaussian2D) back through the projection of `splat`.
pub fn project_backward(splat: &Splat, d_point: &Gaussian2D) -> SplatGrad {
    let r = splat.rotation;
    let norm = r.norm();
    // Zero rotation projects with a fixed axis and has no rotation gradient.
    let (v1, inv_norm) = if norm > 0.0 && norm.is_finite() {
        (r / norm, 1.0 / norm)
    } else {
        (Vector2::new(1.0, 0.0), 0.0)
    };

    let ix = (-2.0 * splat.log_scaling.x).exp();
    let iy = (-2.0 * splat.log_scaling.y).exp();
    let (da, db, dc) = (d_point.conic.x, d_point.conic.y, d_point.conic.z);

    let xx = v1.x * v1.x;
    let yy = v1.y * v1.y;
    let xy = v1.x * v1.y;

    let d_ix = da * xx + db * xy + dc * yy;
    let d_iy = da * yy - db * xy + dc * xx;
    let log_scaling = Vector2::new(d_ix * -2.0 * ix, d_iy * -2.0 * iy);

    let d_v1 = Vector2::new(
        2.0 * da * v1.x * ix + db * v1.y * (ix - iy) + 2.0 * dc * v1.x * iy,
        2.0 * da * v1.y * iy + db * v1.x * (ix - iy) + 2.0 * dc * v1.y * ix,
    );
    // d(r/|r|)/dr = (I - v1 v1ᵀ) / |r|
    let rotation = (d_v1 - v1 * v1.dot(&d_v1)) * inv_norm;

    // dσ/dx = σ(x) * (1 - σ(x))
    let opacity = sigmoid(splat.alpha_logit);
    let alpha_logit = d_point.opacity * opacity * (1.0 - opacity);

    SplatGrad {
        position: d_point.mean,
        log_scaling,
        rotation,
        alpha_logit,
    }
}
