//! Gradients for 2D Gaussian evaluation in conic form.
//!
//! Forward (see `core::conic_pdf`):
//!   p = exp(-q)
//!   q = 0.5 * (a dx² + c dy²) + b dx dy
//!   d = [dx, dy] = [px - mx, py - my]
//!
//! This module provides gradients w.r.t:
//! - mean (mx, my)
//! - conic entries (a, b, c) of Σ⁻¹ = [[a, b], [b, c]]

use nalgebra::{Vector2, Vector3};

use crate::core::conic_pdf;

#[derive(Clone, Copy, Debug)]
pub struct ConicPdfGrads {
    pub value: f32,
    pub d_mean: Vector2<f32>,
    pub d_conic: Vector3<f32>,
}

/// Evaluate a 2D Gaussian and its gradients w.r.t. mean and conic.
///
/// `value` is computed by `conic_pdf` itself, so it is bit-identical to what
/// the forward pass sees for the same inputs.
#[inline]
pub fn conic_pdf_with_grad(
    pixel: &Vector2<f32>,
    mean: &Vector2<f32>,
    conic: &Vector3<f32>,
) -> ConicPdfGrads {
    let value = conic_pdf(pixel, mean, conic);

    let dx = pixel.x - mean.x;
    let dy = pixel.y - mean.y;

    // dp/dq = -p, dq/d(dx) = a dx + b dy, d(dx)/d(mx) = -1
    let d_mean = Vector2::new(
        (conic.x * dx + conic.y * dy) * value,
        (conic.y * dx + conic.z * dy) * value,
    );

    // dq/da = 0.5 dx², dq/db = dx dy, dq/dc = 0.5 dy²
    let d_conic = Vector3::new(
        -0.5 * dx * dx * value,
        -dx * dy * value,
        -0.5 * dy * dy * value,
    );

    ConicPdfGrads {
        value,
        d_mean,
        d_conic,
    }
}
