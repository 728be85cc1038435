//! Small scalar and 2×2 helpers shared by the renderer and its gradients.

use nalgebra::{Vector2, Vector3};

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
///
/// Maps R → (0, 1)
/// Used for opacity (converts unbounded optimization to valid probability)
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Inverse sigmoid (logit): logit(p) = log(p / (1-p))
///
/// Maps (0, 1) → R
pub fn inverse_sigmoid(p: f32) -> f32 {
    // Clamp to avoid log(0) or division by zero
    let p_clamped = p.clamp(1e-6, 1.0 - 1e-6);
    (p_clamped / (1.0 - p_clamped)).ln()
}

/// Invert a symmetric 2×2 matrix stored as `[xx, xy, yy]`.
///
/// Returns `None` for non-positive or non-finite determinants; callers treat
/// such primitives as having no screen extent.
pub fn inverse_sym2(m: &Vector3<f32>) -> Option<Vector3<f32>> {
    let det = m.x * m.z - m.y * m.y;
    if !det.is_finite() || det <= 0.0 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some(Vector3::new(m.z * inv_det, -m.y * inv_det, m.x * inv_det))
}

/// Unit direction and its perpendicular, `(v1, v2)` with `v2 = (-v1.y, v1.x)`.
///
/// A zero-length input falls back to the x axis.
pub fn orthonormal_basis(direction: &Vector2<f32>) -> (Vector2<f32>, Vector2<f32>) {
    let norm = direction.norm();
    let v1 = if norm > 0.0 && norm.is_finite() {
        direction / norm
    } else {
        Vector2::new(1.0, 0.0)
    };
    (v1, Vector2::new(-v1.y, v1.x))
}

/// Round `x` up to the next multiple of `multiple`.
pub fn round_up_to_multiple(x: u32, multiple: u32) -> u32 {
    x.div_ceil(multiple) * multiple
}
