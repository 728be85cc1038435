//! Screen-space Gaussian primitive consumed by the rasterizer.
//!
//! A primitive is a packed 6-float record:
//! - `mean` (x, y) in pixel coordinates
//! - `conic` (a, b, c): inverse covariance Σ⁻¹ = [[a, b], [b, c]]
//! - `opacity` in [0, 1]
//!
//! Gradient buffers reuse the same record, so a gradient has exactly the
//! shape of the primitive it belongs to.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul};

use crate::core::math::inverse_sym2;

/// Number of floats in a packed [`Gaussian2D`].
pub const GAUSSIAN2D_LEN: usize = 6;

/// Evaluate the unnormalized 2D Gaussian density at `pixel`.
///
/// p = exp(-(0.5 * (a dx² + c dy²) + b dx dy))
///
/// This is the single density formula used by both the forward and backward
/// passes; alphas only reconstruct exactly if both sides evaluate it the same way.
#[inline]
pub fn conic_pdf(pixel: &Vector2<f32>, mean: &Vector2<f32>, conic: &Vector3<f32>) -> f32 {
    let dx = pixel.x - mean.x;
    let dy = pixel.y - mean.y;
    let inner = 0.5 * (dx * dx * conic.x + dy * dy * conic.z) + dx * dy * conic.y;
    (-inner).exp()
}

/// A 2D Gaussian splat after projection to screen space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gaussian2D {
    /// Center in pixel coordinates
    pub mean: Vector2<f32>,

    /// Inverse covariance stored as [a, b, c]
    pub conic: Vector3<f32>,

    /// Peak alpha of the splat
    pub opacity: f32,
}

impl Gaussian2D {
    pub fn new(mean: Vector2<f32>, conic: Vector3<f32>, opacity: f32) -> Self {
        Self {
            mean,
            conic,
            opacity,
        }
    }

    /// All-zero record; the starting value of a gradient accumulator.
    pub fn zeros() -> Self {
        Self::new(Vector2::zeros(), Vector3::zeros(), 0.0)
    }

    /// Build from a covariance `[xx, xy, yy]` instead of a conic.
    ///
    /// Returns `None` if the covariance is not positive definite.
    pub fn from_covariance(mean: Vector2<f32>, cov: Vector3<f32>, opacity: f32) -> Option<Self> {
        inverse_sym2(&cov).map(|conic| Self::new(mean, conic, opacity))
    }

    /// Covariance Σ = conic⁻¹ as `[xx, xy, yy]`, or `None` when degenerate.
    pub fn covariance(&self) -> Option<Vector3<f32>> {
        inverse_sym2(&self.conic)
    }

    /// Density (without opacity) at a pixel position.
    #[inline]
    pub fn density_at(&self, pixel: &Vector2<f32>) -> f32 {
        conic_pdf(pixel, &self.mean, &self.conic)
    }

    pub fn pack(&self) -> [f32; GAUSSIAN2D_LEN] {
        [
            self.mean.x,
            self.mean.y,
            self.conic.x,
            self.conic.y,
            self.conic.z,
            self.opacity,
        ]
    }

    pub fn unpack(v: &[f32; GAUSSIAN2D_LEN]) -> Self {
        Self::new(
            Vector2::new(v[0], v[1]),
            Vector3::new(v[2], v[3], v[4]),
            v[5],
        )
    }

    pub fn is_finite(&self) -> bool {
        self.pack().iter().all(|x| x.is_finite())
    }
}

impl Default for Gaussian2D {
    fn default() -> Self {
        Self::zeros()
    }
}

impl AddAssign for Gaussian2D {
    fn add_assign(&mut self, rhs: Self) {
        self.mean += rhs.mean;
        self.conic += rhs.conic;
        self.opacity += rhs.opacity;
    }
}

impl Add for Gaussian2D {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Mul<f32> for Gaussian2D {
    type Output = Self;

    fn mul(self, s: f32) -> Self {
        Self::new(self.mean * s, self.conic * s, self.opacity * s)
    }
}
