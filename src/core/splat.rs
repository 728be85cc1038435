//! Optimizable 2D splat parameters and their projection to [`Gaussian2D`].
//!
//! A splat is parameterized by:
//! - Position (pixel coordinates)
//! - Log-space scale along its two principal axes
//! - Rotation as an unnormalized 2D direction of the first axis
//! - Opacity in logit-space (actual opacity = sigmoid(alpha_logit))
//! - Depth, used only to order splats
//!
//! Features live in a flat `N × F` buffer on [`SplatCloud`].

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::error::{expect_len, RasterError};
use crate::core::gaussian::Gaussian2D;
use crate::core::math::{orthonormal_basis, sigmoid};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Splat {
    pub position: Vector2<f32>,

    /// Log-space scale (actual scale = exp(log_scaling))
    pub log_scaling: Vector2<f32>,

    /// Direction of the first principal axis, any non-zero length
    pub rotation: Vector2<f32>,

    /// Opacity in logit-space
    pub alpha_logit: f32,

    pub depth: f32,
}

impl Splat {
    pub fn new(
        position: Vector2<f32>,
        log_scaling: Vector2<f32>,
        rotation: Vector2<f32>,
        alpha_logit: f32,
        depth: f32,
    ) -> Self {
        Self {
            position,
            log_scaling,
            rotation,
            alpha_logit,
            depth,
        }
    }

    pub fn opacity(&self) -> f32 {
        sigmoid(self.alpha_logit)
    }

    /// Covariance Σ = Bᵀ B with rows B = [v1 * s.x; v2 * s.y], as `[xx, xy, yy]`.
    pub fn covariance(&self) -> Vector3<f32> {
        let (v1, v2) = orthonormal_basis(&self.rotation);
        let sx2 = (2.0 * self.log_scaling.x).exp();
        let sy2 = (2.0 * self.log_scaling.y).exp();
        Vector3::new(
            sx2 * v1.x * v1.x + sy2 * v2.x * v2.x,
            sx2 * v1.x * v1.y + sy2 * v2.x * v2.y,
            sx2 * v1.y * v1.y + sy2 * v2.y * v2.y,
        )
    }

    /// Project to the screen-space record the rasterizer consumes.
    ///
    /// Because v1 and v2 are orthonormal the conic is available in closed form:
    /// Σ⁻¹ = v1 v1ᵀ / s.x² + v2 v2ᵀ / s.y²
    pub fn project(&self) -> Gaussian2D {
        let (v1, _) = orthonormal_basis(&self.rotation);
        let ix = (-2.0 * self.log_scaling.x).exp();
        let iy = (-2.0 * self.log_scaling.y).exp();
        let conic = Vector3::new(
            v1.x * v1.x * ix + v1.y * v1.y * iy,
            v1.x * v1.y * (ix - iy),
            v1.y * v1.y * ix + v1.x * v1.x * iy,
        );
        Gaussian2D::new(self.position, conic, self.opacity())
    }
}

/// A collection of splats with their feature vectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplatCloud {
    pub splats: Vec<Splat>,

    /// Flat `N × feature_size` features
    pub features: Vec<f32>,

    feature_size: usize,
}

impl SplatCloud {
    /// Create an empty cloud whose splats carry `feature_size` floats each.
    pub fn new(feature_size: usize) -> Result<Self, RasterError> {
        if feature_size == 0 {
            return Err(RasterError::ZeroFeatureSize);
        }
        Ok(Self {
            splats: Vec::new(),
            features: Vec::new(),
            feature_size,
        })
    }

    pub fn from_parts(
        splats: Vec<Splat>,
        features: Vec<f32>,
        feature_size: usize,
    ) -> Result<Self, RasterError> {
        if feature_size == 0 {
            return Err(RasterError::ZeroFeatureSize);
        }
        expect_len("splat features", splats.len() * feature_size, features.len())?;
        Ok(Self {
            splats,
            features,
            feature_size,
        })
    }

    pub fn feature_size(&self) -> usize {
        self.feature_size
    }

    pub fn len(&self) -> usize {
        self.splats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splats.is_empty()
    }

    pub fn push(&mut self, splat: Splat, feature: &[f32]) -> Result<(), RasterError> {
        expect_len("splat feature", self.feature_size, feature.len())?;
        self.splats.push(splat);
        self.features.extend_from_slice(feature);
        Ok(())
    }

    pub fn feature(&self, i: usize) -> &[f32] {
        &self.features[i * self.feature_size..(i + 1) * self.feature_size]
    }

    pub fn depths(&self) -> Vec<f32> {
        self.splats.iter().map(|s| s.depth).collect()
    }

    pub fn project(&self) -> Vec<Gaussian2D> {
        self.splats.iter().map(Splat::project).collect()
    }
}
