//! # splat2d: tile-based differentiable rasterizer for 2D Gaussian splats
//!
//! Renders an image of F-dimensional feature vectors from a set of
//! anisotropic 2D Gaussians, front-to-back alpha compositing, and computes
//! exact gradients of that image w.r.t. every splat parameter.
//!
//! ## Architecture
//!
//! - `core`: Fundamental data structures (splats, packed screen-space records,
//!   config, feature images, math utilities)
//! - `render`: Forward pipeline (tile mapping, paged tile compositing, full
//!   render with padding and cropping)
//! - `diff`: Differentiable operations (backward passes)
//! - `loss`: Image losses producing the upstream gradient
//!
//! Both passes split the padded image into square tiles and process them in
//! parallel. The tile mapping built by [`render::map_to_tiles`] fixes the
//! front-to-back order once; the forward output saves just enough per pixel
//! (final transmittance, `last_valid`) for the backward pass to walk each
//! list in exact reverse.

// Core data structures and math
pub mod core;

// Forward rendering pipeline
pub mod render;

// Differentiable operations (backward passes)
pub mod diff;

// Losses
pub mod loss;

// Re-export commonly used types at crate root for convenience
pub use crate::core::{FeatureImage, Gaussian2D, RasterConfig, RasterError, Splat, SplatCloud};
pub use crate::diff::{render_gaussians_backward, CloudGrads};
pub use crate::render::{render_gaussians, RenderContext, Rendered};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
