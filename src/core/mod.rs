//! Core data structures and mathematical operations.
//!
//! This module contains the fundamental types used throughout the system:
//! - `Gaussian2D`: packed screen-space splat record (mean, conic, opacity)
//! - `Splat` / `SplatCloud`: optimizable splat parameters and features
//! - `RasterConfig`: threshold, clamp and tiling constants
//! - `FeatureImage`: H × W × F float image
//!
//! All types here are "pure data" - no rendering logic.

mod config;
mod error;
mod gaussian;
mod feature_image;
pub mod init;
mod math;
mod splat;

pub use config::{ConfigError, RasterConfig};
pub use error::RasterError;
pub(crate) use error::expect_len;
pub use gaussian::{conic_pdf, Gaussian2D, GAUSSIAN2D_LEN};
pub use feature_image::FeatureImage;
pub use init::random_cloud;
pub use math::{inverse_sigmoid, inverse_sym2, orthonormal_basis, round_up_to_multiple, sigmoid};
pub use splat::{Splat, SplatCloud};
