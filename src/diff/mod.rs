//! Differentiable operations (backward passes).
//!
//! Each submodule corresponds to a forward operation in `render` or `core`:
//! - `gaussian2d_grad`: conic density
//! - `rasterize_grad`: tile compositor
//! - `project_grad`: `Splat::project`
//! - `render_grad`: the full `render_gaussians` pipeline

mod gaussian2d_grad;
mod project_grad;
mod rasterize_grad;
mod render_grad;

pub use gaussian2d_grad::{conic_pdf_with_grad, ConicPdfGrads};
pub use project_grad::{project_backward, SplatGrad};
pub use rasterize_grad::{rasterize_backward, RasterGrads};
pub use render_grad::{render_gaussians_backward, CloudGrads};
