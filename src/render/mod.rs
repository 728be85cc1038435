//! Forward rendering pipeline (CPU implementation).
//!
//! - `tiles`: tile grid, screen bounds and depth-sorted per-tile lists
//! - `block`: per-tile paged staging shared by the pixel lanes of a tile
//! - `forward`: front-to-back compositing
//! - `renderer2d`: projection, padding and cropping around the above
//!
//! No gradients computed here - see `diff` module for backward passes.

mod block;
mod forward;
mod renderer2d;
mod tiles;

pub use block::Splats;
pub(crate) use block::TileBlock;
pub use forward::{rasterize, RasterOutput};
pub use renderer2d::{render_gaussians, RenderContext, Rendered};
pub use tiles::{map_to_tiles, pad_to_tile, screen_bounds, TileGrid, TileMapping, TileRange};
