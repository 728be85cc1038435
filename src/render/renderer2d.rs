//! End-to-end 2D splat rendering at an arbitrary image size.
//!
//! pad to tiles → project splats → map to tiles → rasterize → crop
//!
//! The [`RenderContext`] keeps every intermediate the backward pass needs, so
//! a render followed by `render_gaussians_backward` never re-sorts or
//! re-projects anything.

use crate::core::{FeatureImage, Gaussian2D, RasterConfig, RasterError, SplatCloud};
use crate::render::block::Splats;
use crate::render::forward::{rasterize, RasterOutput};
use crate::render::tiles::{map_to_tiles, pad_to_tile, TileGrid, TileMapping};

/// Saved state of one render.
#[derive(Clone, Debug)]
pub struct RenderContext {
    /// Requested (unpadded) image size
    pub image_size: (u32, u32),

    /// Padded tile grid the rasterizer ran on
    pub grid: TileGrid,

    /// Projected screen-space records, one per splat
    pub points: Vec<Gaussian2D>,

    pub mapping: TileMapping,

    /// Forward output at padded size
    pub raster: RasterOutput,
}

impl RenderContext {
    /// Borrow the rasterizer inputs this context was rendered from.
    pub fn splats<'a>(&'a self, cloud: &'a SplatCloud) -> Result<Splats<'a>, RasterError> {
        Splats::new(&self.points, &cloud.features, cloud.feature_size())
    }
}

/// Cropped image plus the context to back-propagate through it.
#[derive(Clone, Debug)]
pub struct Rendered {
    pub image: FeatureImage,
    pub context: RenderContext,
}

/// Render `cloud` to an `image_size` feature image.
#[tracing::instrument(skip_all, fields(splats = cloud.len(), width = image_size.0, height = image_size.1))]
pub fn render_gaussians(
    cloud: &SplatCloud,
    image_size: (u32, u32),
    config: &RasterConfig,
) -> Result<Rendered, RasterError> {
    config.validate()?;

    let (width, height) = pad_to_tile(image_size, config.tile_size);
    let grid = TileGrid::new(width, height, config.tile_size)?;

    let points = cloud.project();
    let invalid = points.iter().filter(|p| !p.is_finite()).count();
    if invalid > 0 {
        tracing::warn!(invalid, "some splats projected to non-finite records");
    }

    let depths = cloud.depths();
    let mapping = map_to_tiles(&points, &depths, grid, config)?;
    let splats = Splats::new(&points, &cloud.features, cloud.feature_size())?;
    let raster = rasterize(splats, &mapping, config)?;
    let image = raster.image.crop(image_size.0, image_size.1);

    Ok(Rendered {
        image,
        context: RenderContext {
            image_size,
            grid,
            points,
            mapping,
            raster,
        },
    })
}
