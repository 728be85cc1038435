//! Tile assignment: bin splats into screen tiles and depth-sort each bin.
//!
//! The output [`TileMapping`] is the ordering contract between the forward
//! and backward passes. It is built once per render and handed, unchanged,
//! to both; nothing downstream re-sorts it.

use nalgebra::Vector2;
use rayon::prelude::*;

use crate::core::{expect_len, round_up_to_multiple, Gaussian2D, RasterConfig, RasterError};

/// Round an image size up to whole tiles.
pub fn pad_to_tile(image_size: (u32, u32), tile_size: u32) -> (u32, u32) {
    (
        round_up_to_multiple(image_size.0, tile_size),
        round_up_to_multiple(image_size.1, tile_size),
    )
}

/// A padded image partitioned into square tiles, numbered row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self, RasterError> {
        if tile_size == 0 || width % tile_size != 0 || height % tile_size != 0 {
            return Err(RasterError::NotTileMultiple {
                width,
                height,
                tile_size,
            });
        }
        Ok(Self {
            width,
            height,
            tile_size,
        })
    }

    pub fn tiles_wide(&self) -> u32 {
        self.width / self.tile_size
    }

    pub fn tiles_high(&self) -> u32 {
        self.height / self.tile_size
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles_wide() as usize * self.tiles_high() as usize
    }

    pub fn tile_area(&self) -> usize {
        self.tile_size as usize * self.tile_size as usize
    }

    /// Pixel coordinates of `lane` (0..tile_area, row-major) inside `tile`.
    #[inline]
    pub fn pixel(&self, tile: usize, lane: usize) -> (u32, u32) {
        let ts = self.tile_size as usize;
        let tiles_wide = self.tiles_wide() as usize;
        let x = (tile % tiles_wide) * ts + lane % ts;
        let y = (tile / tiles_wide) * ts + lane / ts;
        (x as u32, y as u32)
    }

    /// Pixel center used for density evaluation.
    #[inline]
    pub fn pixel_center(&self, tile: usize, lane: usize) -> Vector2<f32> {
        let (x, y) = self.pixel(tile, lane);
        Vector2::new(x as f32 + 0.5, y as f32 + 0.5)
    }
}

/// Half-open range `[start, end)` into `overlap_to_point`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileRange {
    pub start: u32,
    pub end: u32,
}

impl TileRange {
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Per-tile depth-sorted splat lists.
#[derive(Clone, Debug, PartialEq)]
pub struct TileMapping {
    pub grid: TileGrid,

    /// Splat index per (splat, tile) overlap, grouped by tile, front-to-back
    pub overlap_to_point: Vec<u32>,

    /// One range per tile, row-major
    pub tile_ranges: Vec<TileRange>,
}

impl TileMapping {
    /// Assemble a mapping produced elsewhere, checking it is well formed
    /// against `num_points` splats.
    ///
    /// Depth order inside each range cannot be checked here and is the
    /// caller's contract.
    pub fn from_parts(
        grid: TileGrid,
        overlap_to_point: Vec<u32>,
        tile_ranges: Vec<TileRange>,
        num_points: usize,
    ) -> Result<Self, RasterError> {
        expect_len("tile ranges", grid.num_tiles(), tile_ranges.len())?;
        let total = overlap_to_point.len();
        for (tile, r) in tile_ranges.iter().enumerate() {
            if r.start > r.end || r.end as usize > total {
                return Err(RasterError::InvalidMapping(format!(
                    "tile {tile} range [{}, {}) outside 0..{total}",
                    r.start, r.end
                )));
            }
        }
        if let Some(bad) = overlap_to_point.iter().find(|&&p| p as usize >= num_points) {
            return Err(RasterError::InvalidMapping(format!(
                "point index {bad} out of range for {num_points} points"
            )));
        }
        Ok(Self {
            grid,
            overlap_to_point,
            tile_ranges,
        })
    }

    pub fn num_overlaps(&self) -> usize {
        self.overlap_to_point.len()
    }

    /// The splat indices of one tile, front-to-back.
    pub fn tile_points(&self, tile: usize) -> &[u32] {
        let r = self.tile_ranges[tile];
        &self.overlap_to_point[r.start as usize..r.end as usize]
    }

    /// Consistency check against the point buffer the passes will index.
    pub(crate) fn check_points(&self, num_points: usize) -> Result<(), RasterError> {
        match self.overlap_to_point.iter().max() {
            Some(&max) if max as usize >= num_points => Err(RasterError::InvalidMapping(format!(
                "point index {max} out of range for {num_points} points"
            ))),
            _ => Ok(()),
        }
    }
}

/// Screen-space axis-aligned bounds of the region where a splat can pass the
/// alpha threshold.
///
/// `opacity * exp(-0.5 dᵀ Σ⁻¹ d) >= alpha_threshold` holds exactly inside the
/// ellipse `dᵀ Σ⁻¹ d <= 2 ln(opacity / alpha_threshold)`, whose bounding box
/// has half-extents `r * sqrt(diag(Σ))`.
///
/// A zero threshold passes every pixel, so the bounds are unbounded and the
/// splat is listed in every tile.
///
/// Returns `None` for zero extent or a degenerate conic.
pub fn screen_bounds(
    gaussian: &Gaussian2D,
    alpha_threshold: f32,
) -> Option<(Vector2<f32>, Vector2<f32>)> {
    if !gaussian.is_finite() {
        return None;
    }
    let cov = gaussian.covariance()?;
    let r2 = if alpha_threshold > 0.0 {
        2.0 * (gaussian.opacity / alpha_threshold).ln()
    } else {
        f32::INFINITY
    };
    if !(r2 > 0.0) {
        return None;
    }
    let r = r2.sqrt();
    let half = Vector2::new(r * cov.x.sqrt(), r * cov.z.sqrt());
    Some((gaussian.mean - half, gaussian.mean + half))
}

/// Inclusive tile index range `(x0, y0, x1, y1)` whose pixel centers can fall
/// inside `bounds`, or `None` if that range misses the grid.
fn tile_span(grid: &TileGrid, (lo, hi): (Vector2<f32>, Vector2<f32>)) -> Option<(u32, u32, u32, u32)> {
    // Pixel x has center x + 0.5; it is inside when lo <= x + 0.5 <= hi.
    let px0 = (lo.x - 0.5).ceil().max(0.0);
    let py0 = (lo.y - 0.5).ceil().max(0.0);
    let px1 = (hi.x - 0.5).floor().min(grid.width as f32 - 1.0);
    let py1 = (hi.y - 0.5).floor().min(grid.height as f32 - 1.0);
    if px0 > px1 || py0 > py1 {
        return None;
    }
    let ts = grid.tile_size;
    Some((
        px0 as u32 / ts,
        py0 as u32 / ts,
        px1 as u32 / ts,
        py1 as u32 / ts,
    ))
}

/// Bin splats into tiles of `grid` and sort each bin front-to-back.
///
/// Equal depths are ordered by splat index so the result is deterministic.
/// Splats with non-finite depth are dropped with a warning.
#[tracing::instrument(skip_all, fields(points = points.len(), width = grid.width, height = grid.height))]
pub fn map_to_tiles(
    points: &[Gaussian2D],
    depths: &[f32],
    grid: TileGrid,
    config: &RasterConfig,
) -> Result<TileMapping, RasterError> {
    config.validate()?;
    expect_len("depths", points.len(), depths.len())?;
    if grid.tile_size != config.tile_size {
        return Err(RasterError::NotTileMultiple {
            width: grid.width,
            height: grid.height,
            tile_size: config.tile_size,
        });
    }

    let invalid_depths = depths.iter().filter(|d| !d.is_finite()).count();
    if invalid_depths > 0 {
        tracing::warn!(invalid_depths, "dropping splats with non-finite depth");
    }

    let tiles_wide = grid.tiles_wide();

    // (tile, depth, point) per overlap.
    let mut overlaps: Vec<(u32, f32, u32)> = points
        .par_iter()
        .zip(depths.par_iter())
        .enumerate()
        .filter(|(_, (_, depth))| depth.is_finite())
        .flat_map_iter(|(i, (g, &depth))| {
            let span = screen_bounds(g, config.alpha_threshold).and_then(|b| tile_span(&grid, b));
            span.into_iter().flat_map(move |(x0, y0, x1, y1)| {
                (y0..=y1).flat_map(move |ty| {
                    (x0..=x1).map(move |tx| (ty * tiles_wide + tx, depth, i as u32))
                })
            })
        })
        .collect();

    overlaps.par_sort_unstable_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.total_cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut tile_ranges = vec![TileRange::default(); grid.num_tiles()];
    for (k, &(tile, _, _)) in overlaps.iter().enumerate() {
        let r = &mut tile_ranges[tile as usize];
        if r.is_empty() {
            r.start = k as u32;
        }
        r.end = k as u32 + 1;
    }

    let overlap_to_point: Vec<u32> = overlaps.into_iter().map(|(_, _, p)| p).collect();

    tracing::debug!(
        overlaps = overlap_to_point.len(),
        tiles = grid.num_tiles(),
        occupied = tile_ranges.iter().filter(|r| !r.is_empty()).count(),
        "mapped splats to tiles"
    );

    Ok(TileMapping {
        grid,
        overlap_to_point,
        tile_ranges,
    })
}
