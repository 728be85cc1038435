//! Per-tile staging buffer shared by all pixel lanes of a tile.
//!
//! A tile's splat list can be arbitrarily long, so it is consumed in pages of
//! `tile_area` entries. Each page is loaded cooperatively (lane `i` stages
//! entry `i`), then every pixel lane reads the whole page. On the CPU the
//! barrier between the two phases is simply the end of [`TileBlock::load_front`]
//! / [`TileBlock::load_back`]; no lane reads a page before it is complete.

use crate::core::Gaussian2D;
use crate::render::tiles::{TileMapping, TileRange};

/// Read-only inputs to both passes: splats and their flat `N × F` features.
#[derive(Clone, Copy, Debug)]
pub struct Splats<'a> {
    pub points: &'a [Gaussian2D],
    pub features: &'a [f32],
    pub feature_size: usize,
}

impl<'a> Splats<'a> {
    pub fn new(
        points: &'a [Gaussian2D],
        features: &'a [f32],
        feature_size: usize,
    ) -> Result<Self, crate::core::RasterError> {
        if feature_size == 0 {
            return Err(crate::core::RasterError::ZeroFeatureSize);
        }
        crate::core::expect_len("features", points.len() * feature_size, features.len())?;
        Ok(Self {
            points,
            features,
            feature_size,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn feature(&self, i: usize) -> &'a [f32] {
        &self.features[i * self.feature_size..(i + 1) * self.feature_size]
    }
}

/// One staged entry of the current page.
pub(crate) struct StagedEntry<'b> {
    /// Absolute index into `overlap_to_point`
    pub list_index: u32,
    pub point: &'b Gaussian2D,
    pub feature: &'b [f32],
}

pub(crate) struct TileBlock<'a> {
    splats: Splats<'a>,
    overlap_to_point: &'a [u32],
    range: TileRange,
    page_size: usize,

    page_len: usize,
    page_list_index: Vec<u32>,
    page_points: Vec<Gaussian2D>,
    page_features: Vec<f32>,
}

impl<'a> TileBlock<'a> {
    pub fn new(splats: Splats<'a>, mapping: &'a TileMapping, tile: usize) -> Self {
        let page_size = mapping.grid.tile_area();
        Self {
            splats,
            overlap_to_point: &mapping.overlap_to_point,
            range: mapping.tile_ranges[tile],
            page_size,
            page_len: 0,
            page_list_index: vec![0; page_size],
            page_points: vec![Gaussian2D::zeros(); page_size],
            page_features: vec![0.0; page_size * splats.feature_size],
        }
    }

    pub fn range(&self) -> TileRange {
        self.range
    }

    pub fn num_pages(&self) -> usize {
        self.range.len().div_ceil(self.page_size)
    }

    fn stage(&mut self, lane: usize, list_index: u32) {
        let point = self.overlap_to_point[list_index as usize] as usize;
        let f = self.splats.feature_size;
        self.page_list_index[lane] = list_index;
        self.page_points[lane] = self.splats.points[point];
        self.page_features[lane * f..(lane + 1) * f].copy_from_slice(self.splats.feature(point));
    }

    /// Stage page `page` counting from the front of the list; entries are
    /// stored in ascending depth.
    pub fn load_front(&mut self, page: usize) {
        let base = self.range.start as usize + page * self.page_size;
        let end = self.range.end as usize;
        self.page_len = end.saturating_sub(base).min(self.page_size);
        for lane in 0..self.page_size {
            let load_index = base + lane;
            if load_index < end {
                self.stage(lane, load_index as u32);
            }
        }
    }

    /// Stage page `page` counting from the back of the list; entries are
    /// stored in descending depth.
    pub fn load_back(&mut self, page: usize) {
        let start = self.range.start as usize;
        let block_end = (self.range.end as usize).saturating_sub(page * self.page_size);
        let block_start = block_end.saturating_sub(self.page_size).max(start);
        self.page_len = block_end.saturating_sub(block_start);
        for lane in 0..self.page_size {
            // lane 0 loads the last entry of the block
            if lane < self.page_len {
                self.stage(lane, (block_end - lane - 1) as u32);
            }
        }
    }

    /// Entries of the current page in staging order.
    pub fn entries(&self) -> impl Iterator<Item = StagedEntry<'_>> + '_ {
        let f = self.splats.feature_size;
        (0..self.page_len).map(move |lane| StagedEntry {
            list_index: self.page_list_index[lane],
            point: &self.page_points[lane],
            feature: &self.page_features[lane * f..(lane + 1) * f],
        })
    }
}
