//! Row-major multi-channel float image (H × W × F).

use image::{Rgb, RgbImage};

use crate::core::error::{expect_len, RasterError};

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureImage {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<f32>,
}

impl FeatureImage {
    /// Zero-filled image.
    pub fn new(width: u32, height: u32, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; width as usize * height as usize * channels],
        }
    }

    /// Wrap an existing buffer laid out as `[(y * width + x) * channels + k]`.
    pub fn from_vec(
        width: u32,
        height: u32,
        channels: usize,
        data: Vec<f32>,
    ) -> Result<Self, RasterError> {
        if channels == 0 {
            return Err(RasterError::ZeroFeatureSize);
        }
        expect_len(
            "image data",
            width as usize * height as usize * channels,
            data.len(),
        )?;
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: &[f32]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * value.len());
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(value);
        }
        Self {
            width,
            height,
            channels: value.len(),
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let o = self.offset(x, y);
        &self.data[o..o + self.channels]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [f32] {
        let o = self.offset(x, y);
        let channels = self.channels;
        &mut self.data[o..o + channels]
    }

    /// Top-left `width × height` window (removes tile padding).
    pub fn crop(&self, width: u32, height: u32) -> Self {
        let width = width.min(self.width);
        let height = height.min(self.height);
        let mut out = Self::new(width, height, self.channels);
        for y in 0..height {
            let src = self.offset(0, y);
            let dst = out.offset(0, y);
            let n = width as usize * self.channels;
            out.data[dst..dst + n].copy_from_slice(&self.data[src..src + n]);
        }
        out
    }

    /// Zero-pad on the right/bottom up to `width × height`.
    pub fn pad(&self, width: u32, height: u32) -> Self {
        let mut out = Self::new(width.max(self.width), height.max(self.height), self.channels);
        for y in 0..self.height {
            let src = self.offset(0, y);
            let dst = out.offset(0, y);
            let n = self.width as usize * self.channels;
            out.data[dst..dst + n].copy_from_slice(&self.data[src..src + n]);
        }
        out
    }

    /// Quantize the first three channels to RGB8 (missing channels read as 0).
    pub fn to_rgb8(&self) -> RgbImage {
        let mut img = RgbImage::new(self.width, self.height);
        for (x, y, out) in img.enumerate_pixels_mut() {
            let p = self.pixel(x, y);
            let channel = |k: usize| {
                let v = p.get(k).copied().unwrap_or(0.0);
                (v * 255.0).round().clamp(0.0, 255.0) as u8
            };
            *out = Rgb([channel(0), channel(1), channel(2)]);
        }
        img
    }
}
