//! Binary segmentation masks.

use crate::physics::SegmentationImage;

/// Value of foreground pixels.
pub const FOREGROUND: u8 = 255;

/// A single-channel binary mask, row-major.
///
/// Foreground pixels are [`FOREGROUND`], background pixels are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at column `x`, row `y`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Check if the pixel at `(x, y)` is foreground.
    #[must_use]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.get(x, y).is_some_and(|v| v != 0)
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// Turn a segmentation render into a binary mask: any drawn geom is
/// foreground.
#[must_use]
pub fn filter_mask(image: &SegmentationImage) -> Mask {
    Mask {
        width: image.width,
        height: image.height,
        data: image
            .data
            .iter()
            .map(|&label| if label != 0 { FOREGROUND } else { 0 })
            .collect(),
    }
}
