use std::ops::{Index, Range};

use crate::error::{ConvolutionError, Result};

/// Interleaved R, G, B.
pub const CHANNELS: usize = 3;

/// An RGB image with 8 bits per channel.
///
/// Data is stored row major with row 0 at the top, so channel `c` of the
/// pixel at `(x, y)` lives at `(y * width + x) * 3 + c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Image {
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(CHANNELS));

        if width == 0 || height == 0 || expected != Some(pixels.len()) {
            return Err(ConvolutionError::InvalidImage {
                width,
                height,
                len: pixels.len(),
            });
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// An image with every channel of every pixel set to `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> Result<Self> {
        let len = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(CHANNELS))
            .ok_or(ConvolutionError::InvalidImage {
                width,
                height,
                len: 0,
            })?;

        Self::new(width, height, vec![value; len])
    }

    // output buffers share the dimensions of an already validated input
    pub(crate) fn blank_like(other: &Image) -> Self {
        Self {
            width: other.width,
            height: other.height,
            pixels: vec![0; other.pixels.len()],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes in one row of pixels.
    pub fn row_len(&self) -> usize {
        self.width * CHANNELS
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Byte range covered by a range of rows.
    pub fn row_bytes(&self, rows: Range<usize>) -> Range<usize> {
        rows.start * self.row_len()..rows.end * self.row_len()
    }

    /// The R, G, B values of the pixel at `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; CHANNELS] {
        let offset = (y * self.width + x) * CHANNELS;
        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ]
    }
}

/// Channel `c` of the pixel in row `y`, column `x`, indexed as `(y, x, c)`.
impl Index<(usize, usize, usize)> for Image {
    type Output = u8;

    fn index(&self, (y, x, c): (usize, usize, usize)) -> &u8 {
        &self.pixels[(y * self.width + x) * CHANNELS + c]
    }
}
