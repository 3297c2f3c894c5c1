//! In-memory raster handed between the codec adapter and the filter engine.
//!
//! Pixels are stored as 4-byte BGRA groups, row-major. Rows may be padded:
//! `stride >= width * 4`, and padding bytes are carried along untouched.

use thiserror::Error;

/// Bytes per pixel (blue, green, red, alpha).
pub const CHANNELS: usize = 4;

/// Channel offsets inside one pixel group.
pub const BLUE: usize = 0;
pub const GREEN: usize = 1;
pub const RED: usize = 2;
pub const ALPHA: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("stride {stride} is smaller than one row of {width} pixels ({min} bytes)")]
    StrideTooSmall { width: u32, stride: usize, min: usize },

    #[error("buffer holds {actual} bytes but {height} rows of stride {stride} need {expected}")]
    LengthMismatch {
        height: u32,
        stride: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wraps `data` after checking the geometry invariant
    /// `data.len() == stride * height` with `stride >= width * 4`.
    pub fn new(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Result<Self, BufferError> {
        let min = width as usize * CHANNELS;
        if stride < min {
            return Err(BufferError::StrideTooSmall { width, stride, min });
        }
        let expected = stride * height as usize;
        if data.len() != expected {
            return Err(BufferError::LengthMismatch {
                height,
                stride,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// Same geometry as `self`, new bytes. `data` must have the same length.
    pub(crate) fn with_data(&self, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), self.data.len());
        Self {
            width: self.width,
            height: self.height,
            stride: self.stride,
            data,
        }
    }

    /// Tightly packed BGRA rows (`stride == width * 4`).
    pub fn from_bgra(width: u32, height: u32, data: Vec<u8>) -> Result<Self, BufferError> {
        Self::new(width, height, width as usize * CHANNELS, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of meaningful bytes per row, padding excluded.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Pixel bytes of row `y`, without padding.
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Iterates the pixel bytes of every row, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let row_bytes = self.row_bytes();
        // chunks() panics on a zero chunk size; an empty raster has no rows anyway.
        let chunk = self.stride.max(1);
        self.data
            .chunks(chunk)
            .take(self.height as usize)
            .map(move |row| &row[..row_bytes])
    }

    /// `[b, g, r, a]` at (`x`, `y`). Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; CHANNELS] {
        assert!(x < self.width, "x {} out of bounds for width {}", x, self.width);
        let offset = y as usize * self.stride + x as usize * CHANNELS;
        let mut px = [0u8; CHANNELS];
        px.copy_from_slice(&self.data[offset..offset + CHANNELS]);
        px
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bgra_packed() {
        let buf = PixelBuffer::from_bgra(2, 1, vec![10, 20, 30, 255, 200, 100, 50, 255]).unwrap();
        assert_eq!(buf.stride(), 8);
        assert_eq!(buf.pixel(0, 0), [10, 20, 30, 255]);
        assert_eq!(buf.pixel(1, 0), [200, 100, 50, 255]);
    }

    #[test]
    fn test_stride_too_small_rejected() {
        let err = PixelBuffer::new(3, 1, 8, vec![0; 8]).unwrap_err();
        assert_eq!(
            err,
            BufferError::StrideTooSmall {
                width: 3,
                stride: 8,
                min: 12
            }
        );
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = PixelBuffer::new(1, 2, 4, vec![0; 4]).unwrap_err();
        assert!(matches!(
            err,
            BufferError::LengthMismatch {
                expected: 8,
                actual: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_padded_rows_exclude_padding() {
        // 1 pixel per row, 2 bytes of padding
        let data = vec![1, 2, 3, 4, 0xEE, 0xEE, 5, 6, 7, 8, 0xEE, 0xEE];
        let buf = PixelBuffer::new(1, 2, 6, data).unwrap();
        assert_eq!(buf.row(0), &[1, 2, 3, 4]);
        assert_eq!(buf.row(1), &[5, 6, 7, 8]);
        let rows: Vec<&[u8]> = buf.rows().collect();
        assert_eq!(rows, vec![&[1u8, 2, 3, 4][..], &[5u8, 6, 7, 8][..]]);
    }

    #[test]
    fn test_zero_dimensions_are_empty() {
        let buf = PixelBuffer::from_bgra(0, 0, Vec::new()).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.rows().count(), 0);

        let tall = PixelBuffer::from_bgra(0, 5, Vec::new()).unwrap();
        assert!(tall.is_empty());
    }
}
