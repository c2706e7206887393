//! Frame value type shared by capture, codec, calibration and client buffering.

use crate::error::{Error, Result};

/// Number of interleaved color channels per pixel
pub const CHANNELS: usize = 3;

/// One decoded image: an RGB8 pixel grid, row-major, three interleaved
/// channels.
///
/// A frame is immutable once produced. `Clone` is a deep copy, which is what
/// lets the client's buffer hand out private copies while the network thread
/// overwrites the slot behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Create a frame from raw RGB8 pixel data.
    ///
    /// `data.len()` must equal `width * height * 3`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(Error::InvalidParameter(format!(
                "frame data length {} does not match {}x{}x{}",
                data.len(),
                width,
                height,
                CHANNELS
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// All-black frame at the given resolution
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * CHANNELS],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` pair
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw interleaved RGB8 pixel data, row-major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the frame, returning its pixel data
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at `(x, y)`. Caller guarantees the coordinates are in range.
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_length() {
        assert!(Frame::new(4, 2, vec![0; 4 * 2 * 3]).is_ok());
        assert!(Frame::new(4, 2, vec![0; 7]).is_err());
    }

    #[test]
    fn test_pixel_indexing() {
        let mut data = vec![0u8; 2 * 2 * 3];
        // pixel (1, 0) = (10, 20, 30)
        data[3] = 10;
        data[4] = 20;
        data[5] = 30;
        let frame = Frame::new(2, 2, data).unwrap();
        assert_eq!(frame.pixel(1, 0), [10, 20, 30]);
        assert_eq!(frame.pixel(0, 1), [0, 0, 0]);
    }

    #[test]
    fn test_clone_is_deep() {
        let frame = Frame::black(2, 2);
        let copy = frame.clone();
        assert_eq!(frame, copy);
        assert_ne!(frame.data().as_ptr(), copy.data().as_ptr());
    }
}
