//! Opaque frame compression boundary.
//!
//! Frames travel the data channel as JPEG byte streams. Everything outside
//! this module treats the codec as an `encode(frame) -> bytes` /
//! `decode(bytes) -> frame` pair; the compression format is not part of the
//! wire contract and no metadata travels with the payload (resolution is
//! negotiated out-of-band on the control channel).

use crate::error::{Error, Result};
use crate::frame::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

/// JPEG quality used by the server's send loop
const JPEG_QUALITY: u8 = 85;

/// Compress a frame to a JPEG byte stream.
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder
        .write_image(
            frame.data(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(out)
}

/// Decompress a JPEG byte stream into an RGB8 frame.
///
/// Fails with [`Error::Decode`] on malformed input.
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map_err(|e| Error::Decode(e.to_string()))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::new(width, height, rgb.into_raw())
}
